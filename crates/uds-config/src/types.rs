//! Configuration types.
//!
//! Every field is optional in the file so that layers can be merged; the
//! accessor methods supply defaults.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3005/api";
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 1000;
pub const DEFAULT_RECONNECT_DELAY_MAX_MS: u64 = 5000;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_GC_AFTER_SECS: u64 = 300;

/// Root configuration, loaded from `config.toml`.
///
/// ```toml
/// [api]
/// base_url = "https://uds.plant.local/api"
///
/// [push]
/// reconnect_delay_max_ms = 10000
///
/// [datasets.topics-tree]
/// poll_interval_realtime_ms = 60000
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UdsConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Per data-set policy overrides, keyed by data-set key.
    #[serde(default)]
    pub datasets: BTreeMap<String, DataSetOverride>,
    /// Bearer token for REST and push auth. Environment only, never read from files.
    #[serde(skip)]
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl ApiConfig {
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_API_BASE_URL)
    }

    /// Transport-level timeout for every REST call.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_API_TIMEOUT_SECS))
    }

    pub fn merge(base: &Self, override_config: &Self) -> Self {
        Self {
            base_url: override_config
                .base_url
                .clone()
                .or_else(|| base.base_url.clone()),
            timeout_secs: override_config.timeout_secs.or(base.timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushConfig {
    /// Set to `false` to run on polling intervals only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Push endpoint origin. Defaults to the origin of `api.base_url`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnect_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnect_delay_max_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u64>,
}

impl PushConfig {
    pub fn enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// Push endpoint, falling back to the origin of the REST base URL.
    pub fn resolve_url(&self, api: &ApiConfig) -> String {
        match &self.url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => origin_of(api.base_url()).unwrap_or_else(|| api.base_url().to_string()),
        }
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms.unwrap_or(DEFAULT_RECONNECT_DELAY_MS))
    }

    pub fn reconnect_delay_max(&self) -> Duration {
        Duration::from_millis(
            self.reconnect_delay_max_ms
                .unwrap_or(DEFAULT_RECONNECT_DELAY_MAX_MS),
        )
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(
            self.connect_timeout_secs
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        )
    }

    pub fn merge(base: &Self, override_config: &Self) -> Self {
        Self {
            enabled: override_config.enabled.or(base.enabled),
            url: override_config.url.clone().or_else(|| base.url.clone()),
            reconnect_delay_ms: override_config
                .reconnect_delay_ms
                .or(base.reconnect_delay_ms),
            reconnect_delay_max_ms: override_config
                .reconnect_delay_max_ms
                .or(base.reconnect_delay_max_ms),
            connect_timeout_secs: override_config
                .connect_timeout_secs
                .or(base.connect_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Seconds an unobserved data set keeps its value before eviction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gc_after_secs: Option<u64>,
}

impl CacheConfig {
    pub fn gc_after(&self) -> Duration {
        Duration::from_secs(self.gc_after_secs.unwrap_or(DEFAULT_GC_AFTER_SECS))
    }

    pub fn merge(base: &Self, override_config: &Self) -> Self {
        Self {
            gc_after_secs: override_config.gc_after_secs.or(base.gc_after_secs),
        }
    }
}

/// Per data-set policy override. Unset fields keep the built-in policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSetOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_realtime_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_polling_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_window_realtime_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_window_polling_ms: Option<u64>,
}

impl DataSetOverride {
    pub fn merge(base: &Self, override_config: &Self) -> Self {
        Self {
            poll_interval_realtime_ms: override_config
                .poll_interval_realtime_ms
                .or(base.poll_interval_realtime_ms),
            poll_interval_polling_ms: override_config
                .poll_interval_polling_ms
                .or(base.poll_interval_polling_ms),
            stale_window_realtime_ms: override_config
                .stale_window_realtime_ms
                .or(base.stale_window_realtime_ms),
            stale_window_polling_ms: override_config
                .stale_window_polling_ms
                .or(base.stale_window_polling_ms),
        }
    }
}

/// `scheme://host[:port]` of an http(s) URL, or `None` if it has no scheme.
pub(crate) fn origin_of(url: &str) -> Option<String> {
    let (scheme, rest) = url.split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if authority.is_empty() {
        return None;
    }
    Some(format!("{}://{}", scheme, authority))
}
