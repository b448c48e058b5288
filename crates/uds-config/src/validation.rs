//! Configuration validation.

use crate::errors::ConfigError;
use crate::types::UdsConfig;

/// Validate a merged configuration.
///
/// # Validation Rules
///
/// - `api.base_url` and `push.url` (if set) must be http(s) URLs
/// - timeouts must be non-zero
/// - `push.reconnect_delay_ms` must not exceed `push.reconnect_delay_max_ms`
/// - per data-set, the realtime interval and stale window must not be
///   shorter than their polling counterparts, and no value may be zero
pub fn validate_config(config: &UdsConfig) -> Result<(), ConfigError> {
    check_url("api.base_url", config.api.base_url())?;
    if let Some(ref url) = config.push.url {
        check_url("push.url", url)?;
    }

    if config.api.timeout_secs == Some(0) {
        return Err(invalid("api.timeout_secs must be greater than 0"));
    }
    if config.push.connect_timeout_secs == Some(0) {
        return Err(invalid("push.connect_timeout_secs must be greater than 0"));
    }
    if config.push.reconnect_delay_ms == Some(0) {
        return Err(invalid("push.reconnect_delay_ms must be greater than 0"));
    }
    if config.push.reconnect_delay() > config.push.reconnect_delay_max() {
        return Err(ConfigError::InvalidConfiguration {
            message: format!(
                "push.reconnect_delay_ms ({}) exceeds push.reconnect_delay_max_ms ({})",
                config.push.reconnect_delay().as_millis(),
                config.push.reconnect_delay_max().as_millis()
            ),
        });
    }

    for (key, ds) in &config.datasets {
        let values = [
            ds.poll_interval_realtime_ms,
            ds.poll_interval_polling_ms,
            ds.stale_window_realtime_ms,
            ds.stale_window_polling_ms,
        ];
        if values.contains(&Some(0)) {
            return Err(ConfigError::InvalidConfiguration {
                message: format!("datasets.{}: intervals must be greater than 0", key),
            });
        }
        if let (Some(realtime), Some(polling)) =
            (ds.poll_interval_realtime_ms, ds.poll_interval_polling_ms)
            && realtime < polling
        {
            return Err(ConfigError::InvalidConfiguration {
                message: format!(
                    "datasets.{}: poll_interval_realtime_ms ({}) is shorter than poll_interval_polling_ms ({})",
                    key, realtime, polling
                ),
            });
        }
        if let (Some(realtime), Some(polling)) =
            (ds.stale_window_realtime_ms, ds.stale_window_polling_ms)
            && realtime < polling
        {
            return Err(ConfigError::InvalidConfiguration {
                message: format!(
                    "datasets.{}: stale_window_realtime_ms ({}) is shorter than stale_window_polling_ms ({})",
                    key, realtime, polling
                ),
            });
        }
    }

    Ok(())
}

fn check_url(field: &'static str, url: &str) -> Result<(), ConfigError> {
    let valid = ["http://", "https://"]
        .iter()
        .any(|scheme| url.starts_with(scheme) && url.len() > scheme.len());
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidUrl {
            field,
            url: url.to_string(),
        })
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::InvalidConfiguration {
        message: message.to_string(),
    }
}
