//! Configuration loading and merging.
//!
//! # Configuration Hierarchy
//!
//! Later sources override earlier ones:
//! 1. **Hardcoded defaults** - accessor fallbacks on the config types
//! 2. **User config** - `~/.uds/config.toml`
//! 3. **Project config** - `./.uds/config.toml`
//! 4. **Environment** - `UDS_API_URL`, `UDS_PUSH_URL`, `UDS_AUTH_TOKEN`

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::errors::ConfigError;
use crate::types::{ApiConfig, CacheConfig, DataSetOverride, PushConfig, UdsConfig};
use crate::validation::validate_config;

pub const ENV_API_URL: &str = "UDS_API_URL";
pub const ENV_PUSH_URL: &str = "UDS_PUSH_URL";
pub const ENV_AUTH_TOKEN: &str = "UDS_AUTH_TOKEN";

const CONFIG_DIR: &str = ".uds";
const CONFIG_FILE: &str = "config.toml";

/// `~/.uds/config.toml`, or `None` when no home directory can be resolved.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE))
}

/// `<project_root>/.uds/config.toml`.
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(CONFIG_DIR).join(CONFIG_FILE)
}

/// Load configuration from the user and project files plus environment.
///
/// Missing files are not errors; unreadable or unparsable ones are.
pub fn load_hierarchy() -> Result<UdsConfig, ConfigError> {
    let project_root = std::env::current_dir()?;
    let mut paths = Vec::with_capacity(2);
    if let Some(user) = user_config_path() {
        paths.push(user);
    }
    paths.push(project_config_path(&project_root));

    let config = apply_env_overrides(load_from_paths(&paths)?);
    validate_config(&config)?;

    info!(
        event = "config.load_completed",
        base_url = config.api.base_url(),
        push_enabled = config.push.enabled(),
        overrides = config.datasets.len(),
    );
    Ok(config)
}

/// Merge the files at `paths` in order, skipping those that do not exist.
///
/// Does not consult the environment and does not validate.
pub fn load_from_paths(paths: &[PathBuf]) -> Result<UdsConfig, ConfigError> {
    let mut config = UdsConfig::default();
    for path in paths {
        match load_config_file(path) {
            Ok(layer) => {
                debug!(event = "config.file_loaded", path = %path.display());
                config = merge_configs(config, layer);
            }
            Err(ConfigError::IoError { source })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                debug!(event = "config.file_missing", path = %path.display());
            }
            Err(e) => return Err(e),
        }
    }
    Ok(config)
}

/// Parse a single configuration file.
pub fn load_config_file(path: &Path) -> Result<UdsConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| ConfigError::ConfigParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Apply `UDS_*` environment variables on top of `config`.
///
/// Empty values are treated as unset.
pub fn apply_env_overrides(mut config: UdsConfig) -> UdsConfig {
    if let Some(url) = env_value(ENV_API_URL) {
        config.api.base_url = Some(url);
    }
    if let Some(url) = env_value(ENV_PUSH_URL) {
        config.push.url = Some(url);
    }
    if let Some(token) = env_value(ENV_AUTH_TOKEN) {
        config.auth_token = Some(token);
    }
    config
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Merge two configurations, with `override_config` taking precedence.
///
/// Data-set overrides are merged field by field per key.
pub fn merge_configs(base: UdsConfig, override_config: UdsConfig) -> UdsConfig {
    UdsConfig {
        api: ApiConfig::merge(&base.api, &override_config.api),
        push: PushConfig::merge(&base.push, &override_config.push),
        cache: CacheConfig::merge(&base.cache, &override_config.cache),
        datasets: {
            let mut merged = base.datasets;
            for (key, value) in override_config.datasets {
                let combined = match merged.get(&key) {
                    Some(existing) => DataSetOverride::merge(existing, &value),
                    None => value,
                };
                merged.insert(key, combined);
            }
            merged
        },
        auth_token: override_config.auth_token.or(base.auth_token),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_merge_override_wins() {
        let base: UdsConfig = toml::from_str(
            r#"
            [api]
            base_url = "http://base:3005/api"
            timeout_secs = 10
            "#,
        )
        .unwrap();
        let over: UdsConfig = toml::from_str(
            r#"
            [api]
            base_url = "http://override:3005/api"
            "#,
        )
        .unwrap();

        let merged = merge_configs(base, over);
        assert_eq!(merged.api.base_url(), "http://override:3005/api");
        assert_eq!(merged.api.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_merge_dataset_overrides_field_by_field() {
        let base: UdsConfig = toml::from_str(
            r#"
            [datasets.topics-tree]
            poll_interval_realtime_ms = 60000
            poll_interval_polling_ms = 8000
            "#,
        )
        .unwrap();
        let over: UdsConfig = toml::from_str(
            r#"
            [datasets.topics-tree]
            poll_interval_polling_ms = 4000

            [datasets.connectors]
            stale_window_polling_ms = 2000
            "#,
        )
        .unwrap();

        let merged = merge_configs(base, over);
        let topics = merged.datasets["topics-tree"];
        assert_eq!(topics.poll_interval_realtime_ms, Some(60000));
        assert_eq!(topics.poll_interval_polling_ms, Some(4000));
        assert!(merged.datasets.contains_key("connectors"));
    }

    #[test]
    fn test_load_from_paths_skips_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let present = write(dir.path(), "a.toml", "[cache]\ngc_after_secs = 60\n");
        let missing = dir.path().join("missing.toml");

        let config = load_from_paths(&[missing, present]).unwrap();
        assert_eq!(config.cache.gc_after(), Duration::from_secs(60));
    }

    #[test]
    fn test_load_from_paths_later_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        let user = write(dir.path(), "user.toml", "[push]\nenabled = false\nreconnect_delay_ms = 500\n");
        let project = write(dir.path(), "project.toml", "[push]\nenabled = true\n");

        let config = load_from_paths(&[user, project]).unwrap();
        assert!(config.push.enabled());
        assert_eq!(config.push.reconnect_delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_parse_error_is_reported_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let bad = write(dir.path(), "bad.toml", "[api\nbase_url = ");

        let err = load_from_paths(&[bad.clone()]).unwrap_err();
        match err {
            ConfigError::ConfigParseError { path, .. } => assert_eq!(path, bad),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_env_overrides() {
        temp_env::with_vars(
            [
                (ENV_API_URL, Some("https://uds.example/api")),
                (ENV_PUSH_URL, None),
                (ENV_AUTH_TOKEN, Some("secret")),
            ],
            || {
                let config = apply_env_overrides(UdsConfig::default());
                assert_eq!(config.api.base_url(), "https://uds.example/api");
                assert_eq!(config.push.url, None);
                assert_eq!(config.auth_token.as_deref(), Some("secret"));
            },
        );
    }

    #[test]
    fn test_empty_env_value_is_ignored() {
        temp_env::with_var(ENV_AUTH_TOKEN, Some("  "), || {
            let config = apply_env_overrides(UdsConfig::default());
            assert_eq!(config.auth_token, None);
        });
    }

    #[test]
    fn test_project_config_path() {
        let path = project_config_path(Path::new("/srv/plant"));
        assert_eq!(path, PathBuf::from("/srv/plant/.uds/config.toml"));
    }
}
