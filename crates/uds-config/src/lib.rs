//! # uds-config
//!
//! TOML configuration types, loading, and validation for the UDS client.
//!
//! Only the REST base URL and push endpoint are required inputs; everything
//! else has defaults matching the web client the backend was built for.

mod loading;
mod validation;

pub mod errors;
pub mod types;

pub use errors::ConfigError;
pub use loading::{
    ENV_API_URL, ENV_AUTH_TOKEN, ENV_PUSH_URL, apply_env_overrides, load_config_file,
    load_from_paths, load_hierarchy, merge_configs, project_config_path, user_config_path,
};
pub use types::{ApiConfig, CacheConfig, DataSetOverride, PushConfig, UdsConfig};
pub use validation::validate_config;

impl UdsConfig {
    /// Load configuration from the hierarchy of config files and environment.
    ///
    /// See [`loading::load_hierarchy`] for details.
    pub fn load_hierarchy() -> Result<Self, ConfigError> {
        loading::load_hierarchy()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate_config(self)
    }
}
