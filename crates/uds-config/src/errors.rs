use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to parse config file '{}': {message}", path.display())]
    ConfigParseError { path: PathBuf, message: String },

    #[error("Invalid URL for {field}: '{url}' (expected http:// or https://)")]
    InvalidUrl { field: &'static str, url: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("IO error reading config: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },
}
