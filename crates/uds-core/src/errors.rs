use std::error::Error;

use uds_protocol::DataSetKey;

/// Base trait for all UDS client errors.
pub trait UdsError: Error + Send + Sync + 'static {
    /// Error code for programmatic handling
    fn error_code(&self) -> &'static str;

    /// Whether this error is caused by caller input or configuration
    fn is_user_error(&self) -> bool {
        false
    }
}

/// Failure of a single data-set fetch.
///
/// Cloned into every reader that joined the fetch and kept on the cache entry
/// next to the last good value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("transport error: {message}")]
    Transport { message: String },

    #[error("request timed out")]
    Timeout,

    #[error("HTTP {status}")]
    Http { status: u16 },

    #[error("unauthorized")]
    Unauthorized,

    /// `success:false` (or no `data`) in the response envelope. Displays the
    /// server's message verbatim.
    #[error("{message}")]
    Application { message: String },

    #[error("invalid response body: {message}")]
    Parse { message: String },

    #[error("fetch aborted: {message}")]
    Aborted { message: String },
}

impl FetchError {
    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_decode() {
            FetchError::Parse {
                message: e.to_string(),
            }
        } else {
            FetchError::Transport {
                message: e.to_string(),
            }
        }
    }
}

impl UdsError for FetchError {
    fn error_code(&self) -> &'static str {
        match self {
            FetchError::Transport { .. } => "FETCH_TRANSPORT",
            FetchError::Timeout => "FETCH_TIMEOUT",
            FetchError::Http { .. } => "FETCH_HTTP",
            FetchError::Unauthorized => "FETCH_UNAUTHORIZED",
            FetchError::Application { .. } => "FETCH_APPLICATION",
            FetchError::Parse { .. } => "FETCH_PARSE",
            FetchError::Aborted { .. } => "FETCH_ABORTED",
        }
    }

    fn is_user_error(&self) -> bool {
        matches!(self, FetchError::Unauthorized)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Unknown data set '{key}'")]
    UnknownKey { key: DataSetKey },

    #[error("Data set '{key}' is already defined")]
    AlreadyDefined { key: DataSetKey },

    #[error("Invalid policy for '{key}': {message}")]
    InvalidPolicy { key: DataSetKey, message: String },

    /// Displays exactly as the underlying fetch error.
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl UdsError for CacheError {
    fn error_code(&self) -> &'static str {
        match self {
            CacheError::UnknownKey { .. } => "CACHE_UNKNOWN_KEY",
            CacheError::AlreadyDefined { .. } => "CACHE_ALREADY_DEFINED",
            CacheError::InvalidPolicy { .. } => "CACHE_INVALID_POLICY",
            CacheError::Fetch(e) => e.error_code(),
        }
    }

    fn is_user_error(&self) -> bool {
        match self {
            CacheError::UnknownKey { .. }
            | CacheError::AlreadyDefined { .. }
            | CacheError::InvalidPolicy { .. } => true,
            CacheError::Fetch(e) => e.is_user_error(),
        }
    }
}

/// Push transport failure. Only ever observed inside the push task; the
/// outside world sees state transitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PushError {
    #[error("Invalid push URL '{url}'")]
    InvalidUrl { url: String },

    #[error("Push connect failed: {message}")]
    ConnectFailed { message: String },

    #[error("Push handshake timed out")]
    HandshakeTimeout,

    #[error("Push connection rejected: {message}")]
    Rejected { message: String },

    #[error("Push protocol error: {message}")]
    Protocol { message: String },

    #[error("Push transport error: {message}")]
    Transport { message: String },
}

impl UdsError for PushError {
    fn error_code(&self) -> &'static str {
        match self {
            PushError::InvalidUrl { .. } => "PUSH_INVALID_URL",
            PushError::ConnectFailed { .. } => "PUSH_CONNECT_FAILED",
            PushError::HandshakeTimeout => "PUSH_HANDSHAKE_TIMEOUT",
            PushError::Rejected { .. } => "PUSH_REJECTED",
            PushError::Protocol { .. } => "PUSH_PROTOCOL",
            PushError::Transport { .. } => "PUSH_TRANSPORT",
        }
    }

    fn is_user_error(&self) -> bool {
        matches!(self, PushError::InvalidUrl { .. } | PushError::Rejected { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] uds_config::ConfigError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Push(#[from] PushError),

    #[error("Failed to build HTTP client: {message}")]
    HttpClient { message: String },
}

impl UdsError for SessionError {
    fn error_code(&self) -> &'static str {
        match self {
            SessionError::Config(e) => e.error_code(),
            SessionError::Cache(e) => e.error_code(),
            SessionError::Push(e) => e.error_code(),
            SessionError::HttpClient { .. } => "SESSION_HTTP_CLIENT",
        }
    }

    fn is_user_error(&self) -> bool {
        match self {
            SessionError::Config(e) => e.is_user_error(),
            SessionError::Cache(e) => e.is_user_error(),
            SessionError::Push(e) => e.is_user_error(),
            SessionError::HttpClient { .. } => false,
        }
    }
}

impl UdsError for uds_config::ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            uds_config::ConfigError::ConfigParseError { .. } => "CONFIG_PARSE_ERROR",
            uds_config::ConfigError::InvalidUrl { .. } => "CONFIG_INVALID_URL",
            uds_config::ConfigError::InvalidConfiguration { .. } => "INVALID_CONFIGURATION",
            uds_config::ConfigError::IoError { .. } => "CONFIG_IO_ERROR",
        }
    }

    fn is_user_error(&self) -> bool {
        !matches!(self, uds_config::ConfigError::IoError { .. })
    }
}
