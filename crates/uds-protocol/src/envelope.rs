use serde::{Deserialize, Serialize};

/// Generic message used when the server reports a failure without text.
const GENERIC_FAILURE: &str = "Request failed";

/// Response envelope returned by every REST endpoint.
///
/// `{ "success": true, "data": ..., "timestamp": "..." }` on success,
/// `{ "success": false, "error": "..." }` on application failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Application-level failure carried by an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiFailure {
    pub message: String,
}

impl std::fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ApiFailure {}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: None,
            timestamp: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            message: None,
            timestamp: None,
        }
    }

    /// Unwrap the payload, treating `success:false` and a missing `data` the same.
    pub fn into_result(self) -> Result<T, ApiFailure> {
        self.into_result_or(GENERIC_FAILURE)
    }

    /// Like [`into_result`](Self::into_result) with a caller-chosen fallback
    /// message for failures that carry no `error` string.
    pub fn into_result_or(self, fallback: &str) -> Result<T, ApiFailure> {
        match self {
            ApiResponse {
                success: true,
                data: Some(data),
                ..
            } => Ok(data),
            ApiResponse { error, .. } => Err(ApiFailure {
                message: error
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| fallback.to_string()),
            }),
        }
    }

    /// For endpoints where "nothing" is a valid answer: only `success:false`
    /// fails, and a missing or `null` `data` is `Ok(None)`.
    pub fn into_optional_or(self, fallback: &str) -> Result<Option<T>, ApiFailure> {
        if self.success {
            return Ok(self.data);
        }
        Err(ApiFailure {
            message: self
                .error
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| fallback.to_string()),
        })
    }
}
