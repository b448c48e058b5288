//! REST fetch layer over `reqwest`.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::StatusCode;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};
use uds_config::ApiConfig;
use uds_protocol::{ApiResponse, DataSetKey};

use super::Fetch;
use crate::errors::FetchError;

/// Whether an endpoint may answer `success:true` without `data`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Payload {
    /// Missing or `null` data is a failure.
    #[default]
    Required,
    /// Missing or `null` data is a valid empty answer, cached as `null`.
    Optional,
}

/// Raised once the backend rejects the session token.
///
/// Every clone observes the same flag. It never resets; a new token means a
/// new session.
#[derive(Debug, Clone)]
pub struct AuthExpiry {
    tx: Arc<watch::Sender<bool>>,
}

impl AuthExpiry {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub(crate) fn mark(&self) {
        let changed = self.tx.send_if_modified(|expired| !std::mem::replace(expired, true));
        if changed {
            warn!(event = "core.fetch.session_expired");
        }
    }

    pub fn is_expired(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for AuthExpiry {
    fn default() -> Self {
        Self::new()
    }
}

/// HTTP client shared by every data set of a session.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    expiry: AuthExpiry,
}

impl ApiClient {
    pub fn new(config: &ApiConfig, token: Option<String>) -> Result<Self, FetchError> {
        Self::with_timeout(config.base_url(), config.timeout(), token)
    }

    pub fn with_timeout(
        base_url: &str,
        timeout: Duration,
        token: Option<String>,
    ) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FetchError::from_reqwest)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            expiry: AuthExpiry::new(),
        })
    }

    /// Report 401 responses on `expiry` instead of a private flag.
    pub fn with_expiry(mut self, expiry: AuthExpiry) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn expiry(&self) -> &AuthExpiry {
        &self.expiry
    }

    /// `GET {base_url}{path}` and unwrap the response envelope.
    ///
    /// `fallback` is the message used when the server reports failure
    /// without an `error` string.
    pub async fn get(&self, path: &str, fallback: &str) -> Result<Value, FetchError> {
        self.get_payload(path, fallback, Payload::Required).await
    }

    /// Like [`get`](Self::get), but `success:true` without `data` yields
    /// `Value::Null`.
    pub async fn get_optional(&self, path: &str, fallback: &str) -> Result<Value, FetchError> {
        self.get_payload(path, fallback, Payload::Optional).await
    }

    async fn get_payload(
        &self,
        path: &str,
        fallback: &str,
        payload: Payload,
    ) -> Result<Value, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http.get(&url);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            let error = FetchError::from_reqwest(e);
            warn!(event = "core.fetch.request_failed", url = %url, error = %error);
            error
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            warn!(event = "core.fetch.unauthorized", url = %url);
            self.expiry.mark();
            return Err(FetchError::Unauthorized);
        }

        let body = response.bytes().await.map_err(FetchError::from_reqwest)?;
        debug!(
            event = "core.fetch.response_received",
            url = %url,
            status = status.as_u16(),
            bytes = body.len(),
        );

        let envelope = match serde_json::from_slice::<ApiResponse<Value>>(&body) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => {
                return Err(FetchError::Parse {
                    message: e.to_string(),
                });
            }
            Err(_) => {
                return Err(FetchError::Http {
                    status: status.as_u16(),
                });
            }
        };

        let unwrapped = match payload {
            Payload::Required => envelope.into_result_or(fallback),
            Payload::Optional => envelope
                .into_optional_or(fallback)
                .map(|data| data.unwrap_or(Value::Null)),
        };
        unwrapped.map_err(|failure| FetchError::Application {
            message: failure.message,
        })
    }
}

/// One REST endpoint backing one data set.
#[derive(Debug, Clone)]
pub struct HttpEndpoint {
    client: ApiClient,
    path: String,
    fallback: String,
    payload: Payload,
}

impl HttpEndpoint {
    pub fn new(client: ApiClient, key: &DataSetKey, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
            fallback: format!("Failed to fetch {}", key),
            payload: Payload::Required,
        }
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Fetch for HttpEndpoint {
    fn fetch(&self) -> BoxFuture<'static, Result<Value, FetchError>> {
        let endpoint = self.clone();
        async move {
            endpoint
                .client
                .get_payload(&endpoint.path, &endpoint.fallback, endpoint.payload)
                .await
        }
        .boxed()
    }
}
