//! Client session: the single owner of cache, invalidation rules,
//! connectivity and push channel.
//!
//! A session begins at login and ends at logout. Consumers only get
//! [`read`](Session::read), [`peek`](Session::peek),
//! [`invalidate`](Session::invalidate) and [`subscribe`](Session::subscribe);
//! everything else is wired up here.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uds_config::{PushConfig, UdsConfig};
use uds_protocol::DataSetKey;

use crate::bridge::InvalidationBridge;
use crate::cache::{DataSetCache, DataSetSpec, Snapshot, Subscription};
use crate::catalog;
use crate::connectivity::ConnectivitySignal;
use crate::errors::{CacheError, SessionError};
use crate::fetch::{ApiClient, AuthExpiry, HttpEndpoint};
use crate::push::{PushClient, PushHandle, PushState, PushTransport, WebSocketTransport};

const MAX_SWEEP_PERIOD: Duration = Duration::from_secs(60);
const MIN_SWEEP_PERIOD: Duration = Duration::from_millis(100);

/// Assembles a session from explicit parts.
///
/// [`Session::begin`] uses this with the standard catalog, REST fetchers and
/// WebSocket transport; tests substitute their own.
pub struct SessionBuilder {
    data_sets: Vec<DataSetSpec>,
    rules: Vec<(String, Vec<DataSetKey>)>,
    transport: Option<Arc<dyn PushTransport>>,
    token: Option<String>,
    push_config: PushConfig,
    gc_after: Duration,
    expiry: AuthExpiry,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self {
            data_sets: Vec::new(),
            rules: Vec::new(),
            transport: None,
            token: None,
            push_config: PushConfig::default(),
            gc_after: Duration::from_secs(uds_config::types::DEFAULT_GC_AFTER_SECS),
            expiry: AuthExpiry::new(),
        }
    }
}

impl SessionBuilder {
    pub fn data_set(mut self, spec: DataSetSpec) -> Self {
        self.data_sets.push(spec);
        self
    }

    pub fn rule<I, K>(mut self, event: &str, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<DataSetKey>,
    {
        self.rules
            .push((event.to_string(), keys.into_iter().map(Into::into).collect()));
        self
    }

    /// Push transport. Without one the session stays on polling intervals.
    pub fn transport(mut self, transport: Arc<dyn PushTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// Reconnect and connect-timeout settings for the push client.
    pub fn push_config(mut self, config: PushConfig) -> Self {
        self.push_config = config;
        self
    }

    pub fn gc_after(mut self, gc_after: Duration) -> Self {
        self.gc_after = gc_after;
        self
    }

    /// Token-expiry flag shared with the session's [`ApiClient`]s.
    pub fn expiry(mut self, expiry: AuthExpiry) -> Self {
        self.expiry = expiry;
        self
    }

    /// Define data sets, register rules and start background tasks.
    /// Must be called inside a tokio runtime.
    pub fn start(self) -> Result<Session, SessionError> {
        let connectivity = ConnectivitySignal::new();
        let cache = DataSetCache::new(connectivity.clone());
        let data_set_count = self.data_sets.len();
        for spec in self.data_sets {
            cache.define(spec)?;
        }

        let bridge = Arc::new(InvalidationBridge::new(cache.clone()));
        for (event, keys) in self.rules {
            bridge.register(&event, keys);
        }

        let (push, push_state) = match self.transport {
            Some(transport) => {
                let handle = PushClient::new(transport, Arc::clone(&bridge), connectivity.clone())
                    .with_token(self.token)
                    .with_config(&self.push_config)
                    .spawn();
                let state = handle.subscribe();
                (Some(handle), state)
            }
            None => idle_push_state(),
        };

        let sweeper = CancellationToken::new();
        spawn_sweeper(cache.clone(), self.gc_after, sweeper.clone());

        info!(
            event = "core.session.started",
            data_sets = data_set_count,
            push = push.is_some(),
        );

        Ok(Session {
            cache,
            bridge,
            connectivity,
            push,
            push_state,
            sweeper,
            expiry: self.expiry,
        })
    }
}

fn idle_push_state() -> (Option<PushHandle>, watch::Receiver<PushState>) {
    let (_tx, rx) = watch::channel(PushState::Disconnected);
    (None, rx)
}

/// Periodically drop values nobody has observed for `gc_after`.
fn spawn_sweeper(cache: DataSetCache, gc_after: Duration, cancel: CancellationToken) {
    let period = gc_after.clamp(MIN_SWEEP_PERIOD, MAX_SWEEP_PERIOD);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    cache.evict_unobserved(gc_after);
                }
            }
        }
        debug!(event = "core.session.sweeper_stopped");
    });
}

/// A logged-in client session.
pub struct Session {
    cache: DataSetCache,
    bridge: Arc<InvalidationBridge>,
    connectivity: ConnectivitySignal,
    push: Option<PushHandle>,
    push_state: watch::Receiver<PushState>,
    sweeper: CancellationToken,
    expiry: AuthExpiry,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    /// Begin a session against the configured backend.
    ///
    /// Defines the standard data sets, registers the standard invalidation
    /// rules and, unless disabled, starts the push client. `token` falls back
    /// to `config.auth_token`.
    pub fn begin(config: &UdsConfig, token: Option<String>) -> Result<Self, SessionError> {
        config.validate()?;
        let token = token.or_else(|| config.auth_token.clone());

        let expiry = AuthExpiry::new();
        let client = ApiClient::new(&config.api, token.clone())
            .map_err(|e| SessionError::HttpClient {
                message: e.to_string(),
            })?
            .with_expiry(expiry.clone());

        let mut builder = Session::builder()
            .expiry(expiry)
            .token(token)
            .push_config(config.push.clone())
            .gc_after(config.cache.gc_after());

        for entry in catalog::standard_data_sets(config) {
            let key = DataSetKey::new(entry.key);
            let endpoint =
                HttpEndpoint::new(client.clone(), &key, entry.path).with_payload(entry.payload);
            builder = builder.data_set(DataSetSpec::new(key, Arc::new(endpoint), entry.policy));
        }
        for (event, keys) in catalog::standard_rules() {
            builder = builder.rule(event, keys);
        }

        if config.push.enabled() {
            let url = config.push.resolve_url(&config.api);
            builder = builder.transport(Arc::new(WebSocketTransport::new(&url)?));
        }

        builder.start()
    }

    pub async fn read(&self, key: &str) -> Result<Arc<Value>, CacheError> {
        self.cache.read(key).await
    }

    pub fn peek(&self, key: &str) -> Result<Snapshot, CacheError> {
        self.cache.peek(key)
    }

    pub fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        self.cache.invalidate(key)
    }

    pub fn subscribe(&self, key: &str) -> Result<Subscription, CacheError> {
        self.cache.subscribe(key)
    }

    pub fn connectivity(&self) -> &ConnectivitySignal {
        &self.connectivity
    }

    pub fn push_state(&self) -> PushState {
        *self.push_state.borrow()
    }

    pub fn subscribe_push_state(&self) -> watch::Receiver<PushState> {
        self.push_state.clone()
    }

    /// Whether the backend has rejected the session token. Once set, every
    /// REST fetch fails with `Unauthorized` until the caller ends this
    /// session and begins a new one.
    pub fn is_expired(&self) -> bool {
        self.expiry.is_expired()
    }

    pub fn subscribe_expiry(&self) -> watch::Receiver<bool> {
        self.expiry.subscribe()
    }

    /// Keys with registered invalidation rules for `event`.
    pub fn invalidation_targets(&self, event: &str) -> Vec<DataSetKey> {
        self.bridge.targets(event)
    }

    /// Intentionally close the push channel and tear down its registrations.
    /// Data sets keep refreshing on polling intervals.
    pub async fn close_push(&mut self) {
        if let Some(push) = self.push.take() {
            push.shutdown().await;
        }
        self.bridge.clear();
        info!(event = "core.session.push_closed");
    }

    /// Logout: stop push and background work and clear the cache. Fetches
    /// still running never repopulate anything.
    pub async fn end(mut self) {
        self.close_push().await;
        self.sweeper.cancel();
        self.cache.clear();
        info!(event = "core.session.ended");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.sweeper.cancel();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("cache", &self.cache)
            .field("push_state", &self.push_state())
            .finish()
    }
}
