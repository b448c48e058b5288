//! uds-core: adaptive data-freshness client for the Unified Data Space backend.
//!
//! Named, server-derived data sets are cached and refreshed on a schedule
//! that depends on whether the push channel is live. Push events invalidate
//! mapped data sets immediately.
//!
//! # Main Entry Points
//!
//! - [`session`] - Begin and end a client session; the only accessor to the cache
//! - [`cache`] - Freshness-scheduled data-set cache
//! - [`bridge`] - Push event → data-set invalidation rules
//! - [`connectivity`] - Push channel liveness signal
//! - [`push`] - Socket.IO push channel client with reconnect state machine
//! - [`fetch`] - REST fetch layer

pub mod bridge;
pub mod cache;
pub mod catalog;
pub mod connectivity;
pub mod errors;
pub mod fetch;
pub mod logging;
pub mod policy;
pub mod push;
pub mod session;

pub use bridge::InvalidationBridge;
pub use cache::{DataSetCache, DataSetSpec, EntryStatus, Snapshot, Subscription};
pub use connectivity::{ConnectivityMode, ConnectivitySignal, ConnectivityState};
pub use errors::{CacheError, FetchError, PushError, SessionError, UdsError};
pub use fetch::{ApiClient, AuthExpiry, Fetch, HttpEndpoint, Payload, fetch_fn};
pub use logging::init_logging;
pub use policy::FreshnessPolicy;
pub use push::{PushClient, PushHandle, PushState};
pub use session::Session;

pub use uds_config::{ConfigError, UdsConfig};
pub use uds_protocol::{DataSetKey, well_known};
