//! Freshness-scheduled cache of named data sets.
//!
//! Each key has a fetcher and a [`FreshnessPolicy`]. Reads return the cached
//! value while it is inside the current staleness window and join or start a
//! fetch otherwise. At most one fetch per key runs at a time. Subscribed
//! keys are polled at the interval selected by the shared
//! [`ConnectivitySignal`].

mod scheduler;
mod slot;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{error, info};
use uds_protocol::DataSetKey;

use crate::connectivity::ConnectivitySignal;
use crate::errors::{CacheError, FetchError};
use crate::fetch::Fetch;
use crate::policy::FreshnessPolicy;
use slot::Slot;

/// Definition of one named data set.
pub struct DataSetSpec {
    pub key: DataSetKey,
    pub fetch: Arc<dyn Fetch>,
    pub policy: FreshnessPolicy,
}

impl DataSetSpec {
    pub fn new(key: impl Into<DataSetKey>, fetch: Arc<dyn Fetch>, policy: FreshnessPolicy) -> Self {
        Self {
            key: key.into(),
            fetch,
            policy,
        }
    }
}

/// Lifecycle state of a cache entry.
///
/// `Empty → Fetching → Fresh → Stale → Fetching → …`, with `Fetching → Error`
/// on failure. An `Error` entry keeps its previous value and counts as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Empty,
    Fetching,
    Fresh,
    Stale,
    Error,
}

/// Point-in-time view of one entry.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub key: DataSetKey,
    /// Last successfully fetched value, kept across failures.
    pub value: Option<Arc<Value>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Error of the most recent fetch, cleared by the next success.
    pub error: Option<FetchError>,
    pub status: EntryStatus,
}

impl Snapshot {
    fn empty(key: DataSetKey) -> Self {
        Self {
            key,
            value: None,
            updated_at: None,
            error: None,
            status: EntryStatus::Empty,
        }
    }

    /// Decode the value into one of the typed payload views.
    pub fn decode<T: DeserializeOwned>(&self) -> Option<Result<T, serde_json::Error>> {
        self.value
            .as_deref()
            .map(|value| T::deserialize(value))
    }
}

/// Keeps a key observed. The key is polled while at least one subscription
/// is alive; dropping the last one stops the polling.
pub struct Subscription {
    slot: Arc<Slot>,
    rx: watch::Receiver<Snapshot>,
}

impl Subscription {
    pub fn key(&self) -> &DataSetKey {
        self.slot.key()
    }

    /// Most recently published snapshot.
    pub fn latest(&self) -> Snapshot {
        self.rx.borrow().clone()
    }

    /// Wait for the next published snapshot.
    pub async fn changed(&mut self) -> Option<Snapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.slot.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", self.slot.key())
            .finish()
    }
}

struct CacheInner {
    connectivity: ConnectivitySignal,
    slots: Mutex<HashMap<DataSetKey, Arc<Slot>>>,
}

/// Shared handle to the data-set cache. Cloning is cheap.
#[derive(Clone)]
pub struct DataSetCache {
    inner: Arc<CacheInner>,
}

impl DataSetCache {
    pub fn new(connectivity: ConnectivitySignal) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                connectivity,
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn connectivity(&self) -> &ConnectivitySignal {
        &self.inner.connectivity
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<DataSetKey, Arc<Slot>>> {
        self.inner.slots.lock().unwrap_or_else(|poisoned| {
            error!(event = "core.cache.slots_lock_poisoned");
            poisoned.into_inner()
        })
    }

    fn slot(&self, key: &str) -> Result<Arc<Slot>, CacheError> {
        self.slots()
            .get(key)
            .cloned()
            .ok_or_else(|| CacheError::UnknownKey {
                key: DataSetKey::new(key),
            })
    }

    /// Register a data set. Each key may be defined once.
    pub fn define(&self, spec: DataSetSpec) -> Result<(), CacheError> {
        spec.policy
            .validate()
            .map_err(|message| CacheError::InvalidPolicy {
                key: spec.key.clone(),
                message,
            })?;

        let mut slots = self.slots();
        if slots.contains_key(&spec.key) {
            return Err(CacheError::AlreadyDefined { key: spec.key });
        }
        let slot = Slot::new(
            spec.key.clone(),
            spec.fetch,
            spec.policy,
            self.inner.connectivity.clone(),
        );
        slots.insert(spec.key, Arc::new(slot));
        Ok(())
    }

    pub fn is_defined(&self, key: &str) -> bool {
        self.slots().contains_key(key)
    }

    pub fn keys(&self) -> Vec<DataSetKey> {
        let mut keys: Vec<_> = self.slots().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Cached value if inside the current staleness window and not
    /// invalidated, otherwise the result of a (possibly shared) fetch.
    ///
    /// On failure the previous value stays available through [`peek`](Self::peek).
    pub async fn read(&self, key: &str) -> Result<Arc<Value>, CacheError> {
        let slot = self.slot(key)?;
        Ok(slot.read().await?)
    }

    /// Current state without triggering anything.
    pub fn peek(&self, key: &str) -> Result<Snapshot, CacheError> {
        Ok(self.slot(key)?.snapshot())
    }

    /// Mark stale now; an observed key refetches immediately.
    pub fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        self.slot(key)?.invalidate();
        Ok(())
    }

    /// Start observing a key. Must be called inside a tokio runtime.
    pub fn subscribe(&self, key: &str) -> Result<Subscription, CacheError> {
        let slot = self.slot(key)?;
        let rx = slot.subscribe_snapshots();
        slot.acquire();
        Ok(Subscription { slot, rx })
    }

    /// Number of live subscriptions for `key`.
    pub fn observers(&self, key: &str) -> Result<usize, CacheError> {
        Ok(self.slot(key)?.observers())
    }

    /// Drop values of entries nobody has observed for `gc_after`.
    pub fn evict_unobserved(&self, gc_after: Duration) -> usize {
        let slots: Vec<_> = self.slots().values().cloned().collect();
        let evicted = slots
            .iter()
            .filter(|slot| slot.evict_if_idle(gc_after))
            .count();
        if evicted > 0 {
            info!(event = "core.cache.evicted", count = evicted);
        }
        evicted
    }

    /// Remove every data set. Fetches still running complete into nothing.
    pub fn clear(&self) {
        let slots: Vec<_> = self.slots().drain().map(|(_, slot)| slot).collect();
        for slot in &slots {
            slot.retire();
        }
        info!(event = "core.cache.cleared", count = slots.len());
    }
}

impl std::fmt::Debug for DataSetCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSetCache")
            .field("keys", &self.keys())
            .field("connected", &self.inner.connectivity.is_connected())
            .finish()
    }
}
