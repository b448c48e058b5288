//! Maps push event names to the data sets they invalidate.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;
use tracing::{debug, error, warn};
use uds_protocol::DataSetKey;

use crate::cache::DataSetCache;

/// Many-to-many event → key rules, applied to one cache.
#[derive(Debug)]
pub struct InvalidationBridge {
    cache: DataSetCache,
    rules: Mutex<HashMap<String, BTreeSet<DataSetKey>>>,
}

impl InvalidationBridge {
    pub fn new(cache: DataSetCache) -> Self {
        Self {
            cache,
            rules: Mutex::new(HashMap::new()),
        }
    }

    fn rules(&self) -> MutexGuard<'_, HashMap<String, BTreeSet<DataSetKey>>> {
        self.rules.lock().unwrap_or_else(|poisoned| {
            error!(event = "core.bridge.lock_poisoned");
            poisoned.into_inner()
        })
    }

    /// Map `event` to `keys`. Registering the same pair again changes nothing.
    pub fn register<I, K>(&self, event: &str, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: Into<DataSetKey>,
    {
        let mut rules = self.rules();
        let targets = rules.entry(event.to_string()).or_default();
        for key in keys {
            targets.insert(key.into());
        }
        debug!(event = "core.bridge.registered", name = event, targets = targets.len());
    }

    /// Invalidate every key mapped to `event`. The payload is not inspected.
    ///
    /// Returns how many keys were invalidated; unmapped events return 0.
    pub fn on_event(&self, event: &str, _payload: &Value) -> usize {
        let targets: Vec<DataSetKey> = match self.rules().get(event) {
            Some(keys) => keys.iter().cloned().collect(),
            None => return 0,
        };

        let mut invalidated = 0;
        for key in &targets {
            match self.cache.invalidate(key.as_str()) {
                Ok(()) => invalidated += 1,
                Err(e) => warn!(
                    event = "core.bridge.invalidate_failed",
                    name = event,
                    key = %key,
                    error = %e,
                ),
            }
        }
        debug!(event = "core.bridge.event_applied", name = event, invalidated = invalidated);
        invalidated
    }

    /// Keys currently mapped to `event`, sorted.
    pub fn targets(&self, event: &str) -> Vec<DataSetKey> {
        self.rules()
            .get(event)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.rules().is_empty()
    }

    /// Remove every registration.
    pub fn clear(&self) {
        self.rules().clear();
        debug!(event = "core.bridge.cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{DataSetSpec, EntryStatus};
    use crate::connectivity::ConnectivitySignal;
    use crate::fetch::fetch_fn;
    use crate::policy::FreshnessPolicy;
    use std::time::Duration;

    fn cache_with(keys: &[&str]) -> DataSetCache {
        let cache = DataSetCache::new(ConnectivitySignal::new());
        for key in keys {
            cache
                .define(DataSetSpec::new(
                    *key,
                    fetch_fn(|| async { Ok(serde_json::json!(1)) }),
                    FreshnessPolicy::fixed(Duration::from_secs(10), Duration::from_secs(5)),
                ))
                .unwrap();
        }
        cache
    }

    #[test]
    fn test_register_is_idempotent() {
        let bridge = InvalidationBridge::new(cache_with(&["topics-tree"]));
        bridge.register("mqtt:message", ["topics-tree"]);
        bridge.register("mqtt:message", ["topics-tree"]);
        assert_eq!(
            bridge.targets("mqtt:message"),
            vec![DataSetKey::new("topics-tree")]
        );
        assert_eq!(bridge.on_event("mqtt:message", &Value::Null), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_registration_refetches_once() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let cache = DataSetCache::new(ConnectivitySignal::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        cache
            .define(DataSetSpec::new(
                "topics-tree",
                fetch_fn(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Ok(serde_json::json!([])) }
                }),
                FreshnessPolicy::fixed(Duration::from_secs(10), Duration::from_secs(5)),
            ))
            .unwrap();
        let _sub = cache.subscribe("topics-tree").unwrap();

        let bridge = InvalidationBridge::new(cache.clone());
        bridge.register("mqtt:message", ["topics-tree"]);
        bridge.register("mqtt:message", ["topics-tree"]);
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }

        bridge.on_event("mqtt:message", &Value::Null);
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_millis(100)).await;
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_many_to_many() {
        let bridge = InvalidationBridge::new(cache_with(&["a", "b", "c"]));
        bridge.register("x", ["a", "b"]);
        bridge.register("y", ["b", "c"]);
        assert_eq!(bridge.on_event("x", &Value::Null), 2);
        assert_eq!(bridge.on_event("y", &Value::Null), 2);
    }

    #[test]
    fn test_unmapped_event_ignored() {
        let bridge = InvalidationBridge::new(cache_with(&["a"]));
        bridge.register("x", ["a"]);
        assert_eq!(bridge.on_event("alarm:raised", &serde_json::json!({"id": 1})), 0);
    }

    #[tokio::test]
    async fn test_event_marks_entry_stale() {
        let cache = cache_with(&["topics-tree"]);
        cache.read("topics-tree").await.unwrap();
        assert_eq!(cache.peek("topics-tree").unwrap().status, EntryStatus::Fresh);

        let bridge = InvalidationBridge::new(cache.clone());
        bridge.register("mqtt:message", ["topics-tree"]);
        bridge.on_event("mqtt:message", &serde_json::json!({"topic": "plant/line1/temp"}));
        assert_eq!(cache.peek("topics-tree").unwrap().status, EntryStatus::Stale);
    }

    #[test]
    fn test_unknown_key_does_not_count() {
        let bridge = InvalidationBridge::new(cache_with(&["a"]));
        bridge.register("x", ["a", "missing"]);
        assert_eq!(bridge.on_event("x", &Value::Null), 1);
    }

    #[test]
    fn test_clear_removes_rules() {
        let bridge = InvalidationBridge::new(cache_with(&["a"]));
        bridge.register("x", ["a"]);
        bridge.clear();
        assert!(bridge.is_empty());
        assert_eq!(bridge.on_event("x", &Value::Null), 0);
    }
}
