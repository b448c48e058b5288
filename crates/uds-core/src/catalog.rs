//! Standard data sets of the UDS backend and the push events that
//! invalidate them.

use std::time::Duration;

use uds_config::UdsConfig;
use uds_protocol::{DataSetKey, events, well_known};

use crate::fetch::Payload;
use crate::policy::FreshnessPolicy;

/// A standard data set: key, REST path and default policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub key: &'static str,
    pub path: &'static str,
    pub policy: FreshnessPolicy,
    pub payload: Payload,
}

const fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

/// Topic tree: 30 s / 6 s polling, 15 s / 3 s staleness.
const TOPICS: FreshnessPolicy = FreshnessPolicy::new(secs(30), secs(6), secs(15), secs(3));
/// Dashboard summary polls on a fixed 6 s regardless of the push channel.
const SUMMARY: FreshnessPolicy = FreshnessPolicy::fixed(secs(6), secs(3));
/// Broker, system and connector sets: fixed 10 s / 5 s.
const STEADY: FreshnessPolicy = FreshnessPolicy::fixed(secs(10), secs(5));
/// Alarm and OEE sets, which no push event covers.
const OPERATIONAL: FreshnessPolicy = FreshnessPolicy::new(secs(10), secs(5), secs(3), secs(3));

pub const STANDARD_DATA_SETS: [CatalogEntry; 10] = [
    CatalogEntry {
        key: well_known::DASHBOARD_METRICS,
        path: "/metrics/summary",
        policy: SUMMARY,
        payload: Payload::Required,
    },
    CatalogEntry {
        key: well_known::SYSTEM_METRICS,
        path: "/metrics/system",
        policy: STEADY,
        payload: Payload::Required,
    },
    CatalogEntry {
        key: well_known::BROKER_STATUS,
        path: "/metrics/broker-status",
        policy: STEADY,
        payload: Payload::Required,
    },
    CatalogEntry {
        key: well_known::CONNECTORS,
        path: "/metrics/connectors",
        policy: STEADY,
        payload: Payload::Required,
    },
    CatalogEntry {
        key: well_known::TOPICS_TREE,
        path: "/topics",
        policy: TOPICS,
        payload: Payload::Required,
    },
    CatalogEntry {
        key: well_known::ACTIVE_BROKER,
        path: "/brokers/active",
        policy: STEADY,
        payload: Payload::Optional,
    },
    CatalogEntry {
        key: well_known::BROKERS_STATUS,
        path: "/brokers/status",
        policy: STEADY,
        payload: Payload::Required,
    },
    CatalogEntry {
        key: well_known::ALARM_EVENTS_ACTIVE,
        path: "/alarms/events/active",
        policy: OPERATIONAL,
        payload: Payload::Required,
    },
    CatalogEntry {
        key: well_known::ALARM_SUMMARY,
        path: "/alarms/summary",
        policy: OPERATIONAL,
        payload: Payload::Required,
    },
    CatalogEntry {
        key: well_known::OEE_CURRENT,
        path: "/oee/current",
        policy: OPERATIONAL,
        payload: Payload::Required,
    },
];

pub const STANDARD_RULES: [(&str, &[&str]); 3] = [
    (events::MQTT_MESSAGE, &[well_known::TOPICS_TREE]),
    (
        events::MQTT_BROKER_STATUS,
        &[well_known::ACTIVE_BROKER, well_known::BROKERS_STATUS],
    ),
    (
        events::METRICS_UPDATE,
        &[well_known::DASHBOARD_METRICS, well_known::SYSTEM_METRICS],
    ),
];

/// Catalog with the configured per-key overrides applied.
pub fn standard_data_sets(config: &UdsConfig) -> Vec<CatalogEntry> {
    STANDARD_DATA_SETS
        .iter()
        .map(|entry| match config.datasets.get(entry.key) {
            Some(over) => CatalogEntry {
                policy: entry.policy.with_override(over),
                ..*entry
            },
            None => *entry,
        })
        .collect()
}

/// Standard invalidation rules as owned keys.
pub fn standard_rules() -> Vec<(&'static str, Vec<DataSetKey>)> {
    STANDARD_RULES
        .iter()
        .map(|(event, keys)| (*event, keys.iter().map(|k| DataSetKey::new(*k)).collect()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_catalog_keys_unique_and_policies_valid() {
        let mut seen = HashSet::new();
        for entry in STANDARD_DATA_SETS {
            assert!(seen.insert(entry.key), "duplicate key {}", entry.key);
            assert!(entry.path.starts_with('/'));
            assert!(entry.policy.validate().is_ok(), "{}", entry.key);
        }
    }

    #[test]
    fn test_topics_tree_policy() {
        let topics = STANDARD_DATA_SETS
            .iter()
            .find(|e| e.key == "topics-tree")
            .unwrap();
        assert_eq!(topics.policy.poll_interval_realtime, Duration::from_secs(30));
        assert_eq!(topics.policy.poll_interval_polling, Duration::from_secs(6));
        assert_eq!(topics.policy.stale_window_polling, Duration::from_secs(3));
    }

    #[test]
    fn test_rules_target_catalog_keys() {
        let keys: HashSet<_> = STANDARD_DATA_SETS.iter().map(|e| e.key).collect();
        for (event, targets) in standard_rules() {
            assert!(events::DOMAIN_EVENTS.contains(&event));
            for key in targets {
                assert!(keys.contains(key.as_str()), "{event} → {key}");
            }
        }
    }

    #[test]
    fn test_overrides_applied() {
        let config: UdsConfig = toml::from_str(
            r#"
            [datasets.topics-tree]
            poll_interval_realtime_ms = 60000
            "#,
        )
        .unwrap();
        let sets = standard_data_sets(&config);
        let topics = sets.iter().find(|e| e.key == "topics-tree").unwrap();
        assert_eq!(topics.policy.poll_interval_realtime, Duration::from_secs(60));
        assert_eq!(topics.policy.poll_interval_polling, Duration::from_secs(6));
        let system = sets.iter().find(|e| e.key == "system-metrics").unwrap();
        assert_eq!(system.policy, STEADY);
    }

    #[test]
    fn test_only_active_broker_allows_empty_data() {
        for entry in STANDARD_DATA_SETS {
            let expected = if entry.key == well_known::ACTIVE_BROKER {
                Payload::Optional
            } else {
                Payload::Required
            };
            assert_eq!(entry.payload, expected, "{}", entry.key);
        }
    }
}
