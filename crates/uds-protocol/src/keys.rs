use std::borrow::Borrow;

use serde::{Deserialize, Serialize};

/// Stable identity of a named data set in the client cache.
///
/// Keys are plain strings on the wire (`"topics-tree"`, `"dashboard-metrics"`).
/// The newtype keeps them from being mixed up with event names or URL paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataSetKey(String);

impl DataSetKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DataSetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DataSetKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DataSetKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for DataSetKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for DataSetKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Keys of the data sets the dashboard screens read.
pub mod well_known {
    pub const DASHBOARD_METRICS: &str = "dashboard-metrics";
    pub const SYSTEM_METRICS: &str = "system-metrics";
    pub const BROKER_STATUS: &str = "broker-status";
    pub const CONNECTORS: &str = "connectors";
    pub const TOPICS_TREE: &str = "topics-tree";
    pub const ACTIVE_BROKER: &str = "active-broker";
    pub const BROKERS_STATUS: &str = "brokers-status";
    pub const ALARM_EVENTS_ACTIVE: &str = "alarm-events-active";
    pub const ALARM_SUMMARY: &str = "alarm-summary";
    pub const OEE_CURRENT: &str = "oee-current";
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_key_serializes_as_plain_string() {
        let key = DataSetKey::from(well_known::TOPICS_TREE);
        assert_eq!(serde_json::to_string(&key).unwrap(), r#""topics-tree""#);
        let parsed: DataSetKey = serde_json::from_str(r#""active-broker""#).unwrap();
        assert_eq!(parsed.as_str(), well_known::ACTIVE_BROKER);
    }

    #[test]
    fn test_key_lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(DataSetKey::from("dashboard-metrics"), 1);
        assert_eq!(map.get("dashboard-metrics"), Some(&1));
        assert_eq!(map.get("system-metrics"), None);
    }

    #[test]
    fn test_key_display() {
        assert_eq!(DataSetKey::new("oee-current").to_string(), "oee-current");
    }
}
