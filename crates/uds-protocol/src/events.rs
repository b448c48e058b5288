//! Names of the push events the backend emits.
//!
//! Only the name of an event matters to the client cache; payloads are
//! forwarded untouched.

/// A new MQTT message arrived on any topic.
pub const MQTT_MESSAGE: &str = "mqtt:message";

/// A broker connected, disconnected or changed its active flag.
pub const MQTT_BROKER_STATUS: &str = "mqtt:broker-status";

/// Aggregate dashboard metrics were recomputed.
pub const METRICS_UPDATE: &str = "metrics:update";

/// Every domain event the standard invalidation rules react to.
pub const DOMAIN_EVENTS: [&str; 3] = [MQTT_MESSAGE, MQTT_BROKER_STATUS, METRICS_UPDATE];
