//! Ingest module - update event sources feeding the monitor service

mod lines;
#[cfg(feature = "mqtt")]
mod mqtt;

pub use lines::LinesSource;
#[cfg(feature = "mqtt")]
pub use mqtt::MqttLink;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::MonitorHandle;
use crate::error::ServiceClosed;
use crate::sources::{SourceId, SubscriptionDiff, UpdateEvent};

/// MQTT configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Connect to the broker
    pub enabled: bool,
    /// Broker host
    pub broker: String,
    /// Broker port
    pub port: u16,
    /// MQTT client id
    pub client_id: String,
    /// Optional username
    pub username: Option<String>,
    /// Optional password
    pub password: Option<String>,
    /// Keep-alive interval in seconds
    pub keep_alive_secs: u64,
    /// Root of all topics, e.g. `tamperwatch/sources/12345`
    pub topic_prefix: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            broker: "localhost".to_string(),
            port: 1883,
            client_id: "tamperwatch".to_string(),
            username: None,
            password: None,
            keep_alive_secs: 30,
            topic_prefix: "tamperwatch".to_string(),
        }
    }
}

impl MqttConfig {
    /// Topic carrying readings for `id`
    pub fn source_topic(&self, id: SourceId) -> String {
        format!("{}/sources/{}", self.topic_prefix, id)
    }

    /// Topic under the prefix
    pub fn topic(&self, suffix: &str) -> String {
        format!("{}/{}", self.topic_prefix, suffix)
    }
}

/// Anything that delivers update events for a set of source identities
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Start and stop delivering for the identities in the diff
    async fn apply_subscriptions(&self, diff: &SubscriptionDiff) -> anyhow::Result<()>;
}

/// Errors decoding inbound messages
#[derive(Debug, Error)]
pub enum IngestError {
    /// Topic outside the prefix
    #[error("unexpected topic '{0}'")]
    UnknownTopic(String),

    /// Topic id is not a number
    #[error("invalid source id '{0}'")]
    InvalidSourceId(String),

    /// Payload is not the expected JSON
    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// Input stream failed
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),

    /// Monitor service stopped
    #[error(transparent)]
    Closed(#[from] ServiceClosed),
}

/// Sensor value as sent by devices: a boolean, or an integer state where
/// anything but 0 means sabotage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    /// `true`/`false`
    Bool(bool),
    /// Integer device state
    Int(i64),
}

impl RawValue {
    /// Truth value; integers are set when non-zero
    pub fn is_set(self) -> bool {
        match self {
            RawValue::Bool(b) => b,
            RawValue::Int(i) => i != 0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReadingPayload {
    value: RawValue,
    changed: bool,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

impl ReadingPayload {
    fn into_event(self, source_id: SourceId) -> UpdateEvent {
        UpdateEvent {
            source_id,
            new_value: self.value.is_set(),
            value_changed: self.changed,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
        }
    }
}

/// Decoded inbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Sensor reading
    Update(UpdateEvent),
    /// Monitoring toggle
    SetMonitoring(bool),
}

impl Inbound {
    /// Send to the monitor service
    pub async fn submit(self, handle: &MonitorHandle) -> Result<(), ServiceClosed> {
        match self {
            Inbound::Update(event) => handle.update(event).await,
            Inbound::SetMonitoring(enabled) => handle.set_monitoring(enabled).await.map(|_| ()),
        }
    }
}

/// Decode a message received under `prefix`
pub fn parse_message(prefix: &str, topic: &str, payload: &[u8]) -> Result<Inbound, IngestError> {
    let rest = topic
        .strip_prefix(prefix)
        .and_then(|r| r.strip_prefix('/'))
        .ok_or_else(|| IngestError::UnknownTopic(topic.to_string()))?;

    if rest == "monitoring/set" {
        let enabled: RawValue = serde_json::from_slice(payload)?;
        return Ok(Inbound::SetMonitoring(enabled.is_set()));
    }

    let id = rest
        .strip_prefix("sources/")
        .ok_or_else(|| IngestError::UnknownTopic(topic.to_string()))?;
    let id: u32 = id
        .parse()
        .map_err(|_| IngestError::InvalidSourceId(id.to_string()))?;

    let reading: ReadingPayload = serde_json::from_slice(payload)?;
    Ok(Inbound::Update(reading.into_event(SourceId(id))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reading() {
        let inbound = parse_message(
            "tw",
            "tw/sources/12345",
            br#"{"value": true, "changed": true, "timestamp": "2026-03-03T18:00:00Z"}"#,
        )
        .unwrap();

        match inbound {
            Inbound::Update(event) => {
                assert_eq!(event.source_id, SourceId(12345));
                assert!(event.new_value);
                assert!(event.value_changed);
                assert_eq!(event.timestamp.to_rfc3339(), "2026-03-03T18:00:00+00:00");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_integer_values_are_truthy() {
        let inbound = parse_message("tw", "tw/sources/7", br#"{"value": 1, "changed": false}"#).unwrap();
        assert!(matches!(inbound, Inbound::Update(UpdateEvent { new_value: true, value_changed: false, .. })));

        let inbound = parse_message("tw", "tw/sources/7", br#"{"value": 0, "changed": true}"#).unwrap();
        assert!(matches!(inbound, Inbound::Update(UpdateEvent { new_value: false, .. })));
    }

    #[test]
    fn test_parse_monitoring_toggle() {
        assert_eq!(
            parse_message("tw", "tw/monitoring/set", b"true").unwrap(),
            Inbound::SetMonitoring(true)
        );
        assert_eq!(
            parse_message("tw", "tw/monitoring/set", b"0").unwrap(),
            Inbound::SetMonitoring(false)
        );
    }

    #[test]
    fn test_rejects_foreign_topics_and_bad_payloads() {
        assert!(matches!(
            parse_message("tw", "other/sources/1", b"{}"),
            Err(IngestError::UnknownTopic(_))
        ));
        assert!(matches!(
            parse_message("tw", "tw/sources/abc", br#"{"value": true, "changed": true}"#),
            Err(IngestError::InvalidSourceId(_))
        ));
        assert!(matches!(
            parse_message("tw", "tw/sources/1", br#"{"value": true}"#),
            Err(IngestError::Payload(_))
        ));
    }

    #[test]
    fn test_topics() {
        let config = MqttConfig::default();
        assert_eq!(config.source_topic(SourceId(5)), "tamperwatch/sources/5");
        assert_eq!(config.topic("status"), "tamperwatch/status");
    }
}
