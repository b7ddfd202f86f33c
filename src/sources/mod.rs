//! Monitored sources - identities, definitions and the registry

mod registry;

pub use registry::{validate_definitions, SourceRegistry, SubscriptionDiff};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identity of a sensor source, stable across restarts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub u32);

impl SourceId {
    /// Zero is reserved
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn default_true() -> bool {
    true
}

/// Source entry as it appears in the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDefinition {
    /// Unique non-zero identity
    pub id: SourceId,

    /// Display name of the sensor variable
    pub name: String,

    /// Name of the owning device; falls back to `name` when empty
    #[serde(default)]
    pub parent: String,

    /// Disabled sources are shown but never alarm
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl SourceDefinition {
    /// Enabled source without a parent label
    pub fn new(id: u32, name: &str) -> Self {
        Self {
            id: SourceId(id),
            name: name.to_string(),
            parent: String::new(),
            enabled: true,
        }
    }

    /// Set the device label
    pub fn with_parent(mut self, parent: &str) -> Self {
        self.parent = parent.to_string();
        self
    }

    /// Mark the source disabled
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// A configured source together with its last known reading
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredSource {
    /// Identity
    pub id: SourceId,
    /// Source label
    pub display_name: String,
    /// Device label, falls back to the source label
    pub parent_name: String,
    /// Takes part in aggregation and escalation
    pub enabled: bool,
    /// `Some(true)` means tamper detected; `None` until the first update
    pub last_value: Option<bool>,
}

impl MonitoredSource {
    fn from_definition(def: &SourceDefinition, last_value: Option<bool>) -> Self {
        let parent_name = if def.parent.trim().is_empty() {
            def.name.clone()
        } else {
            def.parent.clone()
        };

        Self {
            id: def.id,
            display_name: def.name.clone(),
            parent_name,
            enabled: def.enabled,
            last_value,
        }
    }
}

/// Inbound reading for one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateEvent {
    /// Reporting source
    pub source_id: SourceId,
    /// Reported value
    pub new_value: bool,
    /// Supplied by the event producer; authoritative for edge detection
    pub value_changed: bool,
    /// When the value was reported
    pub timestamp: DateTime<Utc>,
}

impl UpdateEvent {
    /// Reading stamped with the current time
    pub fn new(source_id: SourceId, new_value: bool, value_changed: bool) -> Self {
        Self {
            source_id,
            new_value,
            value_changed,
            timestamp: Utc::now(),
        }
    }
}
