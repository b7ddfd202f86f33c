//! Escalation module - alert channels, adapters and the escalation pipeline

mod pipeline;
pub mod adapters;

pub use pipeline::EscalationPipeline;
pub use adapters::TargetAdapter;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ChannelError, ConfigError};
use crate::sources::{MonitoredSource, SourceId};

/// Alert channel kinds, declared in invocation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Push or app notification
    Notification,
    /// Siren
    Siren,
    /// Alarm light
    Light,
    /// Phone call
    Call,
}

impl ChannelKind {
    /// Least intrusive first, physically disruptive channels last
    pub const ORDER: [ChannelKind; 4] = [
        ChannelKind::Notification,
        ChannelKind::Siren,
        ChannelKind::Light,
        ChannelKind::Call,
    ];

    /// Lowercase name, as used in config and env vars
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelKind::Notification => "notification",
            ChannelKind::Siren => "siren",
            ChannelKind::Light => "light",
            ChannelKind::Call => "call",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an adapter should drive for a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChannelTarget {
    /// No target configured
    Unset,
    /// Run a local command
    Script {
        /// Program path or name on `PATH`
        command: String,
        /// Arguments passed as is
        #[serde(default)]
        args: Vec<String>,
    },
    /// POST the alert as JSON
    Webhook {
        /// http or https endpoint
        url: String,
    },
    /// Publish the alert on an MQTT topic
    Mqtt {
        /// Full topic, not prefixed
        topic: String,
    },
}

impl Default for ChannelTarget {
    fn default() -> Self {
        ChannelTarget::Unset
    }
}

impl ChannelTarget {
    fn validate(&self, channel: ChannelKind) -> Result<(), ConfigError> {
        let reason = match self {
            ChannelTarget::Unset => Some("enabled without a target"),
            ChannelTarget::Script { command, .. } if command.trim().is_empty() => {
                Some("script command is empty")
            }
            ChannelTarget::Webhook { url }
                if !(url.starts_with("http://") || url.starts_with("https://")) =>
            {
                Some("webhook url must start with http:// or https://")
            }
            ChannelTarget::Mqtt { topic } if topic.trim().is_empty() => Some("mqtt topic is empty"),
            _ => None,
        };

        match reason {
            Some(reason) => Err(ConfigError::InvalidChannel {
                channel,
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// Configuration of one channel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Channel takes part in escalations
    pub enabled: bool,
    /// Where alerts go
    #[serde(default)]
    pub target: ChannelTarget,
}

/// Escalation configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    /// Global kill-switch; when off no escalation runs at all
    pub protocol_enabled: bool,

    /// Upper bound for a single channel invocation
    pub channel_timeout_ms: u64,

    /// Notification channel
    pub notification: ChannelConfig,
    /// Siren channel
    pub siren: ChannelConfig,
    /// Light channel
    pub light: ChannelConfig,
    /// Call channel
    pub call: ChannelConfig,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            protocol_enabled: true,
            channel_timeout_ms: 10_000,
            notification: ChannelConfig::default(),
            siren: ChannelConfig::default(),
            light: ChannelConfig::default(),
            call: ChannelConfig::default(),
        }
    }
}

impl EscalationConfig {
    /// Configuration for one channel
    pub fn channel(&self, kind: ChannelKind) -> &ChannelConfig {
        match kind {
            ChannelKind::Notification => &self.notification,
            ChannelKind::Siren => &self.siren,
            ChannelKind::Light => &self.light,
            ChannelKind::Call => &self.call,
        }
    }

    /// Mutable configuration for one channel
    pub fn channel_mut(&mut self, kind: ChannelKind) -> &mut ChannelConfig {
        match kind {
            ChannelKind::Notification => &mut self.notification,
            ChannelKind::Siren => &mut self.siren,
            ChannelKind::Light => &mut self.light,
            ChannelKind::Call => &mut self.call,
        }
    }

    /// All four channels in invocation order
    pub fn channels(&self) -> Vec<EscalationChannel> {
        ChannelKind::ORDER
            .iter()
            .map(|&kind| {
                let config = self.channel(kind);
                EscalationChannel {
                    kind,
                    enabled: config.enabled,
                    target: config.target.clone(),
                }
            })
            .collect()
    }

    /// Per-channel invocation timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.channel_timeout_ms)
    }

    /// Reject enabled channels without a usable target and a zero timeout
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        for kind in ChannelKind::ORDER {
            let config = self.channel(kind);
            if config.enabled {
                config.target.validate(kind)?;
            }
        }
        Ok(())
    }
}

/// One alert channel as used by a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationChannel {
    /// Channel kind
    pub kind: ChannelKind,
    /// Disabled channels are recorded as skipped
    pub enabled: bool,
    /// Adapter target
    pub target: ChannelTarget,
}

/// Result of invoking one channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum ChannelOutcome {
    /// Adapter reported success
    Succeeded,
    /// Adapter failed or timed out
    Failed(String),
    /// Channel disabled
    Skipped,
}

/// Outcome for one channel of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelResult {
    /// Channel kind
    pub channel: ChannelKind,
    /// What happened
    pub outcome: ChannelOutcome,
}

/// Record of one escalation triggered by an alarm edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationRun {
    /// Run id, shared with the alert context
    pub id: Uuid,
    /// Source whose edge started the run
    pub triggering_source_id: SourceId,
    /// When the edge was detected
    pub timestamp: DateTime<Utc>,
    /// One entry per channel, in invocation order
    pub results: Vec<ChannelResult>,
}

impl EscalationRun {
    /// Outcome for `channel`, if it was part of the run
    pub fn outcome(&self, channel: ChannelKind) -> Option<&ChannelOutcome> {
        self.results
            .iter()
            .find(|r| r.channel == channel)
            .map(|r| &r.outcome)
    }

    /// Channels that succeeded
    pub fn succeeded(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.outcome == ChannelOutcome::Succeeded)
            .count()
    }

    /// Channels that failed
    pub fn failed(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, ChannelOutcome::Failed(_)))
            .count()
    }

    /// No channel reached anyone. Distinct from a partial failure and should
    /// be surfaced loudly.
    pub fn is_total_failure(&self) -> bool {
        self.succeeded() == 0
    }
}

/// Information handed to every adapter of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertContext {
    /// Run id
    pub run_id: Uuid,
    /// Triggering source
    pub source_id: SourceId,
    /// Source label
    pub source_name: String,
    /// Device label
    pub parent_name: String,
    /// Installation label, may be empty
    pub location: String,
    /// Detection time
    pub timestamp: DateTime<Utc>,
}

impl AlertContext {
    /// Context for a fresh run triggered by `source`
    pub fn new(source: &MonitoredSource, location: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            source_id: source.id,
            source_name: source.display_name.clone(),
            parent_name: source.parent_name.clone(),
            location: location.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Short human-readable alert text
    pub fn message(&self) -> String {
        if self.location.is_empty() {
            format!("Sabotage detected: {} ({})", self.parent_name, self.source_name)
        } else {
            format!(
                "{}: sabotage detected: {} ({})",
                self.location, self.parent_name, self.source_name
            )
        }
    }
}

/// Uniform interface to whatever physically realizes a channel
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Deliver one alert on `channel`
    async fn invoke(&self, channel: &EscalationChannel, ctx: &AlertContext) -> Result<(), ChannelError>;
}

/// Adapter per channel kind
#[derive(Clone, Default)]
pub struct AdapterSet {
    adapters: HashMap<ChannelKind, Arc<dyn ChannelAdapter>>,
}

impl AdapterSet {
    /// Empty set; every channel fails with "no adapter"
    pub fn new() -> Self {
        Self::default()
    }

    /// Same adapter for every channel kind
    pub fn uniform(adapter: Arc<dyn ChannelAdapter>) -> Self {
        let mut set = Self::new();
        for kind in ChannelKind::ORDER {
            set.adapters.insert(kind, Arc::clone(&adapter));
        }
        set
    }

    /// Set the adapter for one channel kind
    pub fn with(mut self, kind: ChannelKind, adapter: Arc<dyn ChannelAdapter>) -> Self {
        self.adapters.insert(kind, adapter);
        self
    }

    /// Adapter for `kind`
    pub fn get(&self, kind: ChannelKind) -> Option<&Arc<dyn ChannelAdapter>> {
        self.adapters.get(&kind)
    }
}

impl fmt::Debug for AdapterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.adapters.keys().collect();
        kinds.sort();
        f.debug_struct("AdapterSet").field("kinds", &kinds).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channels_follow_fixed_order() {
        let kinds: Vec<_> = EscalationConfig::default().channels().iter().map(|c| c.kind).collect();
        assert_eq!(kinds, ChannelKind::ORDER.to_vec());
    }

    #[test]
    fn test_enabled_channel_needs_target() {
        let mut config = EscalationConfig::default();
        config.siren.enabled = true;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidChannel { channel: ChannelKind::Siren, .. })
        ));

        config.siren.target = ChannelTarget::Webhook {
            url: "ftp://siren".to_string(),
        };
        assert!(config.validate().is_err());

        config.siren.target = ChannelTarget::Webhook {
            url: "http://siren.local/on".to_string(),
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_disabled_channel_may_be_unset() {
        let mut config = EscalationConfig::default();
        config.call.enabled = false;
        config.call.target = ChannelTarget::Unset;
        assert!(config.validate().is_ok());

        config.channel_timeout_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroTimeout)));
    }

    #[test]
    fn test_total_failure() {
        let mut run = EscalationRun {
            id: Uuid::new_v4(),
            triggering_source_id: SourceId(1),
            timestamp: Utc::now(),
            results: vec![
                ChannelResult { channel: ChannelKind::Notification, outcome: ChannelOutcome::Skipped },
                ChannelResult { channel: ChannelKind::Siren, outcome: ChannelOutcome::Failed("boom".into()) },
            ],
        };
        assert!(run.is_total_failure());

        run.results.push(ChannelResult { channel: ChannelKind::Light, outcome: ChannelOutcome::Succeeded });
        assert!(!run.is_total_failure());
        assert_eq!(run.failed(), 1);
    }
}
