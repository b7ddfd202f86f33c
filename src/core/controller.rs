// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/tamperwatch

//! Monitoring controller - armed state, recomputation and escalation decisions

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{MonitoringState, OverviewSink, StatusSink};
use crate::config::Config;
use crate::detection::{is_alarm_edge, recompute, AggregateStatus};
use crate::error::ConfigError;
use crate::escalation::{
    AdapterSet, AlertContext, EscalationChannel, EscalationConfig, EscalationPipeline, EscalationRun,
};
use crate::sources::{validate_definitions, SourceDefinition, SourceId, SourceRegistry, SubscriptionDiff, UpdateEvent};

/// Everything a (re)load swaps in at once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Location label included in alerts
    pub location: String,
    /// Monitored sources, in display order
    pub sources: Vec<SourceDefinition>,
    /// Channels, timeout and protocol toggle
    pub escalation: EscalationConfig,
    /// Overview display switch. Both sinks are fed either way; a hidden
    /// overview is flagged on the published status.
    pub overview_visible: bool,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            location: String::new(),
            sources: Vec::new(),
            escalation: EscalationConfig::default(),
            overview_visible: true,
        }
    }
}

impl ControllerSettings {
    /// Take the controller's part of a loaded configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            location: config.location.clone(),
            sources: config.sources.clone(),
            escalation: config.escalation.clone(),
            overview_visible: config.overview.enabled,
        }
    }

    /// Source and channel checks, without touching any live state
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_definitions(&self.sources)?;
        self.escalation.validate()
    }
}

/// Escalation decided by the controller but not yet executed.
///
/// Owns a snapshot of the channels and adapters, so a reload while the run
/// is in flight does not affect it.
#[derive(Debug)]
pub struct PendingEscalation {
    pipeline: EscalationPipeline,
    context: AlertContext,
    channels: Vec<EscalationChannel>,
}

impl PendingEscalation {
    /// Source that triggered the escalation
    pub fn source_id(&self) -> SourceId {
        self.context.source_id
    }

    /// Alert passed to every channel adapter
    pub fn context(&self) -> &AlertContext {
        &self.context
    }

    /// Run the pipeline over the snapshotted channels
    pub async fn run(self) -> EscalationRun {
        self.pipeline
            .run(self.context.source_id, &self.context, &self.channels)
            .await
    }
}

/// Monitoring state machine. Owns the registry and decides when to escalate.
pub struct MonitoringController {
    registry: SourceRegistry,
    location: String,
    channels: Vec<EscalationChannel>,
    protocol_enabled: bool,
    adapters: Arc<AdapterSet>,
    pipeline: EscalationPipeline,
    overview_visible: bool,
    state: MonitoringState,
    overview_sink: Arc<dyn OverviewSink>,
    status_sink: Arc<dyn StatusSink>,
    status: AggregateStatus,
}

impl MonitoringController {
    /// Build a controller and publish the initial status
    pub fn new(
        settings: ControllerSettings,
        adapters: Arc<AdapterSet>,
        initial: MonitoringState,
        overview_sink: Arc<dyn OverviewSink>,
        status_sink: Arc<dyn StatusSink>,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;

        let mut registry = SourceRegistry::new();
        registry.load(&settings.sources)?;

        let pipeline = EscalationPipeline::new(Arc::clone(&adapters), settings.escalation.timeout());
        let mut controller = Self {
            registry,
            location: settings.location,
            channels: settings.escalation.channels(),
            protocol_enabled: settings.escalation.protocol_enabled,
            adapters,
            pipeline,
            overview_visible: settings.overview_visible,
            state: initial,
            overview_sink,
            status_sink,
            status: AggregateStatus::empty(),
        };

        info!(
            "Monitoring {} sources, {}",
            controller.registry.len(),
            controller.state
        );
        controller.check_actual_status();
        Ok(controller)
    }

    /// Swap sources, channels and the protocol toggle atomically. On error
    /// the active configuration is left untouched.
    pub fn reload(&mut self, settings: ControllerSettings) -> Result<SubscriptionDiff, ConfigError> {
        settings.validate()?;

        let diff = self.registry.load(&settings.sources)?;
        self.location = settings.location;
        self.channels = settings.escalation.channels();
        self.protocol_enabled = settings.escalation.protocol_enabled;
        self.pipeline = EscalationPipeline::new(Arc::clone(&self.adapters), settings.escalation.timeout());
        self.overview_visible = settings.overview_visible;

        info!(
            "Configuration reloaded: {} sources, {} subscribed, {} unsubscribed",
            self.registry.len(),
            diff.added.len(),
            diff.removed.len()
        );
        self.check_actual_status();
        Ok(diff)
    }

    /// Arm or disarm. Idempotent; the status is republished either way.
    pub fn set_monitoring(&mut self, enabled: bool) -> &AggregateStatus {
        let next = MonitoringState::from_enabled(enabled);
        if next != self.state {
            info!("Monitoring {}", next);
        } else {
            debug!("Monitoring already {}", next);
        }
        self.state = next;
        self.status_sink.publish_monitoring(next);
        self.check_actual_status()
    }

    /// Apply one reading.
    ///
    /// The status is always recomputed and published. An escalation is only
    /// returned for a rising edge on an enabled source while armed with the
    /// protocol on. Updates for unknown sources are logged and dropped.
    pub fn on_update(&mut self, event: &UpdateEvent) -> Option<PendingEscalation> {
        let previous = match self.registry.record(event.source_id, event.new_value) {
            Ok(previous) => previous,
            Err(e) => {
                warn!("Dropping {}", e);
                return None;
            }
        };

        debug!(
            "Source {}: {:?} -> {} (changed: {})",
            event.source_id, previous, event.new_value, event.value_changed
        );
        self.check_actual_status();

        if !is_alarm_edge(previous, event.new_value, event.value_changed) {
            return None;
        }

        let source = self.registry.get(event.source_id)?;
        if !source.enabled {
            debug!("Sabotage on disabled source {} ignored", source.id);
            return None;
        }
        if !self.state.is_armed() {
            info!("Sabotage on {} ({}) while disarmed", source.parent_name, source.id);
            return None;
        }
        if !self.protocol_enabled {
            info!("Sabotage on {} ({}), escalation protocol is off", source.parent_name, source.id);
            return None;
        }

        warn!("Sabotage detected on {} ({})", source.parent_name, source.id);
        Some(PendingEscalation {
            pipeline: self.pipeline.clone(),
            context: AlertContext::new(source, &self.location),
            channels: self.channels.clone(),
        })
    }

    /// Recompute from the current readings and push to the sinks
    pub fn check_actual_status(&mut self) -> &AggregateStatus {
        let mut status = recompute(&self.registry);
        status.hidden = !self.overview_visible;
        if status.overall != self.status.overall {
            info!("Status changed: {} -> {}", self.status.overall, status.overall);
        }

        self.status_sink.publish_status(status.overall);
        self.overview_sink.publish_overview(&status);

        self.status = status;
        &self.status
    }

    /// Last published status
    pub fn status(&self) -> &AggregateStatus {
        &self.status
    }

    /// Current armed state
    pub fn monitoring(&self) -> MonitoringState {
        self.state
    }

    /// Whether escalations are allowed at all
    pub fn protocol_enabled(&self) -> bool {
        self.protocol_enabled
    }

    /// Source registry
    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Enabled identities update sources should deliver
    pub fn subscriptions(&self) -> BTreeSet<SourceId> {
        self.registry.subscriptions()
    }
}
