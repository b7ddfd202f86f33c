//! Core module - monitoring controller, service actor and event bus

mod controller;
mod event_bus;
mod service;

pub use controller::{ControllerSettings, MonitoringController, PendingEscalation};
pub use event_bus::{Event, EventBus, EventPayload, EventType};
pub use service::{MonitorHandle, MonitorService};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::detection::{AggregateStatus, OverallStatus};

/// Global armed/disarmed switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MonitoringState {
    /// Sabotage is shown but never escalated
    #[default]
    Disarmed,
    /// Sabotage edges escalate
    Armed,
}

impl MonitoringState {
    /// Map a toggle value to a state
    pub fn from_enabled(enabled: bool) -> Self {
        if enabled {
            MonitoringState::Armed
        } else {
            MonitoringState::Disarmed
        }
    }

    /// True when armed
    pub fn is_armed(self) -> bool {
        self == MonitoringState::Armed
    }
}

impl fmt::Display for MonitoringState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitoringState::Disarmed => write!(f, "disarmed"),
            MonitoringState::Armed => write!(f, "armed"),
        }
    }
}

/// Receives the full status after every recomputation
pub trait OverviewSink: Send + Sync {
    /// Called after every recomputation
    fn publish_overview(&self, status: &AggregateStatus);
}

/// Receives the overall status for a simple OK/Alarm indicator
pub trait StatusSink: Send + Sync {
    /// Called after every recomputation
    fn publish_status(&self, status: OverallStatus);

    /// Called whenever monitoring is switched, including no-op switches
    fn publish_monitoring(&self, _state: MonitoringState) {}
}
