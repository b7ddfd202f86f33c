// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/tamperwatch

//! Event bus for inter-component communication

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use super::{MonitoringState, OverviewSink, StatusSink};
use crate::detection::{AggregateStatus, OverallStatus};
use crate::escalation::EscalationRun;

/// Event types in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    /// Overall OK/Alarm status
    Status,
    /// Full aggregate status with overview rows
    Overview,
    /// Armed or disarmed
    Monitoring,
    /// Finished escalation run
    Escalation,
    /// Operator alert
    Alert,
}

/// Generic event wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Sequence number, unique per bus
    pub id: u64,
    /// Kind of payload
    pub event_type: EventType,
    /// Publication time
    pub timestamp: DateTime<Utc>,
    /// Event content
    pub payload: EventPayload,
}

/// Event content by type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// Overall status
    Status(OverallStatus),
    /// Aggregate status
    Overview(AggregateStatus),
    /// Monitoring state
    Monitoring(MonitoringState),
    /// Escalation run
    Escalation(EscalationRun),
    /// Alert with a free-form level such as `critical`
    Alert {
        /// Severity, e.g. `critical`
        level: String,
        /// Alert text
        message: String,
    },
}

/// Central event bus for pub/sub communication. Publishing never blocks;
/// events are dropped when nobody listens.
pub struct EventBus {
    status_tx: broadcast::Sender<OverallStatus>,
    overview_tx: broadcast::Sender<AggregateStatus>,
    monitoring_tx: broadcast::Sender<MonitoringState>,
    run_tx: broadcast::Sender<EscalationRun>,
    event_tx: broadcast::Sender<Event>,
    event_counter: AtomicU64,
}

impl EventBus {
    /// Create a bus; `capacity` is per channel
    pub fn new(capacity: usize) -> Self {
        let (status_tx, _) = broadcast::channel(capacity);
        let (overview_tx, _) = broadcast::channel(capacity);
        let (monitoring_tx, _) = broadcast::channel(capacity);
        let (run_tx, _) = broadcast::channel(capacity);
        let (event_tx, _) = broadcast::channel(capacity);

        Self {
            status_tx,
            overview_tx,
            monitoring_tx,
            run_tx,
            event_tx,
            event_counter: AtomicU64::new(0),
        }
    }

    /// Publish a finished escalation run
    pub fn publish_run(&self, run: EscalationRun) {
        let _ = self.run_tx.send(run.clone());
        self.publish_event(EventType::Escalation, EventPayload::Escalation(run));
    }

    /// Publish an operator alert
    pub fn publish_alert(&self, level: &str, message: &str) {
        self.publish_event(
            EventType::Alert,
            EventPayload::Alert {
                level: level.to_string(),
                message: message.to_string(),
            },
        );
    }

    fn publish_event(&self, event_type: EventType, payload: EventPayload) {
        let id = self.event_counter.fetch_add(1, Ordering::Relaxed);
        let event = Event {
            id,
            event_type,
            timestamp: Utc::now(),
            payload,
        };
        let _ = self.event_tx.send(event);
    }

    /// Overall status updates
    pub fn subscribe_status(&self) -> broadcast::Receiver<OverallStatus> {
        self.status_tx.subscribe()
    }

    /// Aggregate status updates, hidden ones included
    pub fn subscribe_overview(&self) -> broadcast::Receiver<AggregateStatus> {
        self.overview_tx.subscribe()
    }

    /// Monitoring toggles
    pub fn subscribe_monitoring(&self) -> broadcast::Receiver<MonitoringState> {
        self.monitoring_tx.subscribe()
    }

    /// Escalation runs
    pub fn subscribe_runs(&self) -> broadcast::Receiver<EscalationRun> {
        self.run_tx.subscribe()
    }

    /// Every event, wrapped
    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl OverviewSink for EventBus {
    fn publish_overview(&self, status: &AggregateStatus) {
        let _ = self.overview_tx.send(status.clone());
        self.publish_event(EventType::Overview, EventPayload::Overview(status.clone()));
    }
}

impl StatusSink for EventBus {
    fn publish_status(&self, status: OverallStatus) {
        let _ = self.status_tx.send(status);
        self.publish_event(EventType::Status, EventPayload::Status(status));
    }

    fn publish_monitoring(&self, state: MonitoringState) {
        let _ = self.monitoring_tx.send(state);
        self.publish_event(EventType::Monitoring, EventPayload::Monitoring(state));
    }
}
