// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/tamperwatch

//! Monitor service - serializes all inbound requests through one queue

use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};

use super::{ControllerSettings, EventBus, MonitoringController, MonitoringState, PendingEscalation};
use crate::detection::AggregateStatus;
use crate::error::{ConfigError, ServiceClosed};
use crate::escalation::EscalationRun;
use crate::sources::{SourceId, SubscriptionDiff, UpdateEvent};

enum Command {
    Update(UpdateEvent),
    SetMonitoring {
        enabled: bool,
        reply: oneshot::Sender<AggregateStatus>,
    },
    Reload {
        settings: Box<ControllerSettings>,
        reply: oneshot::Sender<Result<SubscriptionDiff, ConfigError>>,
    },
    Status(oneshot::Sender<AggregateStatus>),
    Monitoring(oneshot::Sender<MonitoringState>),
    Subscriptions(oneshot::Sender<BTreeSet<SourceId>>),
}

/// Cloneable handle for submitting requests to a running service
#[derive(Clone)]
pub struct MonitorHandle {
    tx: mpsc::Sender<Command>,
}

impl MonitorHandle {
    /// Queue a reading. Returns once it is queued, not processed.
    pub async fn update(&self, event: UpdateEvent) -> Result<(), ServiceClosed> {
        self.tx.send(Command::Update(event)).await.map_err(|_| ServiceClosed)
    }

    /// Arm or disarm, returning the republished status
    pub async fn set_monitoring(&self, enabled: bool) -> Result<AggregateStatus, ServiceClosed> {
        self.request(|reply| Command::SetMonitoring { enabled, reply }).await
    }

    /// Swap in new settings. The inner result is the validation outcome.
    pub async fn reload(&self, settings: ControllerSettings) -> Result<Result<SubscriptionDiff, ConfigError>, ServiceClosed> {
        self.request(|reply| Command::Reload {
            settings: Box::new(settings),
            reply,
        })
        .await
    }

    /// Status after every request queued before this one has been applied
    pub async fn status(&self) -> Result<AggregateStatus, ServiceClosed> {
        self.request(Command::Status).await
    }

    /// Current armed state
    pub async fn monitoring(&self) -> Result<MonitoringState, ServiceClosed> {
        self.request(Command::Monitoring).await
    }

    /// Identities update sources should deliver
    pub async fn subscriptions(&self) -> Result<BTreeSet<SourceId>, ServiceClosed> {
        self.request(Command::Subscriptions).await
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, ServiceClosed> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(command(reply)).await.map_err(|_| ServiceClosed)?;
        rx.await.map_err(|_| ServiceClosed)
    }
}

/// Owns a controller exclusively and processes one request at a time.
/// Escalations run on separate tasks so slow channels never hold up
/// the next reading.
pub struct MonitorService {
    controller: MonitoringController,
    event_bus: Arc<EventBus>,
    rx: mpsc::Receiver<Command>,
    runs: JoinSet<()>,
}

impl MonitorService {
    /// Create the service and its handle without starting it
    pub fn new(controller: MonitoringController, event_bus: Arc<EventBus>, capacity: usize) -> (Self, MonitorHandle) {
        let (tx, rx) = mpsc::channel(capacity);
        let service = Self {
            controller,
            event_bus,
            rx,
            runs: JoinSet::new(),
        };
        (service, MonitorHandle { tx })
    }

    /// Create the service and run it on its own task
    pub fn spawn(
        controller: MonitoringController,
        event_bus: Arc<EventBus>,
        capacity: usize,
        shutdown: broadcast::Receiver<()>,
    ) -> (MonitorHandle, JoinHandle<()>) {
        let (service, handle) = Self::new(controller, event_bus, capacity);
        let task = tokio::spawn(service.run(shutdown));
        (handle, task)
    }

    /// Process commands until shutdown or until every handle is dropped
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!("Starting monitor service...");

        loop {
            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                Some(result) = self.runs.join_next(), if !self.runs.is_empty() => {
                    if let Err(e) = result {
                        error!("Escalation task failed: {}", e);
                    }
                }
                _ = shutdown.recv() => {
                    info!("Monitor service shutting down...");
                    break;
                }
            }
        }

        // escalations are never cancelled half way
        while let Some(result) = self.runs.join_next().await {
            if let Err(e) = result {
                error!("Escalation task failed: {}", e);
            }
        }
        info!("Monitor service stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Update(event) => {
                if let Some(pending) = self.controller.on_update(&event) {
                    self.dispatch(pending);
                }
            }
            Command::SetMonitoring { enabled, reply } => {
                let status = self.controller.set_monitoring(enabled).clone();
                let _ = reply.send(status);
            }
            Command::Reload { settings, reply } => {
                let result = self.controller.reload(*settings);
                if let Err(e) = &result {
                    error!("Configuration rejected, keeping previous: {}", e);
                }
                let _ = reply.send(result);
            }
            Command::Status(reply) => {
                let _ = reply.send(self.controller.status().clone());
            }
            Command::Monitoring(reply) => {
                let _ = reply.send(self.controller.monitoring());
            }
            Command::Subscriptions(reply) => {
                let _ = reply.send(self.controller.subscriptions());
            }
        }
    }

    fn dispatch(&mut self, pending: PendingEscalation) {
        let event_bus = Arc::clone(&self.event_bus);
        self.runs.spawn(async move {
            let run = pending.run().await;
            report_run(&event_bus, run);
        });
    }
}

fn report_run(event_bus: &EventBus, run: EscalationRun) {
    if run.is_total_failure() {
        let message = format!(
            "Escalation {} for source {} reached no channel ({} failed)",
            run.id,
            run.triggering_source_id,
            run.failed()
        );
        error!("{}", message);
        event_bus.publish_alert("critical", &message);
    } else if run.failed() > 0 {
        warn!(
            "Escalation {} for source {}: {} succeeded, {} failed",
            run.id,
            run.triggering_source_id,
            run.succeeded(),
            run.failed()
        );
    } else {
        info!(
            "Escalation {} for source {} completed on {} channels",
            run.id,
            run.triggering_source_id,
            run.succeeded()
        );
    }
    event_bus.publish_run(run);
}
