// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/tamperwatch

//! JSON-lines update source (stdin, pipes, replay files)

use std::collections::BTreeSet;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

use super::{Inbound, IngestError, RawValue, UpdateSource};
use crate::core::MonitorHandle;
use crate::sources::{SourceId, SubscriptionDiff, UpdateEvent};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LineRecord {
    Reading {
        source_id: SourceId,
        value: RawValue,
        changed: bool,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
    Monitoring {
        monitoring: bool,
    },
}

impl From<LineRecord> for Inbound {
    fn from(record: LineRecord) -> Self {
        match record {
            LineRecord::Reading {
                source_id,
                value,
                changed,
                timestamp,
            } => Inbound::Update(UpdateEvent {
                source_id,
                new_value: value.is_set(),
                value_changed: changed,
                timestamp: timestamp.unwrap_or_else(Utc::now),
            }),
            LineRecord::Monitoring { monitoring } => Inbound::SetMonitoring(monitoring),
        }
    }
}

/// Reads one JSON object per line:
///
/// ```text
/// {"source_id": 12345, "value": true, "changed": true}
/// {"monitoring": true}
/// ```
///
/// Readings for identities outside the subscription set are skipped.
#[derive(Debug, Default)]
pub struct LinesSource {
    subscribed: RwLock<BTreeSet<SourceId>>,
}

impl LinesSource {
    /// Source that accepts nothing until subscriptions are applied
    pub fn new() -> Self {
        Self::default()
    }

    /// Source that accepts `ids` from the first line on
    pub fn with_subscriptions(ids: BTreeSet<SourceId>) -> Self {
        Self {
            subscribed: RwLock::new(ids),
        }
    }

    /// Decode one input line
    pub fn parse_line(line: &str) -> Result<Inbound, IngestError> {
        let record: LineRecord = serde_json::from_str(line)?;
        Ok(record.into())
    }

    fn accepts(&self, inbound: &Inbound) -> bool {
        match inbound {
            Inbound::Update(event) => self.subscribed.read().contains(&event.source_id),
            Inbound::SetMonitoring(_) => true,
        }
    }

    /// Forward every line until end of input. Returns the number of
    /// requests submitted.
    pub async fn run<R>(&self, reader: R, handle: MonitorHandle) -> Result<u64, IngestError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        let mut submitted = 0u64;

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let inbound = match Self::parse_line(line) {
                Ok(inbound) => inbound,
                Err(e) => {
                    warn!("Skipping line: {}", e);
                    continue;
                }
            };

            if !self.accepts(&inbound) {
                debug!("Skipping reading for unsubscribed source: {}", line);
                continue;
            }

            inbound.submit(&handle).await?;
            submitted += 1;
        }

        info!("Input closed after {} requests", submitted);
        Ok(submitted)
    }
}

#[async_trait]
impl UpdateSource for LinesSource {
    async fn apply_subscriptions(&self, diff: &SubscriptionDiff) -> anyhow::Result<()> {
        let mut subscribed = self.subscribed.write();
        for id in &diff.removed {
            subscribed.remove(id);
        }
        subscribed.extend(diff.added.iter().copied());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::broadcast;
    use crate::core::{ControllerSettings, EventBus, MonitorService, MonitoringController, MonitoringState};
    use crate::detection::OverallStatus;
    use crate::escalation::{AdapterSet, TargetAdapter};
    use crate::sources::SourceDefinition;

    #[test]
    fn test_parse_lines() {
        let inbound = LinesSource::parse_line(r#"{"source_id": 4, "value": 1, "changed": true}"#).unwrap();
        assert!(matches!(inbound, Inbound::Update(UpdateEvent { source_id: SourceId(4), new_value: true, .. })));

        let inbound = LinesSource::parse_line(r#"{"monitoring": false}"#).unwrap();
        assert_eq!(inbound, Inbound::SetMonitoring(false));

        assert!(LinesSource::parse_line("not json").is_err());
    }

    fn start_service() -> (MonitorHandle, BTreeSet<SourceId>, broadcast::Sender<()>) {
        let bus = Arc::new(EventBus::default());
        let settings = ControllerSettings {
            sources: vec![SourceDefinition::new(1, "door"), SourceDefinition::new(2, "window")],
            ..Default::default()
        };
        let controller = MonitoringController::new(
            settings,
            Arc::new(AdapterSet::uniform(Arc::new(TargetAdapter::new()))),
            MonitoringState::Disarmed,
            bus.clone(),
            bus.clone(),
        )
        .unwrap();
        let subscriptions = controller.subscriptions();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (handle, _task) = MonitorService::spawn(controller, bus, 16, shutdown_rx);
        (handle, subscriptions, shutdown_tx)
    }

    #[tokio::test]
    async fn test_first_line_is_accepted_when_subscribed_up_front() {
        let (handle, subscriptions, _shutdown) = start_service();
        let source = Arc::new(LinesSource::with_subscriptions(subscriptions));

        let input = b"{\"source_id\": 1, \"value\": true, \"changed\": true}\n";
        let reader = tokio::spawn({
            let source = Arc::clone(&source);
            let handle = handle.clone();
            async move { source.run(&input[..], handle).await }
        });
        tokio::task::yield_now().await;

        assert_eq!(reader.await.unwrap().unwrap(), 1);
        assert_eq!(handle.status().await.unwrap().overall, OverallStatus::Alarm);
    }

    #[tokio::test]
    async fn test_run_feeds_service_and_filters_subscriptions() {
        let (handle, _, _shutdown) = start_service();

        let source = LinesSource::new();
        source
            .apply_subscriptions(&SubscriptionDiff::initial([SourceId(1)].into_iter().collect()))
            .await
            .unwrap();

        let input = b"# replay\n{\"source_id\": 2, \"value\": true, \"changed\": true}\ngarbage\n{\"source_id\": 1, \"value\": false, \"changed\": true}\n{\"monitoring\": true}\n";
        let submitted = source.run(&input[..], handle.clone()).await.unwrap();

        assert_eq!(submitted, 2);
        let status = handle.status().await.unwrap();
        assert_eq!(status.overall, OverallStatus::Ok);
        assert_eq!(handle.monitoring().await.unwrap(), MonitoringState::Armed);
    }
}
