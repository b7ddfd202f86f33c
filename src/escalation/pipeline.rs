// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/tamperwatch

//! Escalation pipeline - best-effort broadcast across all alert channels

use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{AdapterSet, AlertContext, ChannelKind, ChannelOutcome, ChannelResult, EscalationChannel, EscalationRun};
use crate::error::ChannelError;
use crate::sources::SourceId;

/// Runs one alert through every configured channel
#[derive(Debug, Clone)]
pub struct EscalationPipeline {
    adapters: Arc<AdapterSet>,
    channel_timeout: Duration,
}

impl EscalationPipeline {
    /// Pipeline over `adapters` with a per-channel timeout
    pub fn new(adapters: Arc<AdapterSet>, channel_timeout: Duration) -> Self {
        Self {
            adapters,
            channel_timeout,
        }
    }

    /// Per-channel timeout
    pub fn channel_timeout(&self) -> Duration {
        self.channel_timeout
    }

    /// Invoke every enabled channel in fixed order.
    ///
    /// Each channel is attempted regardless of what happened to the ones
    /// before it. There are no retries; the returned run lists every
    /// channel, including when all of them failed.
    pub async fn run(
        &self,
        triggering_source_id: SourceId,
        ctx: &AlertContext,
        channels: &[EscalationChannel],
    ) -> EscalationRun {
        info!(
            "Escalating sabotage on source {} ({}), run {}",
            triggering_source_id, ctx.source_name, ctx.run_id
        );

        let mut results = Vec::with_capacity(ChannelKind::ORDER.len());
        for kind in ChannelKind::ORDER {
            for channel in channels.iter().filter(|c| c.kind == kind) {
                let outcome = self.invoke(channel, ctx).await;
                results.push(ChannelResult {
                    channel: kind,
                    outcome,
                });
            }
        }

        EscalationRun {
            id: ctx.run_id,
            triggering_source_id,
            timestamp: ctx.timestamp,
            results,
        }
    }

    async fn invoke(&self, channel: &EscalationChannel, ctx: &AlertContext) -> ChannelOutcome {
        if !channel.enabled {
            debug!("Channel {} disabled, skipping", channel.kind);
            return ChannelOutcome::Skipped;
        }

        let Some(adapter) = self.adapters.get(channel.kind) else {
            warn!("No adapter registered for channel {}", channel.kind);
            return ChannelOutcome::Failed(format!("no adapter for {}", channel.kind));
        };

        let result = match timeout(self.channel_timeout, adapter.invoke(channel, ctx)).await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::Timeout(self.channel_timeout)),
        };

        match result {
            Ok(()) => {
                debug!("Channel {} succeeded", channel.kind);
                ChannelOutcome::Succeeded
            }
            Err(e) => {
                warn!("Channel {} failed: {}", channel.kind, e);
                ChannelOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use crate::escalation::{ChannelAdapter, ChannelTarget};
    use crate::sources::{MonitoredSource, SourceId};

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<ChannelKind>>,
        fail: Vec<ChannelKind>,
        hang: Vec<ChannelKind>,
    }

    #[async_trait]
    impl ChannelAdapter for Recorder {
        async fn invoke(&self, channel: &EscalationChannel, _ctx: &AlertContext) -> Result<(), ChannelError> {
            self.calls.lock().push(channel.kind);
            if self.hang.contains(&channel.kind) {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            if self.fail.contains(&channel.kind) {
                return Err(ChannelError::Other("adapter down".into()));
            }
            Ok(())
        }
    }

    fn channel(kind: ChannelKind, enabled: bool) -> EscalationChannel {
        EscalationChannel {
            kind,
            enabled,
            target: ChannelTarget::Script {
                command: format!("/bin/{}", kind),
                args: vec![],
            },
        }
    }

    fn context() -> AlertContext {
        let source = MonitoredSource {
            id: SourceId(1),
            display_name: "Sabotage".into(),
            parent_name: "Door contact".into(),
            enabled: true,
            last_value: Some(true),
        };
        AlertContext::new(&source, "Home")
    }

    fn pipeline(recorder: Arc<Recorder>, timeout: Duration) -> EscalationPipeline {
        EscalationPipeline::new(Arc::new(AdapterSet::uniform(recorder)), timeout)
    }

    #[tokio::test]
    async fn test_runs_in_fixed_order_regardless_of_input_order() {
        let recorder = Arc::new(Recorder::default());
        let channels = vec![
            channel(ChannelKind::Call, true),
            channel(ChannelKind::Light, true),
            channel(ChannelKind::Siren, true),
            channel(ChannelKind::Notification, true),
        ];

        let run = pipeline(recorder.clone(), Duration::from_secs(1))
            .run(SourceId(1), &context(), &channels)
            .await;

        let order: Vec<_> = run.results.iter().map(|r| r.channel).collect();
        assert_eq!(order, ChannelKind::ORDER.to_vec());
        assert_eq!(*recorder.calls.lock(), ChannelKind::ORDER.to_vec());
        assert_eq!(run.succeeded(), 4);
    }

    #[tokio::test]
    async fn test_failing_channel_does_not_block_the_rest() {
        let recorder = Arc::new(Recorder {
            fail: vec![ChannelKind::Siren],
            ..Default::default()
        });
        let channels: Vec<_> = ChannelKind::ORDER.iter().map(|&k| channel(k, true)).collect();

        let run = pipeline(recorder.clone(), Duration::from_secs(1))
            .run(SourceId(1), &context(), &channels)
            .await;

        assert!(matches!(run.outcome(ChannelKind::Siren), Some(ChannelOutcome::Failed(_))));
        assert_eq!(run.outcome(ChannelKind::Notification), Some(&ChannelOutcome::Succeeded));
        assert_eq!(run.outcome(ChannelKind::Light), Some(&ChannelOutcome::Succeeded));
        assert_eq!(run.outcome(ChannelKind::Call), Some(&ChannelOutcome::Succeeded));
        assert_eq!(recorder.calls.lock().len(), 4);
    }

    #[tokio::test]
    async fn test_disabled_channel_is_skipped_not_invoked() {
        let recorder = Arc::new(Recorder::default());
        let channels = vec![
            channel(ChannelKind::Notification, true),
            channel(ChannelKind::Siren, false),
            channel(ChannelKind::Light, true),
            channel(ChannelKind::Call, false),
        ];

        let run = pipeline(recorder.clone(), Duration::from_secs(1))
            .run(SourceId(1), &context(), &channels)
            .await;

        assert_eq!(run.outcome(ChannelKind::Siren), Some(&ChannelOutcome::Skipped));
        assert_eq!(run.outcome(ChannelKind::Call), Some(&ChannelOutcome::Skipped));
        assert_eq!(*recorder.calls.lock(), vec![ChannelKind::Notification, ChannelKind::Light]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_records_failure_and_continues() {
        let recorder = Arc::new(Recorder {
            hang: vec![ChannelKind::Notification],
            ..Default::default()
        });
        let channels: Vec<_> = ChannelKind::ORDER.iter().map(|&k| channel(k, true)).collect();

        let run = pipeline(recorder.clone(), Duration::from_millis(50))
            .run(SourceId(1), &context(), &channels)
            .await;

        match run.outcome(ChannelKind::Notification) {
            Some(ChannelOutcome::Failed(reason)) => assert!(reason.contains("timed out")),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(run.succeeded(), 3);
    }

    #[tokio::test]
    async fn test_missing_adapter_fails_channel() {
        let recorder: Arc<dyn ChannelAdapter> = Arc::new(Recorder::default());
        let adapters = AdapterSet::new().with(ChannelKind::Notification, recorder);
        let pipeline = EscalationPipeline::new(Arc::new(adapters), Duration::from_secs(1));
        let channels = vec![channel(ChannelKind::Notification, true), channel(ChannelKind::Call, true)];

        let run = pipeline.run(SourceId(1), &context(), &channels).await;

        assert_eq!(run.outcome(ChannelKind::Notification), Some(&ChannelOutcome::Succeeded));
        assert!(matches!(run.outcome(ChannelKind::Call), Some(ChannelOutcome::Failed(_))));
    }

    #[tokio::test]
    async fn test_all_failed_is_total_failure() {
        let recorder = Arc::new(Recorder {
            fail: ChannelKind::ORDER.to_vec(),
            ..Default::default()
        });
        let channels: Vec<_> = ChannelKind::ORDER.iter().map(|&k| channel(k, true)).collect();

        let run = pipeline(recorder, Duration::from_secs(1))
            .run(SourceId(1), &context(), &channels)
            .await;

        assert_eq!(run.results.len(), 4);
        assert!(run.is_total_failure());
    }
}
