// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/tamperwatch

//! Script adapter - runs an external command per alert

use std::process::Stdio;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::ChannelError;
use crate::escalation::{AlertContext, ChannelAdapter, ChannelTarget, EscalationChannel};

/// Runs `Script` targets. The alert is passed through environment
/// variables so scripts need no argument parsing.
#[derive(Debug, Clone, Default)]
pub struct ScriptAdapter;

impl ScriptAdapter {
    /// Create the adapter
    pub fn new() -> Self {
        Self
    }

    fn command(kind: &str, command: &str, args: &[String], ctx: &AlertContext) -> Command {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .env("TAMPERWATCH_CHANNEL", kind)
            .env("TAMPERWATCH_RUN_ID", ctx.run_id.to_string())
            .env("TAMPERWATCH_SOURCE_ID", ctx.source_id.to_string())
            .env("TAMPERWATCH_SOURCE_NAME", &ctx.source_name)
            .env("TAMPERWATCH_PARENT_NAME", &ctx.parent_name)
            .env("TAMPERWATCH_LOCATION", &ctx.location)
            .env("TAMPERWATCH_TIMESTAMP", ctx.timestamp.to_rfc3339())
            .env("TAMPERWATCH_MESSAGE", ctx.message())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            // a timed out invocation is dropped by the pipeline; take the child with it
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl ChannelAdapter for ScriptAdapter {
    async fn invoke(&self, channel: &EscalationChannel, ctx: &AlertContext) -> Result<(), ChannelError> {
        let ChannelTarget::Script { command, args } = &channel.target else {
            return Err(ChannelError::Unsupported(format!(
                "script adapter cannot drive {:?}",
                channel.target
            )));
        };

        debug!("Running {} script '{}'", channel.kind, command);
        let status = Self::command(channel.kind.as_str(), command, args, ctx)
            .status()
            .await
            .map_err(|source| ChannelError::Spawn {
                command: command.clone(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(ChannelError::ExitStatus {
                command: command.clone(),
                status: status.to_string(),
            })
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::escalation::ChannelKind;
    use crate::sources::{MonitoredSource, SourceId};

    fn ctx() -> AlertContext {
        let source = MonitoredSource {
            id: SourceId(7),
            display_name: "Sabotage".into(),
            parent_name: "Motion detector".into(),
            enabled: true,
            last_value: Some(true),
        };
        AlertContext::new(&source, "Cellar")
    }

    fn script(command: &str, args: &[&str]) -> EscalationChannel {
        EscalationChannel {
            kind: ChannelKind::Siren,
            enabled: true,
            target: ChannelTarget::Script {
                command: command.into(),
                args: args.iter().map(|a| a.to_string()).collect(),
            },
        }
    }

    #[tokio::test]
    async fn test_exit_status_maps_to_result() {
        let adapter = ScriptAdapter::new();
        assert!(adapter.invoke(&script("sh", &["-c", "exit 0"]), &ctx()).await.is_ok());

        let err = adapter
            .invoke(&script("sh", &["-c", "exit 3"]), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::ExitStatus { .. }));
    }

    #[tokio::test]
    async fn test_context_is_exported() {
        let adapter = ScriptAdapter::new();
        let check = r#"[ "$TAMPERWATCH_SOURCE_ID" = "7" ] && [ "$TAMPERWATCH_CHANNEL" = "siren" ] && [ "$TAMPERWATCH_LOCATION" = "Cellar" ]"#;
        assert!(adapter.invoke(&script("sh", &["-c", check]), &ctx()).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_command_is_spawn_error() {
        let adapter = ScriptAdapter::new();
        let err = adapter
            .invoke(&script("/nonexistent/tamperwatch-siren", &[]), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_rejects_other_targets() {
        let channel = EscalationChannel {
            kind: ChannelKind::Call,
            enabled: true,
            target: ChannelTarget::Mqtt { topic: "x".into() },
        };
        let err = ScriptAdapter::new().invoke(&channel, &ctx()).await.unwrap_err();
        assert!(matches!(err, ChannelError::Unsupported(_)));
    }
}
