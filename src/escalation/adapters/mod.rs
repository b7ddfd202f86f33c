//! Channel adapters - script, webhook and MQTT realizations of alert channels

mod script;
#[cfg(feature = "webhook")]
mod webhook;
#[cfg(feature = "mqtt")]
mod mqtt;

pub use script::ScriptAdapter;
#[cfg(feature = "webhook")]
pub use webhook::WebhookAdapter;
#[cfg(feature = "mqtt")]
pub use mqtt::MqttAdapter;

use async_trait::async_trait;
use serde::Serialize;

use super::{AlertContext, ChannelAdapter, ChannelKind, ChannelTarget, EscalationChannel};
use crate::error::ChannelError;

/// JSON body sent by network adapters
#[derive(Debug, Serialize)]
pub struct AlertPayload<'a> {
    /// Channel the alert is sent on
    pub channel: ChannelKind,
    /// Human readable alert text
    pub message: String,
    /// Alert details, flattened into the body
    #[serde(flatten)]
    pub context: &'a AlertContext,
}

impl<'a> AlertPayload<'a> {
    /// Payload for one channel invocation
    pub fn new(channel: &EscalationChannel, context: &'a AlertContext) -> Self {
        Self {
            channel: channel.kind,
            message: context.message(),
            context,
        }
    }
}

/// Default adapter: picks the concrete adapter from the channel's target
pub struct TargetAdapter {
    script: ScriptAdapter,
    #[cfg(feature = "webhook")]
    webhook: WebhookAdapter,
    #[cfg(feature = "mqtt")]
    mqtt: Option<MqttAdapter>,
}

impl TargetAdapter {
    /// Adapter with script and webhook support, MQTT not connected
    pub fn new() -> Self {
        Self {
            script: ScriptAdapter::new(),
            #[cfg(feature = "webhook")]
            webhook: WebhookAdapter::new(),
            #[cfg(feature = "mqtt")]
            mqtt: None,
        }
    }

    /// Publish `Mqtt` targets through `client`
    #[cfg(feature = "mqtt")]
    pub fn with_mqtt(mut self, client: rumqttc::AsyncClient) -> Self {
        self.mqtt = Some(MqttAdapter::new(client));
        self
    }
}

impl Default for TargetAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelAdapter for TargetAdapter {
    async fn invoke(&self, channel: &EscalationChannel, ctx: &AlertContext) -> Result<(), ChannelError> {
        match &channel.target {
            ChannelTarget::Unset => Err(ChannelError::Unsupported(format!(
                "{} channel has no target",
                channel.kind
            ))),
            ChannelTarget::Script { .. } => self.script.invoke(channel, ctx).await,
            ChannelTarget::Webhook { .. } => self.invoke_webhook(channel, ctx).await,
            ChannelTarget::Mqtt { .. } => self.invoke_mqtt(channel, ctx).await,
        }
    }
}

impl TargetAdapter {
    #[cfg(feature = "webhook")]
    async fn invoke_webhook(&self, channel: &EscalationChannel, ctx: &AlertContext) -> Result<(), ChannelError> {
        self.webhook.invoke(channel, ctx).await
    }

    #[cfg(not(feature = "webhook"))]
    async fn invoke_webhook(&self, _channel: &EscalationChannel, _ctx: &AlertContext) -> Result<(), ChannelError> {
        Err(ChannelError::Unsupported("built without webhook support".into()))
    }

    #[cfg(feature = "mqtt")]
    async fn invoke_mqtt(&self, channel: &EscalationChannel, ctx: &AlertContext) -> Result<(), ChannelError> {
        match &self.mqtt {
            Some(mqtt) => mqtt.invoke(channel, ctx).await,
            None => Err(ChannelError::Unsupported("mqtt is not connected".into())),
        }
    }

    #[cfg(not(feature = "mqtt"))]
    async fn invoke_mqtt(&self, _channel: &EscalationChannel, _ctx: &AlertContext) -> Result<(), ChannelError> {
        Err(ChannelError::Unsupported("built without mqtt support".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{MonitoredSource, SourceId};

    fn ctx() -> AlertContext {
        let source = MonitoredSource {
            id: SourceId(3),
            display_name: "Sabotage".into(),
            parent_name: "Window contact".into(),
            enabled: true,
            last_value: Some(true),
        };
        AlertContext::new(&source, "")
    }

    #[tokio::test]
    async fn test_unset_target_fails() {
        let channel = EscalationChannel {
            kind: ChannelKind::Light,
            enabled: true,
            target: ChannelTarget::Unset,
        };
        let err = TargetAdapter::new().invoke(&channel, &ctx()).await.unwrap_err();
        assert!(matches!(err, ChannelError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_mqtt_without_client_fails() {
        let channel = EscalationChannel {
            kind: ChannelKind::Call,
            enabled: true,
            target: ChannelTarget::Mqtt {
                topic: "home/call".into(),
            },
        };
        let err = TargetAdapter::new().invoke(&channel, &ctx()).await.unwrap_err();
        assert!(matches!(err, ChannelError::Unsupported(_)));
    }

    #[test]
    fn test_payload_flattens_context() {
        let ctx = ctx();
        let channel = EscalationChannel {
            kind: ChannelKind::Notification,
            enabled: true,
            target: ChannelTarget::Unset,
        };
        let json = serde_json::to_value(AlertPayload::new(&channel, &ctx)).unwrap();
        assert_eq!(json["channel"], "notification");
        assert_eq!(json["source_id"], 3);
        assert_eq!(json["message"], "Sabotage detected: Window contact (Sabotage)");
    }
}
