// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/tamperwatch

//! MQTT adapter - publishes alerts for actuators listening on a topic

use async_trait::async_trait;
use rumqttc::{AsyncClient, QoS};
use tracing::debug;

use super::AlertPayload;
use crate::error::ChannelError;
use crate::escalation::{AlertContext, ChannelAdapter, ChannelTarget, EscalationChannel};

/// Publishes to `Mqtt` targets through a shared client
#[derive(Clone)]
pub struct MqttAdapter {
    client: AsyncClient,
}

impl MqttAdapter {
    /// Wrap a connected client
    pub fn new(client: AsyncClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChannelAdapter for MqttAdapter {
    async fn invoke(&self, channel: &EscalationChannel, ctx: &AlertContext) -> Result<(), ChannelError> {
        let ChannelTarget::Mqtt { topic } = &channel.target else {
            return Err(ChannelError::Unsupported(format!(
                "mqtt adapter cannot drive {:?}",
                channel.target
            )));
        };

        let json = serde_json::to_vec(&AlertPayload::new(channel, ctx))
            .map_err(|e| ChannelError::Mqtt(e.to_string()))?;

        debug!("Publishing {} alert to {}", channel.kind, topic);
        self.client
            .publish(topic.as_str(), QoS::AtLeastOnce, false, json)
            .await
            .map_err(|e| ChannelError::Mqtt(e.to_string()))
    }
}
