// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/tamperwatch

//! HTTP webhook adapter

use async_trait::async_trait;
use tracing::debug;

use super::AlertPayload;
use crate::error::ChannelError;
use crate::escalation::{AlertContext, ChannelAdapter, ChannelTarget, EscalationChannel};

/// Posts alerts to `Webhook` targets
#[derive(Debug, Clone)]
pub struct WebhookAdapter {
    client: reqwest::Client,
}

impl WebhookAdapter {
    /// Adapter with a default HTTP client
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Adapter using a preconfigured client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for WebhookAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelAdapter for WebhookAdapter {
    async fn invoke(&self, channel: &EscalationChannel, ctx: &AlertContext) -> Result<(), ChannelError> {
        let ChannelTarget::Webhook { url } = &channel.target else {
            return Err(ChannelError::Unsupported(format!(
                "webhook adapter cannot drive {:?}",
                channel.target
            )));
        };

        let payload = AlertPayload::new(channel, ctx);

        debug!("Posting {} alert to {}", channel.kind, url);
        self.client
            .post(url)
            .json(&payload)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| ChannelError::Http(e.to_string()))?;

        Ok(())
    }
}
