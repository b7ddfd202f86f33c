// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/tamperwatch

//! MQTT link - readings and toggles in, status and escalations out

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{parse_message, MqttConfig, UpdateSource};
use crate::core::{EventBus, MonitorHandle};
use crate::sources::{SourceId, SubscriptionDiff};

/// Shared MQTT client plus the set of source topics it should follow
#[derive(Clone)]
pub struct MqttLink {
    client: AsyncClient,
    config: MqttConfig,
    subscribed: Arc<Mutex<BTreeSet<SourceId>>>,
}

impl MqttLink {
    /// Create the client. Nothing is sent until the event loop is spawned.
    pub fn new(config: &MqttConfig) -> (Self, EventLoop) {
        let mut options = MqttOptions::new(&config.client_id, &config.broker, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(options, 100);
        let link = Self {
            client,
            config: config.clone(),
            subscribed: Arc::new(Mutex::new(BTreeSet::new())),
        };
        (link, eventloop)
    }

    /// Add source topics to subscribe on the next connect. Nothing is sent
    /// now, so this is safe before the event loop runs.
    pub fn follow(&self, ids: &BTreeSet<SourceId>) {
        self.subscribed.lock().extend(ids.iter().copied());
    }

    /// Client shared with the MQTT escalation adapter
    pub fn client(&self) -> AsyncClient {
        self.client.clone()
    }

    /// Poll the connection and route incoming messages to the service
    pub fn spawn_event_loop(&self, mut eventloop: EventLoop, handle: MonitorHandle) -> JoinHandle<()> {
        let link = self.clone();
        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("MQTT connected to {}:{}", link.config.broker, link.config.port);
                        link.resubscribe();
                    }
                    Ok(Event::Incoming(Packet::Publish(msg))) => {
                        debug!("MQTT received: {:?}", msg.topic);
                        match parse_message(&link.config.topic_prefix, &msg.topic, &msg.payload) {
                            Ok(inbound) => {
                                if inbound.submit(&handle).await.is_err() {
                                    info!("Monitor service gone, stopping MQTT event loop");
                                    break;
                                }
                            }
                            Err(e) => warn!("Ignoring MQTT message on {}: {}", msg.topic, e),
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("MQTT error: {:?}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        })
    }

    // runs inside the event loop task, so it must not await the request queue
    fn resubscribe(&self) {
        let mut topics = vec![self.config.topic("monitoring/set")];
        topics.extend(self.subscribed.lock().iter().map(|&id| self.config.source_topic(id)));

        for topic in topics {
            if let Err(e) = self.client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                error!("MQTT subscribe to {} failed: {}", topic, e);
            }
        }
    }

    /// Publish `payload` as JSON
    pub async fn publish<T: Serialize>(&self, topic: &str, payload: &T, retain: bool) -> Result<()> {
        let json = serde_json::to_vec(payload)?;

        self.client
            .publish(topic, QoS::AtLeastOnce, retain, json)
            .await
            .map_err(|e| anyhow!("MQTT publish failed: {}", e))?;

        Ok(())
    }

    /// Mirror status, overview, monitoring state and escalation runs from
    /// the event bus to MQTT topics. Hidden overviews are not published.
    pub fn spawn_forwarder(&self, event_bus: &EventBus, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let link = self.clone();
        let mut status_rx = event_bus.subscribe_status();
        let mut overview_rx = event_bus.subscribe_overview();
        let mut monitoring_rx = event_bus.subscribe_monitoring();
        let mut run_rx = event_bus.subscribe_runs();

        let status_topic = self.config.topic("status");
        let overview_topic = self.config.topic("overview");
        let monitoring_topic = self.config.topic("monitoring");
        let escalation_topic = self.config.topic("escalations");

        tokio::spawn(async move {
            loop {
                let open = tokio::select! {
                    msg = status_rx.recv() => link.forward(&status_topic, msg, true).await,
                    msg = overview_rx.recv() => match msg {
                        // display switched off
                        Ok(status) if status.hidden => true,
                        msg => link.forward(&overview_topic, msg, true).await,
                    },
                    msg = monitoring_rx.recv() => link.forward(&monitoring_topic, msg, true).await,
                    msg = run_rx.recv() => link.forward(&escalation_topic, msg, false).await,
                    _ = shutdown.recv() => false,
                };

                if !open {
                    break;
                }
            }
            debug!("MQTT forwarder stopped");
        })
    }

    /// Publish one bus message. Returns false once the bus is gone.
    async fn forward<T: Serialize>(&self, topic: &str, msg: Result<T, RecvError>, retain: bool) -> bool {
        match msg {
            Ok(payload) => {
                if let Err(e) = self.publish(topic, &payload, retain).await {
                    warn!("{}", e);
                }
                true
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("MQTT forwarder lagged, skipped {} messages on {}", skipped, topic);
                true
            }
            Err(RecvError::Closed) => false,
        }
    }
}

#[async_trait]
impl UpdateSource for MqttLink {
    async fn apply_subscriptions(&self, diff: &SubscriptionDiff) -> Result<()> {
        {
            let mut subscribed = self.subscribed.lock();
            for id in &diff.removed {
                subscribed.remove(id);
            }
            subscribed.extend(diff.added.iter().copied());
        }

        for &id in &diff.removed {
            self.client
                .unsubscribe(self.config.source_topic(id))
                .await
                .map_err(|e| anyhow!("MQTT unsubscribe failed: {}", e))?;
        }
        for &id in &diff.added {
            self.client
                .subscribe(self.config.source_topic(id), QoS::AtLeastOnce)
                .await
                .map_err(|e| anyhow!("MQTT subscribe failed: {}", e))?;
        }

        info!(
            "MQTT subscriptions updated: +{} / -{}",
            diff.added.len(),
            diff.removed.len()
        );
        Ok(())
    }
}
