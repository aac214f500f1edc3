//! MQTT publisher — async client for the home-automation broker.
//!
//! Wraps `rumqttc::AsyncClient` with typed publish helpers for reading
//! batches and collection status. Delivery is best effort: QoS 1 hand-off
//! to the client queue, no confirmation tracking.

use async_trait::async_trait;
use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS};
use serde::Serialize;

use vl_protocol::reading::ReadingBatch;
use vl_protocol::status::CollectionStatus;

use crate::Publisher;
use crate::config::MqttConfig;
use crate::error::{PublishError, PublishResult};
use crate::topics;

/// MQTT publisher connected to the configured broker.
///
/// Owns the `AsyncClient`. The `EventLoop` is returned separately from
/// `new()` — the caller must drive it in a spawned task:
/// ```ignore
/// tokio::spawn(async move {
///     loop {
///         if let Err(e) = eventloop.poll().await {
///             tracing::warn!(error = %e, "MQTT event loop error");
///             tokio::time::sleep(Duration::from_secs(5)).await;
///         }
///     }
/// });
/// ```
pub struct MqttPublisher {
    client: AsyncClient,
    device_id: String,
}

impl MqttPublisher {
    pub fn new(config: &MqttConfig, device_id: impl Into<String>) -> (Self, EventLoop) {
        let mut options = MqttOptions::new(
            &config.client_id,
            &config.broker_host,
            config.broker_port,
        );
        options.set_keep_alive(std::time::Duration::from_secs(config.keepalive_secs.into()));

        let (client, eventloop) = AsyncClient::new(options, 64);
        (
            Self {
                client,
                device_id: device_id.into(),
            },
            eventloop,
        )
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    async fn publish_json<T: Serialize>(&self, topic: &str, payload: &T) -> PublishResult<()> {
        let bytes =
            serde_json::to_vec(payload).map_err(|e| PublishError::Serialization(e.to_string()))?;
        self.client
            .publish(topic, QoS::AtLeastOnce, false, bytes)
            .await
            .map_err(|e| PublishError::Publish(e.to_string()))
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish_readings(&self, batch: &ReadingBatch) -> PublishResult<()> {
        self.publish_json(&topics::telemetry(&self.device_id), batch)
            .await
    }

    async fn publish_status(&self, status: &CollectionStatus) -> PublishResult<()> {
        self.publish_json(&topics::status(&self.device_id), status)
            .await
    }
}
