//! VoltLink telemetry publisher — best-effort fan-out of decoded readings
//! to a home-automation MQTT broker.
//!
//! Publishing never gates collection: callers log and drop errors.

use async_trait::async_trait;

use vl_protocol::reading::ReadingBatch;
use vl_protocol::status::CollectionStatus;

pub mod config;
pub mod error;
pub mod mock;
pub mod mqtt;
pub mod topics;

pub use config::MqttConfig;
pub use error::{PublishError, PublishResult};
pub use mock::{MockPublisher, NoopPublisher};
pub use mqtt::MqttPublisher;

/// Abstraction for telemetry publishing.
///
/// Enables mocking in tests without a broker.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish one collection cycle's readings.
    async fn publish_readings(&self, batch: &ReadingBatch) -> PublishResult<()>;

    /// Publish a collection status update.
    async fn publish_status(&self, status: &CollectionStatus) -> PublishResult<()>;
}
