//! Mock publisher for testing without a broker.
//!
//! Records all published batches and statuses; can be told to fail so
//! callers' error-swallowing paths can be exercised.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use vl_protocol::reading::ReadingBatch;
use vl_protocol::status::CollectionStatus;

use crate::Publisher;
use crate::error::{PublishError, PublishResult};

/// Mock implementation of the `Publisher` trait.
pub struct MockPublisher {
    batches: Mutex<Vec<ReadingBatch>>,
    statuses: Mutex<Vec<CollectionStatus>>,
    fail: AtomicBool,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            statuses: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    /// Make every subsequent publish fail.
    pub fn fail_publishes(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }

    pub fn batches(&self) -> Vec<ReadingBatch> {
        self.batches.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<CollectionStatus> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn last_batch(&self) -> Option<ReadingBatch> {
        self.batches.lock().unwrap().last().cloned()
    }
}

impl Default for MockPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    async fn publish_readings(&self, batch: &ReadingBatch) -> PublishResult<()> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(PublishError::Publish("simulated broker failure".into()));
        }
        self.batches.lock().unwrap().push(batch.clone());
        Ok(())
    }

    async fn publish_status(&self, status: &CollectionStatus) -> PublishResult<()> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(PublishError::Publish("simulated broker failure".into()));
        }
        self.statuses.lock().unwrap().push(status.clone());
        Ok(())
    }
}

/// Publisher that discards everything. Used when no broker is
/// configured.
pub struct NoopPublisher;

#[async_trait]
impl Publisher for NoopPublisher {
    async fn publish_readings(&self, _batch: &ReadingBatch) -> PublishResult<()> {
        Ok(())
    }

    async fn publish_status(&self, _status: &CollectionStatus) -> PublishResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;
    use vl_protocol::fields::{FieldMap, FieldValue};

    fn sample_batch() -> ReadingBatch {
        let mut fields = FieldMap::new();
        fields.insert("state_of_charge".into(), FieldValue::Integer(86));
        ReadingBatch::from_fields(fields, Uuid::now_v7(), Utc::now())
    }

    #[tokio::test]
    async fn records_batches() {
        let mock = MockPublisher::new();
        mock.publish_readings(&sample_batch()).await.unwrap();
        mock.publish_readings(&sample_batch()).await.unwrap();

        assert_eq!(mock.batches().len(), 2);
        assert!(mock.last_batch().is_some());
    }

    #[tokio::test]
    async fn records_statuses() {
        let mock = MockPublisher::new();
        mock.publish_status(&CollectionStatus::finished(Uuid::now_v7(), None))
            .await
            .unwrap();
        assert_eq!(mock.statuses().len(), 1);
    }

    #[tokio::test]
    async fn failure_injection() {
        let mock = MockPublisher::new();
        mock.fail_publishes(true);
        assert!(mock.publish_readings(&sample_batch()).await.is_err());
        assert!(mock.batches().is_empty());

        mock.fail_publishes(false);
        assert!(mock.publish_readings(&sample_batch()).await.is_ok());
    }
}
