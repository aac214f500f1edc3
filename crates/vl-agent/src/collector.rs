//! One collection cycle: connect if needed, run the catalog, persist,
//! publish, report.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use vl_protocol::command::CommandCatalog;
use vl_protocol::fields::FieldMap;
use vl_protocol::reading::ReadingBatch;
use vl_protocol::status::{AgentEvent, CollectionStatus, ConnectionState};
use vl_publish::Publisher;

use crate::connection::ConnectionManager;
use crate::executor::CommandExecutor;
use crate::sinks::ReadingSink;
use crate::status::StatusBroadcaster;

/// Runs collection cycles against the active adapter connection.
pub struct Collector {
    connection: Arc<ConnectionManager>,
    executor: Arc<CommandExecutor>,
    catalog: Arc<CommandCatalog>,
    sink: Arc<dyn ReadingSink>,
    publisher: Arc<dyn Publisher>,
    events: StatusBroadcaster,
}

impl Collector {
    pub fn new(
        connection: Arc<ConnectionManager>,
        executor: Arc<CommandExecutor>,
        catalog: Arc<CommandCatalog>,
        sink: Arc<dyn ReadingSink>,
        publisher: Arc<dyn Publisher>,
        events: StatusBroadcaster,
    ) -> Self {
        Self {
            connection,
            executor,
            catalog,
            sink,
            publisher,
            events,
        }
    }

    /// Run one cycle for `session_id`.
    ///
    /// Success means at least one reading was decoded and every decoded
    /// reading was persisted. Publishing is best effort on top — a
    /// broker failure never fails the cycle.
    pub async fn collect_once(&self, session_id: Uuid) -> bool {
        self.events
            .send(AgentEvent::Collection(CollectionStatus::started(session_id)));

        if self.connection.state() != ConnectionState::Ready
            && !self.connection.auto_connect().await
        {
            return self
                .finish(session_id, Some("no adapter connection".to_string()))
                .await;
        }

        let mut merged = FieldMap::new();
        for spec in self.catalog.iter() {
            match self.executor.run(spec).await {
                Ok(fields) => merged.extend(fields),
                Err(err) => {
                    // Transport-level trouble: drop the connection so the
                    // next cycle reconnects from scratch
                    tracing::warn!(command = spec.id, error = %err, "command failed, dropping connection");
                    self.connection.disconnect().await;
                    return self.finish(session_id, Some(err.to_string())).await;
                }
            }
        }

        if merged.is_empty() {
            return self
                .finish(session_id, Some("vehicle returned no data".to_string()))
                .await;
        }

        let batch = ReadingBatch::from_fields(merged, session_id, Utc::now());
        for reading in &batch.readings {
            if let Err(err) = self.sink.insert(reading).await {
                tracing::error!(field = %reading.field, error = %err, "failed to persist reading");
                return self
                    .finish(session_id, Some(format!("persistence failed: {err}")))
                    .await;
            }
        }

        if let Err(err) = self.publisher.publish_readings(&batch).await {
            tracing::warn!(error = %err, "publish failed, readings already persisted");
        }

        tracing::info!(
            readings = batch.readings.len(),
            session_id = %session_id,
            "collection cycle complete"
        );
        self.finish(session_id, None).await
    }

    async fn finish(&self, session_id: Uuid, error: Option<String>) -> bool {
        let success = error.is_none();
        let status = CollectionStatus::finished(session_id, error);
        if let Err(err) = self.publisher.publish_status(&status).await {
            tracing::debug!(error = %err, "status publish failed");
        }
        self.events.send(AgentEvent::Collection(status));
        success
    }
}
