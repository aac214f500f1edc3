//! Collaborator interfaces: the persistence sink readings flow into and
//! the store remembering the last known adapter.
//!
//! Storage-engine internals live outside this repository; the agent only
//! needs `insert` and a device-id get/set.

use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use vl_protocol::reading::Reading;

use crate::error::{AgentError, AgentResult};

/// Persistence sink for decoded readings.
#[async_trait]
pub trait ReadingSink: Send + Sync {
    async fn insert(&self, reading: &Reading) -> AgentResult<()>;
}

/// Remembers the adapter that last connected successfully, so the next
/// auto-connect ranks it first.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn last_device_id(&self) -> Option<String>;
    async fn remember(&self, device_id: &str);
}

// ── In-memory implementations ───────────────────────────────────

/// Sink keeping readings in memory. Used by tests, and as the default
/// when no external store is wired in.
pub struct MemorySink {
    readings: Mutex<Vec<Reading>>,
    /// Oldest readings are dropped beyond this bound; `None` keeps all.
    capacity: Option<usize>,
    fail: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            readings: Mutex::new(Vec::new()),
            capacity: None,
            fail: AtomicBool::new(false),
        }
    }

    /// Bounded sink for long-running processes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new()
        }
    }

    /// Make every subsequent insert fail.
    pub fn fail_inserts(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }

    pub fn readings(&self) -> Vec<Reading> {
        self.readings.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.readings.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.lock().unwrap().is_empty()
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReadingSink for MemorySink {
    async fn insert(&self, reading: &Reading) -> AgentResult<()> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(AgentError::Storage("simulated storage failure".into()));
        }
        let mut readings = self.readings.lock().unwrap();
        readings.push(reading.clone());
        if let Some(capacity) = self.capacity
            && readings.len() > capacity
        {
            let excess = readings.len() - capacity;
            readings.drain(..excess);
        }
        Ok(())
    }
}

/// Device store keeping the id in memory only.
pub struct MemoryDeviceStore {
    device_id: Mutex<Option<String>>,
}

impl MemoryDeviceStore {
    pub fn new() -> Self {
        Self {
            device_id: Mutex::new(None),
        }
    }

    pub fn with_device(device_id: &str) -> Self {
        Self {
            device_id: Mutex::new(Some(device_id.to_string())),
        }
    }
}

impl Default for MemoryDeviceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceStore for MemoryDeviceStore {
    async fn last_device_id(&self) -> Option<String> {
        self.device_id.lock().unwrap().clone()
    }

    async fn remember(&self, device_id: &str) {
        *self.device_id.lock().unwrap() = Some(device_id.to_string());
    }
}

// ── File-backed device store ────────────────────────────────────

/// Device store persisting the id as a single line on disk, surviving
/// agent restarts. All I/O errors degrade to "no saved device".
pub struct FileDeviceStore {
    path: PathBuf,
}

impl FileDeviceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DeviceStore for FileDeviceStore {
    async fn last_device_id(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                let id = contents.trim();
                (!id.is_empty()).then(|| id.to_string())
            }
            Err(err) => {
                tracing::debug!(path = %self.path.display(), error = %err, "no saved device");
                None
            }
        }
    }

    async fn remember(&self, device_id: &str) {
        if let Some(parent) = self.path.parent()
            && let Err(err) = std::fs::create_dir_all(parent)
        {
            tracing::warn!(path = %self.path.display(), error = %err, "cannot create device store dir");
            return;
        }
        if let Err(err) = std::fs::write(&self.path, device_id) {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to save device id");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;
    use vl_protocol::fields::FieldValue;

    fn sample_reading() -> Reading {
        Reading {
            field: "state_of_charge".into(),
            value: FieldValue::Integer(86),
            unit: Some("%".into()),
            collected_at: Utc::now(),
            session_id: Uuid::now_v7(),
        }
    }

    #[tokio::test]
    async fn memory_sink_records_inserts() {
        let sink = MemorySink::new();
        sink.insert(&sample_reading()).await.unwrap();
        sink.insert(&sample_reading()).await.unwrap();
        assert_eq!(sink.len(), 2);
    }

    #[tokio::test]
    async fn memory_sink_capacity_drops_oldest() {
        let sink = MemorySink::with_capacity(2);
        for _ in 0..5 {
            sink.insert(&sample_reading()).await.unwrap();
        }
        assert_eq!(sink.len(), 2);
    }

    #[tokio::test]
    async fn memory_sink_failure_injection() {
        let sink = MemorySink::new();
        sink.fail_inserts(true);
        assert!(sink.insert(&sample_reading()).await.is_err());
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn memory_device_store_roundtrip() {
        let store = MemoryDeviceStore::new();
        assert!(store.last_device_id().await.is_none());
        store.remember("aa:bb:cc").await;
        assert_eq!(store.last_device_id().await.as_deref(), Some("aa:bb:cc"));
    }

    #[tokio::test]
    async fn file_device_store_roundtrip() {
        let path = std::env::temp_dir().join(format!("vl-device-{}", Uuid::now_v7()));
        let store = FileDeviceStore::new(&path);

        assert!(store.last_device_id().await.is_none());
        store.remember("aa:bb:cc").await;
        assert_eq!(store.last_device_id().await.as_deref(), Some("aa:bb:cc"));

        let _ = std::fs::remove_file(&path);
    }
}
