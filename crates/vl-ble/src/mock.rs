//! Mock BLE backend for testing.
//!
//! Supports scripted response queues keyed by command, write recording,
//! and per-device connect-failure injection. All tests use this instead of
//! a real radio so the suite runs in CI on any platform.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{TransportError, TransportResult};
use crate::transport::{BleBackend, BlePeripheral, DeviceCandidate, GattCharacteristic};

/// Serial service UUID advertised by ELM-style BLE adapters.
pub const SERIAL_SERVICE_UUID: &str = "0000ffe0-0000-1000-8000-00805f9b34fb";
/// Serial characteristic UUID (write + notify).
pub const SERIAL_CHARACTERISTIC_UUID: &str = "0000ffe1-0000-1000-8000-00805f9b34fb";

/// Depth of the notification channel handed to subscribers.
const NOTIFICATION_BUFFER: usize = 64;

// ── MockBackend ─────────────────────────────────────────────────

/// Mock backend with a fixed candidate list and scripted peripherals.
pub struct MockBackend {
    candidates: Mutex<Vec<DeviceCandidate>>,
    peripherals: Mutex<HashMap<String, Arc<MockPeripheral>>>,
    connect_failures: Mutex<HashMap<String, u32>>,
    connect_attempts: Mutex<Vec<String>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            candidates: Mutex::new(Vec::new()),
            peripherals: Mutex::new(HashMap::new()),
            connect_failures: Mutex::new(HashMap::new()),
            connect_attempts: Mutex::new(Vec::new()),
        }
    }

    /// Register a device visible to scans, with its scripted peripheral.
    pub fn add_device(&self, candidate: DeviceCandidate, peripheral: Arc<MockPeripheral>) {
        self.peripherals
            .lock()
            .unwrap()
            .insert(candidate.id.clone(), peripheral);
        self.candidates.lock().unwrap().push(candidate);
    }

    /// Make the next `count` connects to `device_id` fail at the transport
    /// level.
    pub fn fail_connects(&self, device_id: &str, count: u32) {
        self.connect_failures
            .lock()
            .unwrap()
            .insert(device_id.to_string(), count);
    }

    /// Device ids passed to `connect`, in call order.
    pub fn connect_attempts(&self) -> Vec<String> {
        self.connect_attempts.lock().unwrap().clone()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BleBackend for MockBackend {
    async fn scan(&self, _window: Duration) -> TransportResult<Vec<DeviceCandidate>> {
        Ok(self.candidates.lock().unwrap().clone())
    }

    async fn connect(&self, device_id: &str) -> TransportResult<Box<dyn BlePeripheral>> {
        self.connect_attempts
            .lock()
            .unwrap()
            .push(device_id.to_string());

        {
            let mut failures = self.connect_failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(device_id)
                && *remaining > 0
            {
                *remaining -= 1;
                return Err(TransportError::Connect(
                    "simulated transport failure".into(),
                ));
            }
        }

        let peripheral = self
            .peripherals
            .lock()
            .unwrap()
            .get(device_id)
            .cloned()
            .ok_or_else(|| TransportError::DeviceNotFound(device_id.to_string()))?;
        Ok(Box::new(MockPeripheralHandle(peripheral)))
    }
}

// ── MockPeripheral ──────────────────────────────────────────────

/// Scripted peripheral: responds to writes with queued notification
/// chunks and records everything written.
pub struct MockPeripheral {
    characteristics: Vec<GattCharacteristic>,
    /// command → queue of chunked responses, consumed front-first.
    scripted: Mutex<HashMap<String, VecDeque<Vec<String>>>>,
    /// command → chunks replayed whenever the scripted queue is empty.
    defaults: Mutex<HashMap<String, Vec<String>>>,
    written: Mutex<Vec<String>>,
    /// Writes to silently drop (no response at all).
    swallow: Mutex<u32>,
    /// Echo each command back before the response, like an adapter that
    /// has not yet processed `ATE0`.
    echo: bool,
    notify_tx: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
}

impl MockPeripheral {
    /// An ELM-style adapter exposing the serial service.
    pub fn elm() -> Self {
        Self {
            characteristics: vec![GattCharacteristic {
                uuid: SERIAL_CHARACTERISTIC_UUID.to_string(),
                service_uuid: SERIAL_SERVICE_UUID.to_string(),
            }],
            scripted: Mutex::new(HashMap::new()),
            defaults: Mutex::new(HashMap::new()),
            written: Mutex::new(Vec::new()),
            swallow: Mutex::new(0),
            echo: false,
            notify_tx: Mutex::new(None),
        }
    }

    /// A peripheral with no serial service (resolution-failure paths).
    pub fn without_serial_service() -> Self {
        Self {
            characteristics: vec![GattCharacteristic {
                uuid: "00002a26-0000-1000-8000-00805f9b34fb".to_string(),
                service_uuid: "0000180a-0000-1000-8000-00805f9b34fb".to_string(),
            }],
            ..Self::elm()
        }
    }

    /// Echo commands back before responding.
    pub fn with_echo(mut self) -> Self {
        self.echo = true;
        self
    }

    /// The serial characteristic descriptor.
    pub fn serial_characteristic(&self) -> GattCharacteristic {
        GattCharacteristic {
            uuid: SERIAL_CHARACTERISTIC_UUID.to_string(),
            service_uuid: SERIAL_SERVICE_UUID.to_string(),
        }
    }

    /// Queue a prompt-terminated response for `command`.
    pub fn queue_response(&self, command: &str, response: &str) {
        self.queue_chunked_response(command, vec![format!("{response}\r\r>")]);
    }

    /// Queue a response delivered as the given raw chunks. The script
    /// author is responsible for including the `>` prompt.
    pub fn queue_chunked_response(&self, command: &str, chunks: Vec<String>) {
        self.scripted
            .lock()
            .unwrap()
            .entry(command.to_string())
            .or_default()
            .push_back(chunks);
    }

    /// Replay `response` for every write of `command` once the scripted
    /// queue for it is drained.
    pub fn set_default_response(&self, command: &str, response: &str) {
        self.defaults
            .lock()
            .unwrap()
            .insert(command.to_string(), vec![format!("{response}\r\r>")]);
    }

    /// Silently drop the next `count` writes.
    pub fn swallow_writes(&self, count: u32) {
        *self.swallow.lock().unwrap() += count;
    }

    /// Everything written so far, without trailing carriage returns.
    pub fn written(&self) -> Vec<String> {
        self.written.lock().unwrap().clone()
    }

    /// Pick the response chunks for a command. Unscripted AT directives
    /// acknowledge with `OK`; unscripted data requests answer `NO DATA`.
    fn response_chunks(&self, command: &str) -> Option<Vec<String>> {
        {
            let mut swallow = self.swallow.lock().unwrap();
            if *swallow > 0 {
                *swallow -= 1;
                return None;
            }
        }
        let scripted = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(command)
            .and_then(VecDeque::pop_front);
        let mut chunks = scripted
            .or_else(|| self.defaults.lock().unwrap().get(command).cloned())
            .unwrap_or_else(|| {
                if command.starts_with("AT") {
                    vec!["OK\r\r>".to_string()]
                } else {
                    vec!["NO DATA\r\r>".to_string()]
                }
            });
        if self.echo {
            chunks.insert(0, format!("{command}\r"));
        }
        Some(chunks)
    }
}

/// Cloneable handle returned by `MockBackend::connect`.
pub struct MockPeripheralHandle(pub Arc<MockPeripheral>);

#[async_trait]
impl BlePeripheral for MockPeripheralHandle {
    async fn characteristics(&self) -> TransportResult<Vec<GattCharacteristic>> {
        Ok(self.0.characteristics.clone())
    }

    async fn subscribe(
        &self,
        _characteristic: &GattCharacteristic,
    ) -> TransportResult<mpsc::Receiver<Vec<u8>>> {
        let (tx, rx) = mpsc::channel(NOTIFICATION_BUFFER);
        *self.0.notify_tx.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn write(
        &self,
        _characteristic: &GattCharacteristic,
        payload: &[u8],
    ) -> TransportResult<()> {
        let command = String::from_utf8_lossy(payload)
            .trim_end_matches('\r')
            .to_string();
        self.0.written.lock().unwrap().push(command.clone());

        let Some(chunks) = self.0.response_chunks(&command) else {
            return Ok(());
        };
        let tx = self.0.notify_tx.lock().unwrap().clone();
        if let Some(tx) = tx {
            for chunk in chunks {
                if tx.send(chunk.into_bytes()).await.is_err() {
                    break;
                }
            }
        }
        Ok(())
    }

    async fn disconnect(&self) -> TransportResult<()> {
        // Dropping the sender closes the notification channel.
        self.0.notify_tx.lock().unwrap().take();
        Ok(())
    }
}
