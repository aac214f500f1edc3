//! Shared test harness for E2E integration tests.
//!
//! Wires the mock BLE backend, memory sink, and mock publisher through
//! the real executor/connection-manager/collector stack, exercising real
//! code paths across all crate boundaries.

use std::sync::Arc;
use std::time::Duration;

use vl_agent::collector::Collector;
use vl_agent::connection::{ConnectionConfig, ConnectionManager};
use vl_agent::executor::CommandExecutor;
use vl_agent::sinks::{MemoryDeviceStore, MemorySink};
use vl_agent::status::StatusBroadcaster;
use vl_ble::mock::{MockBackend, MockPeripheral};
use vl_ble::transport::DeviceCandidate;
use vl_protocol::CommandCatalog;
use vl_publish::MockPublisher;

/// Eight-line multi-frame capture of a BMS battery response: 86% state
/// of charge, 365.5 V pack voltage, -12.4 A draw, 14.4 V auxiliary rail.
/// Two bytes longer than the first frame advertises.
pub const BATTERY_CAPTURE: &str = "18DAF1DB10356101FFFFACFF\r\
    18DAF1DB21840E478486B401\r\
    18DAF1DB2200000000000000\r\
    18DAF1DB2300000000000000\r\
    18DAF1DB2400000000000000\r\
    18DAF1DB2500000000000000\r\
    18DAF1DB2600000000000000\r\
    18DAF1DB2700000000000000";

/// Single-frame VCU response: gear D, 0 km/h, 123456 km odometer.
pub const VEHICLE_CAPTURE: &str = "18DAF1DA076102040001E240";

/// End-to-end harness around one mock adapter.
pub struct TestHarness {
    pub backend: Arc<MockBackend>,
    pub manager: Arc<ConnectionManager>,
    pub executor: Arc<CommandExecutor>,
    pub collector: Arc<Collector>,
    pub sink: Arc<MemorySink>,
    pub publisher: Arc<MockPublisher>,
    pub store: Arc<MemoryDeviceStore>,
    pub events: StatusBroadcaster,
}

impl TestHarness {
    /// Build a harness with test-friendly timing.
    pub fn new() -> Self {
        let backend = Arc::new(MockBackend::new());
        let executor = Arc::new(CommandExecutor::new());
        let catalog = Arc::new(CommandCatalog::standard());
        let store = Arc::new(MemoryDeviceStore::new());
        let sink = Arc::new(MemorySink::new());
        let publisher = Arc::new(MockPublisher::new());
        let events = StatusBroadcaster::new(64);

        let manager = Arc::new(ConnectionManager::new(
            backend.clone(),
            executor.clone(),
            catalog.clone(),
            store.clone(),
            events.clone(),
            ConnectionConfig {
                scan_window: Duration::from_millis(5),
                connect_retry_delay: Duration::from_millis(5),
                modem_timeout: Duration::from_millis(100),
                ..ConnectionConfig::default()
            },
        ));
        let collector = Arc::new(Collector::new(
            manager.clone(),
            executor.clone(),
            catalog,
            sink.clone(),
            publisher.clone(),
            events.clone(),
        ));

        Self {
            backend,
            manager,
            executor,
            collector,
            sink,
            publisher,
            store,
            events,
        }
    }

    /// Register an adapter visible to scans; returns its peripheral for
    /// scripting.
    pub fn add_adapter(&self, id: &str, name: Option<&str>) -> Arc<MockPeripheral> {
        let peripheral = Arc::new(MockPeripheral::elm());
        self.backend.add_device(
            DeviceCandidate {
                id: id.to_string(),
                name: name.map(str::to_string),
                signal_strength: Some(-60),
            },
            peripheral.clone(),
        );
        peripheral
    }

    /// Make the adapter answer battery and vehicle requests on every
    /// cycle (probe included).
    pub fn script_healthy_vehicle(peripheral: &MockPeripheral) {
        peripheral.set_default_response("022101", BATTERY_CAPTURE);
        peripheral.set_default_response("022102", VEHICLE_CAPTURE);
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
