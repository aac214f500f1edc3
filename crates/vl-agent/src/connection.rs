//! Adapter connection lifecycle: discovery, ranked auto-connect,
//! retry-with-backoff transport connect, GATT resolution, modem
//! initialization, probe validation, and state broadcasting.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tokio::time;

use vl_ble::modem::ModemSession;
use vl_ble::transport::{
    BleBackend, BlePeripheral, DeviceCandidate, GattCharacteristic, uuid_matches_suffix,
};
use vl_protocol::command::CommandCatalog;
use vl_protocol::status::{AgentEvent, ConnectionState};

use crate::error::{AgentError, AgentResult};
use crate::executor::CommandExecutor;
use crate::single_flight::SingleFlight;
use crate::sinks::DeviceStore;
use crate::status::StatusBroadcaster;

/// Advertised-name markers that promote a candidate during ranking.
const PREFERRED_NAME_MARKERS: [&str; 2] = ["OBD", "ELM"];

/// Modem initialization sequence run after GATT resolution, before the
/// probe: reset, echo off, linefeeds off, spaces off, headers on,
/// protocol select, auto-formatting off.
const MODEM_INIT: [&str; 7] = ["ATZ", "ATE0", "ATL0", "ATS0", "ATH1", "ATSP6", "ATCAF0"];

/// Tunables for discovery and connect retry.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Scan window for auto-connect discovery.
    pub scan_window: Duration,
    /// Transport connect attempts per device before giving up.
    pub connect_attempts: u32,
    /// Delay between transport connect attempts.
    pub connect_retry_delay: Duration,
    /// Short-form suffix of the serial service UUID.
    pub service_suffix: String,
    /// Short-form suffix of the serial characteristic UUID.
    pub characteristic_suffix: String,
    /// Response timeout for modem commands.
    pub modem_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            scan_window: Duration::from_secs(5),
            connect_attempts: 3,
            connect_retry_delay: Duration::from_secs(2),
            service_suffix: "ffe0".to_string(),
            characteristic_suffix: "ffe1".to_string(),
            modem_timeout: vl_ble::modem::DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

/// Per-device connect statistics, kept across attempts to support
/// ranking heuristics.
#[derive(Debug, Clone, Default)]
pub struct DeviceStats {
    pub attempts: u32,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

/// Owns the adapter connection state machine.
///
/// All state transitions happen here; observers follow along on the
/// event stream.
pub struct ConnectionManager {
    backend: Arc<dyn BleBackend>,
    executor: Arc<CommandExecutor>,
    catalog: Arc<CommandCatalog>,
    device_store: Arc<dyn DeviceStore>,
    events: StatusBroadcaster,
    config: ConnectionConfig,
    state: Mutex<ConnectionState>,
    stats: Mutex<HashMap<String, DeviceStats>>,
    active_device: Mutex<Option<String>>,
    peripheral: AsyncMutex<Option<Arc<dyn BlePeripheral>>>,
    auto_connect_guard: SingleFlight<bool>,
}

impl ConnectionManager {
    pub fn new(
        backend: Arc<dyn BleBackend>,
        executor: Arc<CommandExecutor>,
        catalog: Arc<CommandCatalog>,
        device_store: Arc<dyn DeviceStore>,
        events: StatusBroadcaster,
        config: ConnectionConfig,
    ) -> Self {
        Self {
            backend,
            executor,
            catalog,
            device_store,
            events,
            config,
            state: Mutex::new(ConnectionState::Disconnected),
            stats: Mutex::new(HashMap::new()),
            active_device: Mutex::new(None),
            peripheral: AsyncMutex::new(None),
            auto_connect_guard: SingleFlight::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    pub fn stats_for(&self, device_id: &str) -> Option<DeviceStats> {
        self.stats.lock().unwrap().get(device_id).cloned()
    }

    /// Scan, rank, and connect to the first workable candidate.
    ///
    /// Guarded against re-entrant starts: concurrent callers join the
    /// attempt already in flight and share its outcome.
    pub async fn auto_connect(self: &Arc<Self>) -> bool {
        let this = Arc::clone(self);
        self.auto_connect_guard
            .run(move || async move { this.auto_connect_inner().await })
            .await
    }

    async fn auto_connect_inner(&self) -> bool {
        {
            let state = *self.state.lock().unwrap();
            if state == ConnectionState::Ready {
                return true;
            }
            if !state.is_idle() {
                tracing::warn!(current = %state, "auto-connect requested while busy");
                return false;
            }
        }

        self.set_state(ConnectionState::Scanning);
        let candidates = match self.backend.scan(self.config.scan_window).await {
            Ok(candidates) => candidates,
            Err(err) => {
                tracing::warn!(error = %err, "scan failed");
                self.set_state(ConnectionState::Error);
                return false;
            }
        };
        self.set_state(ConnectionState::ScanComplete);

        if candidates.is_empty() {
            tracing::info!("no devices visible, skipping connect");
            self.set_state(ConnectionState::Disconnected);
            return false;
        }

        for candidate in self.rank(candidates).await {
            tracing::info!(
                device_id = %candidate.id,
                name = ?candidate.name,
                rssi = ?candidate.signal_strength,
                "attempting candidate"
            );
            if self.connect(&candidate).await {
                self.device_store.remember(&candidate.id).await;
                return true;
            }
        }
        false
    }

    /// Connect, resolve, initialize, and probe-validate one device.
    ///
    /// Any failure — transport, resolution, modem, or probe — triggers a
    /// best-effort cleanup disconnect and returns false.
    pub async fn connect(&self, candidate: &DeviceCandidate) -> bool {
        {
            let state = *self.state.lock().unwrap();
            let can_start = state.is_idle() || state == ConnectionState::ScanComplete;
            if !can_start {
                tracing::warn!(current = %state, "connect requested while busy");
                return false;
            }
        }

        self.stats
            .lock()
            .unwrap()
            .entry(candidate.id.clone())
            .or_default()
            .attempts += 1;

        self.set_state(ConnectionState::Connecting);
        match self.try_connect(candidate).await {
            Ok(()) => {
                *self.active_device.lock().unwrap() = Some(candidate.id.clone());
                {
                    let mut stats = self.stats.lock().unwrap();
                    let entry = stats.entry(candidate.id.clone()).or_default();
                    entry.consecutive_failures = 0;
                    entry.last_error = None;
                }
                self.set_state(ConnectionState::Ready);
                tracing::info!(device_id = %candidate.id, "adapter ready");
                true
            }
            Err(err) => {
                tracing::warn!(device_id = %candidate.id, error = %err, "connect failed");
                {
                    let mut stats = self.stats.lock().unwrap();
                    let entry = stats.entry(candidate.id.clone()).or_default();
                    entry.consecutive_failures += 1;
                    entry.last_error = Some(err.to_string());
                }
                self.cleanup().await;
                self.set_state(ConnectionState::Error);
                false
            }
        }
    }

    async fn try_connect(&self, candidate: &DeviceCandidate) -> AgentResult<()> {
        let peripheral: Arc<dyn BlePeripheral> =
            Arc::from(self.connect_transport(&candidate.id).await?);
        self.set_state(ConnectionState::Connected);
        *self.peripheral.lock().await = Some(Arc::clone(&peripheral));

        let characteristics = peripheral.characteristics().await?;
        let serial = self.resolve_serial(&characteristics)?;
        let notifications = peripheral.subscribe(&serial).await?;

        let mut session = ModemSession::new(Arc::clone(&peripheral), serial, notifications)
            .with_timeout(self.config.modem_timeout);
        for directive in MODEM_INIT {
            session.send_command(directive, true).await?;
        }
        self.executor.attach(session).await;

        // The transport link being up proves nothing about the peer;
        // one probe command validates it speaks the expected protocol.
        let probe = self.catalog.probe();
        let fields = self.executor.run(probe).await?;
        if fields.is_empty() {
            return Err(AgentError::Connection(format!(
                "probe {} returned no data",
                probe.id
            )));
        }
        Ok(())
    }

    /// Transport-level connect with a bounded retry loop.
    async fn connect_transport(&self, device_id: &str) -> AgentResult<Box<dyn BlePeripheral>> {
        let mut last_error = String::new();
        for attempt in 1..=self.config.connect_attempts {
            match self.backend.connect(device_id).await {
                Ok(peripheral) => return Ok(peripheral),
                Err(err) => {
                    tracing::warn!(device_id, attempt, error = %err, "transport connect failed");
                    last_error = err.to_string();
                    if attempt < self.config.connect_attempts {
                        time::sleep(self.config.connect_retry_delay).await;
                    }
                }
            }
        }
        Err(AgentError::Connection(format!(
            "Failed to connect after {} attempts: {last_error}",
            self.config.connect_attempts
        )))
    }

    /// Find the serial characteristic by service and characteristic
    /// UUID-suffix. Either lookup failing is a hard failure.
    fn resolve_serial(
        &self,
        characteristics: &[GattCharacteristic],
    ) -> AgentResult<GattCharacteristic> {
        let service_uuid = characteristics
            .iter()
            .map(|c| &c.service_uuid)
            .find(|uuid| uuid_matches_suffix(uuid, &self.config.service_suffix))
            .cloned()
            .ok_or_else(|| {
                AgentError::Connection(format!(
                    "serial service {} not found",
                    self.config.service_suffix
                ))
            })?;

        characteristics
            .iter()
            .find(|c| {
                c.service_uuid == service_uuid
                    && uuid_matches_suffix(&c.uuid, &self.config.characteristic_suffix)
            })
            .cloned()
            .ok_or_else(|| {
                AgentError::Connection(format!(
                    "serial characteristic {} not found",
                    self.config.characteristic_suffix
                ))
            })
    }

    /// Orderly teardown of the active connection.
    pub async fn disconnect(&self) {
        self.set_state(ConnectionState::Disconnecting);
        self.cleanup().await;
        self.set_state(ConnectionState::Disconnected);
    }

    /// Best-effort teardown; secondary errors are swallowed.
    async fn cleanup(&self) {
        self.executor.detach().await;
        *self.active_device.lock().unwrap() = None;
        if let Some(peripheral) = self.peripheral.lock().await.take()
            && let Err(err) = peripheral.disconnect().await
        {
            tracing::debug!(error = %err, "cleanup disconnect failed");
        }
    }

    /// Rank candidates: the persisted device first, then advertised
    /// names containing an OBD/ELM marker, stable otherwise.
    async fn rank(&self, mut candidates: Vec<DeviceCandidate>) -> Vec<DeviceCandidate> {
        let saved = self.device_store.last_device_id().await;
        candidates.sort_by_key(|candidate| {
            let is_saved = saved.as_deref() == Some(candidate.id.as_str());
            let is_named = candidate.name.as_deref().is_some_and(|name| {
                let upper = name.to_uppercase();
                PREFERRED_NAME_MARKERS.iter().any(|m| upper.contains(m))
            });
            (!is_saved, !is_named)
        });
        candidates
    }

    fn set_state(&self, next: ConnectionState) {
        *self.state.lock().unwrap() = next;
        let device_id = self.active_device.lock().unwrap().clone();
        self.events.send(AgentEvent::Connection {
            state: next,
            device_id,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vl_ble::mock::{MockBackend, MockPeripheral};
    use vl_protocol::CommandCatalog;

    use crate::sinks::MemoryDeviceStore;

    fn candidate(id: &str, name: Option<&str>) -> DeviceCandidate {
        DeviceCandidate {
            id: id.to_string(),
            name: name.map(str::to_string),
            signal_strength: Some(-60),
        }
    }

    /// Battery capture answering the probe with decodable data.
    fn script_probe(mock: &MockPeripheral) {
        mock.queue_chunked_response(
            "022101",
            vec![
                "18DAF1DB10356101FFFFACFF\r\
                 18DAF1DB21840E478486B401\r\
                 18DAF1DB2200000000000000\r\
                 18DAF1DB2300000000000000\r\
                 18DAF1DB2400000000000000\r\
                 18DAF1DB2500000000000000\r\
                 18DAF1DB2600000000000000\r\
                 18DAF1DB2700000000000000\r\r>"
                    .to_string(),
            ],
        );
    }

    struct Harness {
        backend: Arc<MockBackend>,
        manager: Arc<ConnectionManager>,
        store: Arc<MemoryDeviceStore>,
    }

    fn harness() -> Harness {
        harness_with_config(ConnectionConfig {
            scan_window: Duration::from_millis(5),
            connect_retry_delay: Duration::from_millis(5),
            ..ConnectionConfig::default()
        })
    }

    fn harness_with_config(config: ConnectionConfig) -> Harness {
        let backend = Arc::new(MockBackend::new());
        let store = Arc::new(MemoryDeviceStore::new());
        let manager = Arc::new(ConnectionManager::new(
            backend.clone(),
            Arc::new(CommandExecutor::new()),
            Arc::new(CommandCatalog::standard()),
            store.clone(),
            StatusBroadcaster::new(64),
            config,
        ));
        Harness {
            backend,
            manager,
            store,
        }
    }

    #[tokio::test]
    async fn connect_succeeds_and_reaches_ready() {
        let h = harness();
        let mock = Arc::new(MockPeripheral::elm());
        script_probe(&mock);
        h.backend.add_device(candidate("aa:bb", Some("OBDII")), mock.clone());

        assert!(h.manager.connect(&candidate("aa:bb", Some("OBDII"))).await);
        assert_eq!(h.manager.state(), ConnectionState::Ready);

        // Modem init ran before the probe
        let written = mock.written();
        assert_eq!(&written[..7], &["ATZ", "ATE0", "ATL0", "ATS0", "ATH1", "ATSP6", "ATCAF0"]);
        assert!(written.contains(&"022101".to_string()));

        let stats = h.manager.stats_for("aa:bb").unwrap();
        assert_eq!(stats.attempts, 1);
        assert_eq!(stats.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn transport_retries_exhaust_after_three_attempts() {
        let h = harness();
        let mock = Arc::new(MockPeripheral::elm());
        h.backend.add_device(candidate("aa:bb", None), mock);
        h.backend.fail_connects("aa:bb", 10);

        assert!(!h.manager.connect(&candidate("aa:bb", None)).await);

        assert_eq!(h.backend.connect_attempts().len(), 3);
        assert_eq!(h.manager.state(), ConnectionState::Error);

        let stats = h.manager.stats_for("aa:bb").unwrap();
        assert_eq!(stats.consecutive_failures, 1);
        assert!(
            stats
                .last_error
                .unwrap()
                .contains("Failed to connect after")
        );
    }

    #[tokio::test]
    async fn missing_serial_characteristic_is_hard_failure() {
        let h = harness();
        let mock = Arc::new(MockPeripheral::without_serial_service());
        h.backend.add_device(candidate("aa:bb", None), mock);

        assert!(!h.manager.connect(&candidate("aa:bb", None)).await);
        assert_eq!(h.manager.state(), ConnectionState::Error);

        let stats = h.manager.stats_for("aa:bb").unwrap();
        assert!(stats.last_error.unwrap().contains("serial service"));
    }

    #[tokio::test]
    async fn empty_probe_fails_connection_despite_transport_success() {
        let h = harness();
        // Unscripted probe answers NO DATA
        let mock = Arc::new(MockPeripheral::elm());
        h.backend.add_device(candidate("aa:bb", None), mock);

        assert!(!h.manager.connect(&candidate("aa:bb", None)).await);
        assert_eq!(h.manager.state(), ConnectionState::Error);

        let stats = h.manager.stats_for("aa:bb").unwrap();
        assert!(stats.last_error.unwrap().contains("probe"));
    }

    #[tokio::test]
    async fn auto_connect_with_empty_scan_short_circuits() {
        let h = harness();
        assert!(!h.manager.auto_connect().await);
        assert_eq!(h.manager.state(), ConnectionState::Disconnected);
        assert!(h.backend.connect_attempts().is_empty());
    }

    #[tokio::test]
    async fn auto_connect_tries_candidates_in_rank_order() {
        let h = harness();

        // Unnamed device that answers probes; OBD-named device that
        // fails at transport level
        let good = Arc::new(MockPeripheral::elm());
        script_probe(&good);
        h.backend.add_device(candidate("plain", None), good);

        let named = Arc::new(MockPeripheral::elm());
        h.backend.add_device(candidate("obd", Some("OBDII-adapter")), named);
        h.backend.fail_connects("obd", 10);

        assert!(h.manager.auto_connect().await);

        // The OBD-named device was tried first (3 attempts), then the
        // plain one succeeded
        let attempts = h.backend.connect_attempts();
        assert_eq!(&attempts[..3], &["obd", "obd", "obd"]);
        assert_eq!(attempts[3], "plain");
        assert_eq!(h.store.last_device_id().await.as_deref(), Some("plain"));
    }

    #[tokio::test]
    async fn ranking_prefers_saved_device_over_named() {
        let h = harness();
        h.store.remember("saved").await;

        let ranked = h
            .manager
            .rank(vec![
                candidate("named", Some("ELM327")),
                candidate("saved", None),
                candidate("other", None),
            ])
            .await;

        assert_eq!(ranked[0].id, "saved");
        assert_eq!(ranked[1].id, "named");
        assert_eq!(ranked[2].id, "other");
    }

    #[tokio::test]
    async fn ranking_is_stable_for_equal_candidates() {
        let h = harness();
        let ranked = h
            .manager
            .rank(vec![
                candidate("a", None),
                candidate("b", None),
                candidate("c", None),
            ])
            .await;
        let ids: Vec<_> = ranked.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn disconnect_returns_to_disconnected() {
        let h = harness();
        let mock = Arc::new(MockPeripheral::elm());
        script_probe(&mock);
        h.backend.add_device(candidate("aa:bb", None), mock);

        assert!(h.manager.connect(&candidate("aa:bb", None)).await);
        h.manager.disconnect().await;
        assert_eq!(h.manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn auto_connect_when_ready_is_a_noop() {
        let h = harness();
        let mock = Arc::new(MockPeripheral::elm());
        script_probe(&mock);
        h.backend.add_device(candidate("aa:bb", None), mock);

        assert!(h.manager.connect(&candidate("aa:bb", None)).await);
        let attempts_before = h.backend.connect_attempts().len();

        assert!(h.manager.auto_connect().await);
        assert_eq!(h.backend.connect_attempts().len(), attempts_before);
    }
}
