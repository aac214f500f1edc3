//! BLE transport abstraction.
//!
//! `BleBackend`/`BlePeripheral` traits with two implementations:
//! - `BtleplugBackend` — real hardware via `btleplug` (in `backend.rs`)
//! - `MockBackend` — scripted responses, all platforms (in `mock.rs`)
//!
//! Every test runs against the mock so the suite needs no radio.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::TransportResult;

/// A device seen during one scan window.
///
/// Candidates are ephemeral — they are re-discovered on every scan cycle
/// and ranked by the connection manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceCandidate {
    /// Platform-specific peripheral id.
    pub id: String,
    /// Advertised local name, when broadcast.
    pub name: Option<String>,
    /// RSSI in dBm, when the adapter reported one.
    pub signal_strength: Option<i16>,
}

/// A discovered GATT characteristic and its owning service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattCharacteristic {
    pub uuid: String,
    pub service_uuid: String,
}

/// Match a UUID against a 4-character short-form suffix.
///
/// `"ffe0"` matches `"0000ffe0-0000-1000-8000-00805f9b34fb"`: the
/// comparison is against the last four characters of the first dash
/// group, case-insensitive.
pub fn uuid_matches_suffix(uuid: &str, suffix: &str) -> bool {
    let group = uuid.split('-').next().unwrap_or(uuid);
    let Some(tail) = group.get(group.len().wrapping_sub(4)..) else {
        return false;
    };
    tail.eq_ignore_ascii_case(suffix)
}

/// Discovers and connects BLE devices.
#[async_trait]
pub trait BleBackend: Send + Sync {
    /// Scan for `window`, returning every visible device.
    async fn scan(&self, window: Duration) -> TransportResult<Vec<DeviceCandidate>>;

    /// Open a transport link to a previously scanned device.
    async fn connect(&self, device_id: &str) -> TransportResult<Box<dyn BlePeripheral>>;
}

/// One connected peripheral.
#[async_trait]
pub trait BlePeripheral: Send + Sync {
    /// All characteristics discovered on the peripheral.
    async fn characteristics(&self) -> TransportResult<Vec<GattCharacteristic>>;

    /// Subscribe to notifications on a characteristic; chunks arrive on
    /// the returned channel in delivery order.
    async fn subscribe(
        &self,
        characteristic: &GattCharacteristic,
    ) -> TransportResult<mpsc::Receiver<Vec<u8>>>;

    /// Write a payload to a characteristic.
    async fn write(
        &self,
        characteristic: &GattCharacteristic,
        payload: &[u8],
    ) -> TransportResult<()>;

    async fn disconnect(&self) -> TransportResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_matches_short_form_group() {
        assert!(uuid_matches_suffix(
            "0000ffe0-0000-1000-8000-00805f9b34fb",
            "ffe0"
        ));
        assert!(uuid_matches_suffix(
            "0000FFE1-0000-1000-8000-00805F9B34FB",
            "ffe1"
        ));
        assert!(!uuid_matches_suffix(
            "0000ffe0-0000-1000-8000-00805f9b34fb",
            "ffe1"
        ));
    }

    #[test]
    fn suffix_matches_bare_uuid() {
        assert!(uuid_matches_suffix("0000ffe0", "ffe0"));
        assert!(uuid_matches_suffix("ffe0", "ffe0"));
    }

    #[test]
    fn suffix_rejects_short_input() {
        assert!(!uuid_matches_suffix("fe0", "ffe0"));
        assert!(!uuid_matches_suffix("", "ffe0"));
    }
}
