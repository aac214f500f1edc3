//! BLE backend backed by `btleplug`.

use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time;

use crate::error::{TransportError, TransportResult};
use crate::transport::{BleBackend, BlePeripheral, DeviceCandidate, GattCharacteristic};

/// Depth of the notification forwarding channel.
const NOTIFICATION_BUFFER: usize = 64;

/// Real BLE backend using the platform adapter.
pub struct BtleplugBackend {
    adapter: Adapter,
}

impl BtleplugBackend {
    /// Create a backend on the first available BLE adapter.
    pub async fn new() -> TransportResult<Self> {
        let manager = Manager::new()
            .await
            .map_err(|e| TransportError::Adapter(e.to_string()))?;
        let adapter = manager
            .adapters()
            .await
            .map_err(|e| TransportError::Adapter(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::Adapter("no BLE adapters present".into()))?;
        Ok(Self { adapter })
    }
}

#[async_trait]
impl BleBackend for BtleplugBackend {
    async fn scan(&self, window: Duration) -> TransportResult<Vec<DeviceCandidate>> {
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| TransportError::Scan(e.to_string()))?;
        time::sleep(window).await;

        let peripherals = self
            .adapter
            .peripherals()
            .await
            .map_err(|e| TransportError::Scan(e.to_string()))?;
        if let Err(e) = self.adapter.stop_scan().await {
            tracing::debug!(error = %e, "failed to stop scan cleanly");
        }

        let mut candidates = Vec::with_capacity(peripherals.len());
        for peripheral in peripherals {
            let Ok(Some(properties)) = peripheral.properties().await else {
                continue;
            };
            candidates.push(DeviceCandidate {
                id: peripheral.id().to_string(),
                name: properties.local_name,
                signal_strength: properties.rssi,
            });
        }
        tracing::debug!(count = candidates.len(), "scan window complete");
        Ok(candidates)
    }

    async fn connect(&self, device_id: &str) -> TransportResult<Box<dyn BlePeripheral>> {
        let peripherals = self
            .adapter
            .peripherals()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let peripheral = peripherals
            .into_iter()
            .find(|p| p.id().to_string() == device_id)
            .ok_or_else(|| TransportError::DeviceNotFound(device_id.to_string()))?;

        if !peripheral.is_connected().await.unwrap_or(false) {
            peripheral
                .connect()
                .await
                .map_err(|e| TransportError::Connect(e.to_string()))?;
        }
        peripheral
            .discover_services()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        Ok(Box::new(BtlePeripheral { inner: peripheral }))
    }
}

struct BtlePeripheral {
    inner: Peripheral,
}

impl BtlePeripheral {
    fn resolve(
        &self,
        characteristic: &GattCharacteristic,
    ) -> TransportResult<btleplug::api::Characteristic> {
        self.inner
            .characteristics()
            .into_iter()
            .find(|c| {
                c.uuid.to_string().eq_ignore_ascii_case(&characteristic.uuid)
                    && c.service_uuid
                        .to_string()
                        .eq_ignore_ascii_case(&characteristic.service_uuid)
            })
            .ok_or_else(|| TransportError::CharacteristicNotFound(characteristic.uuid.clone()))
    }
}

#[async_trait]
impl BlePeripheral for BtlePeripheral {
    async fn characteristics(&self) -> TransportResult<Vec<GattCharacteristic>> {
        Ok(self
            .inner
            .characteristics()
            .into_iter()
            .map(|c| GattCharacteristic {
                uuid: c.uuid.to_string(),
                service_uuid: c.service_uuid.to_string(),
            })
            .collect())
    }

    async fn subscribe(
        &self,
        characteristic: &GattCharacteristic,
    ) -> TransportResult<mpsc::Receiver<Vec<u8>>> {
        let target = self.resolve(characteristic)?;
        self.inner
            .subscribe(&target)
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;

        let mut stream = self
            .inner
            .notifications()
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;

        let (tx, rx) = mpsc::channel(NOTIFICATION_BUFFER);
        let uuid = target.uuid;
        tokio::spawn(async move {
            while let Some(notification) = stream.next().await {
                if notification.uuid != uuid {
                    continue;
                }
                if tx.send(notification.value).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }

    async fn write(
        &self,
        characteristic: &GattCharacteristic,
        payload: &[u8],
    ) -> TransportResult<()> {
        let target = self.resolve(characteristic)?;
        self.inner
            .write(&target, payload, WriteType::WithoutResponse)
            .await
            .map_err(|e| TransportError::Write(e.to_string()))
    }

    async fn disconnect(&self) -> TransportResult<()> {
        self.inner
            .disconnect()
            .await
            .map_err(|e| TransportError::Disconnect(e.to_string()))
    }
}
