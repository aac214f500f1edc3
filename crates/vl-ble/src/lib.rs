//! VoltLink BLE transport — backend abstraction over `btleplug`, a
//! scripted mock for tests, and the AT modem session that frames
//! commands over the adapter's serial characteristic.

pub mod backend;
pub mod error;
pub mod mock;
pub mod modem;
pub mod transport;

pub use backend::BtleplugBackend;
pub use error::{TransportError, TransportResult};
pub use mock::{MockBackend, MockPeripheral, MockPeripheralHandle};
pub use modem::{ACK_RETRIES, DEFAULT_COMMAND_TIMEOUT, ModemSession, RESPONSE_PROMPT};
pub use transport::{
    BleBackend, BlePeripheral, DeviceCandidate, GattCharacteristic, uuid_matches_suffix,
};
