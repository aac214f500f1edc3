//! MQTT topic builders for the home-automation hierarchy.
//!
//! Topic structure:
//! ```text
//! voltlink/{device_id}/telemetry
//! voltlink/{device_id}/status
//! ```

const PREFIX: &str = "voltlink";

pub fn telemetry(device_id: &str) -> String {
    format!("{PREFIX}/{device_id}/telemetry")
}

pub fn status(device_id: &str) -> String {
    format!("{PREFIX}/{device_id}/status")
}
