//! Field decoders for EV diagnostic responses.
//!
//! Decoders apply fixed big-endian extraction over byte ranges, with
//! two's-complement correction for signed channels and per-channel
//! scale/offset. Byte offsets are vendor tables observed per firmware
//! variant, not derived.

use crate::fields::{FieldMap, FieldValue};

/// Positive response service id for a 0x21 data-by-local-id request.
const POSITIVE_SID: u8 = 0x61;

// ── Extraction helpers ──────────────────────────────────────────

/// Big-endian unsigned integer over `bytes[offset..offset + len]`.
pub fn be_uint(bytes: &[u8], offset: usize, len: usize) -> Option<u64> {
    let end = offset.checked_add(len)?;
    let slice = bytes.get(offset..end)?;
    Some(slice.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

/// Two's-complement sign correction at a `bits`-wide boundary.
pub fn to_signed(raw: u64, bits: u32) -> i64 {
    let sign_bit = 1u64 << (bits - 1);
    if raw & sign_bit != 0 {
        raw as i64 - (1i64 << bits)
    } else {
        raw as i64
    }
}

// ── Battery status (BMS, request 022101) ────────────────────────

/// Byte offsets of each battery channel within the assembled response.
struct BatteryLayout {
    soc: usize,
    current: usize,
    voltage: usize,
    min_temp: usize,
    max_temp: usize,
    aux_voltage: usize,
    charging: usize,
}

/// Original BMS firmware: channels directly after the SID/PID echo.
const LAYOUT_STANDARD: BatteryLayout = BatteryLayout {
    soc: 2,
    current: 3,
    voltage: 5,
    min_temp: 7,
    max_temp: 8,
    aux_voltage: 9,
    charging: 10,
};

/// Newer BMS firmware inserts two status bytes after the PID echo,
/// shifting every channel. Observed on responses longer than 41 bytes.
const LAYOUT_EXTENDED: BatteryLayout = BatteryLayout {
    soc: 4,
    current: 5,
    voltage: 7,
    min_temp: 9,
    max_temp: 10,
    aux_voltage: 11,
    charging: 12,
};

const EXTENDED_RESPONSE_MIN: usize = 42;

/// Decode the BMS pack status response.
pub fn decode_battery_status(bytes: &[u8]) -> FieldMap {
    let mut fields = FieldMap::new();
    if bytes.len() < 2 || bytes[0] != POSITIVE_SID {
        tracing::warn!(len = bytes.len(), "unexpected battery response prefix");
        return fields;
    }

    let layout = if bytes.len() >= EXTENDED_RESPONSE_MIN {
        &LAYOUT_EXTENDED
    } else {
        &LAYOUT_STANDARD
    };
    if bytes.len() <= layout.charging {
        tracing::warn!(len = bytes.len(), "battery response too short to decode");
        return fields;
    }

    if let Some(raw) = be_uint(bytes, layout.soc, 1) {
        fields.insert(
            "state_of_charge".into(),
            FieldValue::Integer(raw as i64 / 2),
        );
    }
    if let Some(raw) = be_uint(bytes, layout.current, 2) {
        let amps = to_signed(raw, 16) as f64 * 0.1;
        fields.insert("hv_battery_current".into(), FieldValue::Float(amps));
    }
    if let Some(raw) = be_uint(bytes, layout.voltage, 2) {
        fields.insert(
            "hv_battery_voltage".into(),
            FieldValue::Float(raw as f64 * 0.1),
        );
    }
    if let Some(raw) = be_uint(bytes, layout.min_temp, 1) {
        fields.insert(
            "battery_min_temp".into(),
            FieldValue::Float(raw as f64 / 2.0 - 40.0),
        );
    }
    if let Some(raw) = be_uint(bytes, layout.max_temp, 1) {
        fields.insert(
            "battery_max_temp".into(),
            FieldValue::Float(raw as f64 / 2.0 - 40.0),
        );
    }
    if let Some(raw) = be_uint(bytes, layout.aux_voltage, 1) {
        fields.insert(
            "aux_battery_voltage".into(),
            FieldValue::Float(raw as f64 * 0.08),
        );
    }
    if let Some(raw) = be_uint(bytes, layout.charging, 1) {
        fields.insert(
            "charging".into(),
            FieldValue::Integer(i64::from(raw != 0)),
        );
    }

    fields
}

// ── Vehicle status (VCU, request 022102) ────────────────────────

/// Decode the drivetrain status response (single frame).
pub fn decode_vehicle_status(bytes: &[u8]) -> FieldMap {
    let mut fields = FieldMap::new();
    if bytes.len() < 7 || bytes[0] != POSITIVE_SID {
        tracing::warn!(len = bytes.len(), "unexpected vehicle response prefix");
        return fields;
    }

    match gear_position(bytes[2]) {
        Some(gear) => {
            fields.insert("gear_position".into(), FieldValue::from(gear));
        }
        None => tracing::debug!(raw = bytes[2], "unknown gear position byte"),
    }
    fields.insert("vehicle_speed".into(), FieldValue::Integer(i64::from(bytes[3])));
    if let Some(odometer) = be_uint(bytes, 4, 3) {
        fields.insert("odometer".into(), FieldValue::Integer(odometer as i64));
    }

    fields
}

fn gear_position(raw: u8) -> Option<&'static str> {
    match raw {
        1 => Some("P"),
        2 => Some("R"),
        3 => Some("N"),
        4 => Some("D"),
        _ => None,
    }
}
