//! Decoded field values and the field map handed to sinks and publishers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single decoded channel value.
///
/// Commands decode into typed values; the string-keyed map below only
/// becomes untyped JSON at the publish/persist boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view of the value, widening integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v),
            FieldValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

/// Decoded output of one command: field name → value.
///
/// `BTreeMap` keeps iteration deterministic for publishing and tests.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// Unit of measurement for a known field name.
pub fn unit_for(field: &str) -> Option<&'static str> {
    match field {
        "state_of_charge" => Some("%"),
        "hv_battery_voltage" | "aux_battery_voltage" => Some("V"),
        "hv_battery_current" => Some("A"),
        "battery_min_temp" | "battery_max_temp" => Some("°C"),
        "vehicle_speed" => Some("km/h"),
        "odometer" => Some("km"),
        _ => None,
    }
}
