//! Telemetry reading types shared between the agent, sink, and publisher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fields::{FieldMap, FieldValue, unit_for};

/// One decoded channel sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reading {
    /// Channel name (e.g., "state_of_charge", "gear_position").
    pub field: String,
    /// Decoded value.
    pub value: FieldValue,
    /// Unit of measurement, when the channel has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// When the sample was collected.
    pub collected_at: DateTime<Utc>,
    /// Collection session the sample belongs to.
    pub session_id: Uuid,
}

/// All readings from one collection cycle, published as a single payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingBatch {
    pub readings: Vec<Reading>,
    pub session_id: Uuid,
    pub collected_at: DateTime<Utc>,
}

impl ReadingBatch {
    /// Build a batch from merged command output, stamping every reading
    /// with the session id and collection time.
    pub fn from_fields(fields: FieldMap, session_id: Uuid, collected_at: DateTime<Utc>) -> Self {
        let readings = fields
            .into_iter()
            .map(|(field, value)| {
                let unit = unit_for(&field).map(str::to_string);
                Reading {
                    field,
                    value,
                    unit,
                    collected_at,
                    session_id,
                }
            })
            .collect();
        Self {
            readings,
            session_id,
            collected_at,
        }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.readings
            .iter()
            .find(|r| r.field == field)
            .map(|r| &r.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_stamps_session_and_units() {
        let mut fields = FieldMap::new();
        fields.insert("state_of_charge".into(), FieldValue::Integer(86));
        fields.insert("gear_position".into(), FieldValue::Text("D".into()));

        let session = Uuid::now_v7();
        let batch = ReadingBatch::from_fields(fields, session, Utc::now());

        assert_eq!(batch.readings.len(), 2);
        assert!(batch.readings.iter().all(|r| r.session_id == session));

        let soc = batch
            .readings
            .iter()
            .find(|r| r.field == "state_of_charge")
            .unwrap();
        assert_eq!(soc.unit.as_deref(), Some("%"));
        assert_eq!(soc.value, FieldValue::Integer(86));

        let gear = batch
            .readings
            .iter()
            .find(|r| r.field == "gear_position")
            .unwrap();
        assert!(gear.unit.is_none());
    }

    #[test]
    fn reading_roundtrip() {
        let reading = Reading {
            field: "hv_battery_voltage".into(),
            value: FieldValue::Float(365.5),
            unit: Some("V".into()),
            collected_at: Utc::now(),
            session_id: Uuid::now_v7(),
        };
        let json = serde_json::to_string(&reading).unwrap();
        let back: Reading = serde_json::from_str(&json).unwrap();
        assert_eq!(back.field, "hv_battery_voltage");
        assert_eq!(back.value, FieldValue::Float(365.5));
    }
}
