/// Record types for CareChain
use crate::blockchain::{canonical_json, current_timestamp};
use serde_json::{Map, Value};

/// Record kinds offered by the bundled clients. The ledger itself accepts any string.
pub const KNOWN_RECORD_TYPES: [&str; 3] = ["diagnosis", "prescription", "lab_result"];

/// One caller-submitted medical record awaiting (or holding) a place in a block.
///
/// `signature` is an opaque blob produced by the submitter. The ledger stores it
/// and hashes it but never verifies it.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MedicalRecord {
    pub patient_id: String,
    pub doctor_id: String,
    pub record_type: String,
    pub data: Value,
    pub timestamp: f64,
    #[serde(default)]
    pub signature: Option<String>,
    /// Fields carried by records that came from a peer and that this node does not model.
    /// They round-trip untouched so recomputed block hashes match the peer's.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MedicalRecord {
    pub fn new(
        patient_id: impl Into<String>,
        doctor_id: impl Into<String>,
        record_type: impl Into<String>,
        data: Value,
    ) -> Self {
        MedicalRecord {
            patient_id: patient_id.into(),
            doctor_id: doctor_id.into(),
            record_type: record_type.into(),
            data,
            timestamp: current_timestamp(),
            signature: None,
            extra: Map::new(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    /// The record as a JSON value, shaped exactly like its serde wire form.
    pub fn to_json_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("patient_id".to_string(), Value::from(self.patient_id.as_str()));
        map.insert("doctor_id".to_string(), Value::from(self.doctor_id.as_str()));
        map.insert("record_type".to_string(), Value::from(self.record_type.as_str()));
        map.insert("data".to_string(), self.data.clone());
        map.insert("timestamp".to_string(), Value::from(self.timestamp));
        let signature = match &self.signature {
            Some(signature) => Value::from(signature.as_str()),
            None => Value::Null,
        };
        map.insert("signature".to_string(), signature);
        for (key, value) in &self.extra {
            map.insert(key.clone(), value.clone());
        }
        Value::Object(map)
    }

    /// The bytes a submitter signs: the canonical JSON of every field except the signature.
    pub fn signable_message(&self) -> Vec<u8> {
        let mut unsigned = self.to_json_value();
        if let Value::Object(map) = &mut unsigned {
            map.insert("signature".to_string(), Value::Null);
        }
        canonical_json(&unsigned).into_bytes()
    }

    /// Short single-line description used by the CLI listing.
    pub fn summary(&self) -> String {
        let data = self.data.to_string();
        let data: String = data.chars().take(50).collect();
        format!(
            "{} - Patient: {} - Doctor: {} - Data: {}...",
            self.record_type, self.patient_id, self.doctor_id, data
        )
    }
}
