/// Boundary validation for record submissions, kept apart from the record type itself.
use crate::error::ChainError;
use crate::record::types::MedicalRecord;
use serde_json::Value;

pub const REQUIRED_FIELDS: [&str; 4] = ["patient_id", "doctor_id", "record_type", "data"];

/// Builds a record from an untrusted JSON submission.
///
/// Every required field must be present; the identifier fields must be strings.
/// `signature` and `timestamp` are optional. A missing timestamp is filled with
/// the current time.
pub fn record_from_submission(values: &Value) -> Result<MedicalRecord, ChainError> {
    let object = values
        .as_object()
        .ok_or_else(|| ChainError::InvalidRecord("Missing required fields".to_string()))?;

    if !REQUIRED_FIELDS.iter().all(|k| object.contains_key(*k)) {
        return Err(ChainError::InvalidRecord("Missing required fields".to_string()));
    }

    let text_field = |name: &str| -> Result<String, ChainError> {
        object[name]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ChainError::InvalidRecord(format!("Field '{}' must be a string", name)))
    };

    let mut record = MedicalRecord::new(
        text_field("patient_id")?,
        text_field("doctor_id")?,
        text_field("record_type")?,
        object["data"].clone(),
    );

    match object.get("signature") {
        None | Some(Value::Null) => {}
        Some(Value::String(sig)) => record = record.with_signature(sig.clone()),
        Some(_) => {
            return Err(ChainError::InvalidRecord(
                "Field 'signature' must be a string".to_string(),
            ))
        }
    }

    match object.get("timestamp") {
        None | Some(Value::Null) => {}
        Some(ts) => {
            let ts = ts.as_f64().ok_or_else(|| {
                ChainError::InvalidRecord("Field 'timestamp' must be a number".to_string())
            })?;
            record = record.with_timestamp(ts);
        }
    }

    Ok(record)
}
