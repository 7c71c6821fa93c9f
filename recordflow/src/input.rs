//! Loading input records.
//!
//! Input is a JSON array of objects. Each object becomes a [`Record`]; its
//! `source_record_id` (or `sourceRecordId`) may be a string, a number, null,
//! or absent.

use std::path::Path;

use serde_json::Value;

use crate::core::Record;
use crate::errors::InputError;

/// Parses a JSON array of record objects.
pub fn parse_records(text: &str) -> Result<Vec<Record>, InputError> {
    let document: Value =
        serde_json::from_str(text).map_err(|e| InputError::Parse(e.to_string()))?;

    let Value::Array(items) = document else {
        return Err(InputError::Parse(format!(
            "expected a JSON array of records, got {}",
            type_name(&document)
        )));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            if !item.is_object() {
                return Err(InputError::Parse(format!(
                    "record {index} must be an object, got {}",
                    type_name(&item)
                )));
            }
            serde_json::from_value(item)
                .map_err(|e| InputError::Parse(format!("record {index}: {e}")))
        })
        .collect()
}

/// Reads and parses a records file.
pub fn load_records(path: impl AsRef<Path>) -> Result<Vec<Record>, InputError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| InputError::Read {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let records = parse_records(&text)?;
    tracing::debug!(path = %path.display(), records = records.len(), "Loaded input records");
    Ok(records)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
