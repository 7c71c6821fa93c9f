//! Envelopes posted to the downstream services.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::Record;

/// Envelope status for records accepted by ingestion.
pub const INGESTED: &str = "INGESTED";
/// Envelope status for deduplication survivors.
pub const DEDUPLICATED: &str = "DEDUPLICATED";

/// The wire body of one record submission.
///
/// `dataPayload` is the record serialized as a JSON string, which is what the
/// services persist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEnvelope {
    /// `<prefix>-<source id>-<position:03>`, with positions counted from 1.
    pub record_id: String,
    /// Lifecycle label such as `INGESTED`.
    pub status: String,
    /// The record as a JSON string.
    pub data_payload: String,
}

impl RecordEnvelope {
    /// Wraps `record`, merging `extra` fields into its data.
    ///
    /// `index` is the record's zero-based position in the batch.
    #[must_use]
    pub fn new(
        prefix: &str,
        index: usize,
        status: &str,
        record: &Record,
        extra: &[(&str, Value)],
    ) -> Self {
        let mut data = record.to_value();
        if let Value::Object(map) = &mut data {
            for (key, value) in extra {
                map.insert((*key).to_string(), value.clone());
            }
        }

        Self {
            record_id: format!("{prefix}-{}-{:03}", record.id_label(), index + 1),
            status: status.to_string(),
            data_payload: data.to_string(),
        }
    }

    /// Returns the wire form posted to the gateway.
    #[must_use]
    pub fn to_value(&self) -> Value {
        json!({
            "recordId": self.record_id,
            "status": self.status,
            "dataPayload": self.data_payload,
        })
    }

    /// Decodes `dataPayload` back into JSON.
    pub fn data(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_str(&self.data_payload)
    }
}
