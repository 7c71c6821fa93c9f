//! The record type flowing between pipeline stages.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Canonical field name of the deduplication identity.
pub const SOURCE_RECORD_ID: &str = "source_record_id";

/// Camel-case spelling accepted on input.
const SOURCE_RECORD_ID_CAMEL: &str = "sourceRecordId";

/// A single business record.
///
/// The identity used for deduplication is typed; every other field lives in an
/// open map so domain-specific payloads pass through untouched. Records are
/// never mutated by stages: annotation produces a new record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct Record {
    source_record_id: Option<String>,
    fields: Map<String, Value>,
}

impl Record {
    /// Creates a record with the given identity and no business fields.
    #[must_use]
    pub fn new(source_record_id: impl Into<String>) -> Self {
        Self {
            source_record_id: Some(source_record_id.into()),
            fields: Map::new(),
        }
    }

    /// Creates a record without a `source_record_id`.
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            source_record_id: None,
            fields: Map::new(),
        }
    }

    /// Returns a copy of this record with `key` set to `value`.
    ///
    /// Setting the identity follows the parsing rules: strings and numbers
    /// replace it and `null` clears it. Any other value leaves it unchanged.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        let value: Value = value.into();
        if key == SOURCE_RECORD_ID || key == SOURCE_RECORD_ID_CAMEL {
            match value {
                Value::String(id) => self.source_record_id = Some(id),
                Value::Number(id) => self.source_record_id = Some(id.to_string()),
                Value::Null => self.source_record_id = None,
                _ => {}
            }
        } else {
            self.fields.insert(key, value);
        }
        self
    }

    /// Returns the deduplication identity, if present.
    #[must_use]
    pub fn source_record_id(&self) -> Option<&str> {
        self.source_record_id.as_deref()
    }

    /// Returns a business field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Returns all business fields.
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Label used in generated record ids.
    #[must_use]
    pub fn id_label(&self) -> &str {
        self.source_record_id.as_deref().unwrap_or("unknown")
    }

    /// Converts the record into a JSON object.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.clone().into())
    }
}

impl TryFrom<Map<String, Value>> for Record {
    type Error = String;

    fn try_from(mut fields: Map<String, Value>) -> Result<Self, Self::Error> {
        let raw_id = match fields.remove(SOURCE_RECORD_ID) {
            Some(value) => {
                fields.remove(SOURCE_RECORD_ID_CAMEL);
                Some(value)
            }
            None => fields.remove(SOURCE_RECORD_ID_CAMEL),
        };

        let source_record_id = match raw_id {
            None | Some(Value::Null) => None,
            Some(Value::String(id)) => Some(id),
            Some(Value::Number(id)) => Some(id.to_string()),
            Some(other) => {
                return Err(format!(
                    "{SOURCE_RECORD_ID} must be a string or number, got {other}"
                ))
            }
        };

        Ok(Self {
            source_record_id,
            fields,
        })
    }
}

impl From<Record> for Map<String, Value> {
    fn from(record: Record) -> Self {
        let mut map = Map::with_capacity(record.fields.len() + 1);
        map.insert(
            SOURCE_RECORD_ID.to_string(),
            record.source_record_id.map_or(Value::Null, Value::String),
        );
        map.extend(record.fields);
        map
    }
}
