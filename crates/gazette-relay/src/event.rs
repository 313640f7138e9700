//! Change events decoded from commit notifications.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RelayError;

/// The kind of write that produced a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    /// A row was inserted.
    Insert,
    /// A row was updated.
    Update,
}

impl Operation {
    /// Wire name, as produced by the trigger's `TG_OP`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Insert => "INSERT",
            Operation::Update => "UPDATE",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One committed write on the watched table.
///
/// The serialized form is the flat notification object:
/// `{"operation": "INSERT", "id": 1, "title": "...", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Write kind.
    pub operation: Operation,
    /// The full post-write row, keyed by column name.
    #[serde(flatten)]
    pub record: Map<String, Value>,
}

impl ChangeEvent {
    /// Create an event from an operation and a row.
    pub fn new(operation: Operation, record: Map<String, Value>) -> Self {
        Self { operation, record }
    }

    /// Build an event from any serializable row.
    ///
    /// The row must serialize to a JSON object.
    pub fn from_row<T: Serialize>(operation: Operation, row: &T) -> Result<Self, RelayError> {
        match serde_json::to_value(row)? {
            Value::Object(record) => Ok(Self::new(operation, record)),
            other => Err(RelayError::MalformedEvent(format!(
                "row must be an object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Decode a raw notification payload.
    pub fn decode(payload: &str) -> Result<Self, RelayError> {
        let value: Value = serde_json::from_str(payload)?;
        if !value.is_object() {
            return Err(RelayError::MalformedEvent(format!(
                "expected an object, got {}",
                json_kind(&value)
            )));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Encode the event as the JSON body sent to stream clients.
    pub fn to_json(&self) -> Result<String, RelayError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Look up a column of the row.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.record.get(name)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
