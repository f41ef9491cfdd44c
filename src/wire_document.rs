//! Shapes a collection document can take on the wire.
//!
//! The remote store does not guarantee a single representation: a list may be
//! stored as an array, as an object keyed by push ids, or be missing entirely.
//! [`WireDocument`] resolves that once so the normalizer never probes shapes.

use log::warn;
use serde_json::{Map, Value as JsonValue};

#[derive(Debug, Clone, PartialEq)]
pub enum WireDocument {
    Absent,
    Sequence(Vec<JsonValue>),
    KeyedMap(Map<String, JsonValue>),
}

impl WireDocument {
    /// Classifies a raw document. Scalars are not a valid collection shape
    /// and degrade to [`WireDocument::Absent`].
    pub fn from_raw(raw: Option<JsonValue>) -> Self {
        match raw {
            None | Some(JsonValue::Null) => WireDocument::Absent,
            Some(JsonValue::Array(items)) => WireDocument::Sequence(items),
            Some(JsonValue::Object(entries)) => WireDocument::KeyedMap(entries),
            Some(other) => {
                warn!("Ignoring malformed collection document: {}", scalar_kind(&other));
                WireDocument::Absent
            }
        }
    }

    /// Entries in store order. Keyed maps yield their values in enumeration order.
    pub fn into_entries(self) -> Vec<JsonValue> {
        match self {
            WireDocument::Absent => Vec::new(),
            WireDocument::Sequence(items) => items,
            WireDocument::KeyedMap(entries) => entries.into_iter().map(|(_, value)| value).collect(),
        }
    }
}

impl From<JsonValue> for WireDocument {
    fn from(value: JsonValue) -> Self {
        WireDocument::from_raw(Some(value))
    }
}

fn scalar_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Null => "null",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
