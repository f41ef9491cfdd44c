//! Wire document to canonical record sequence.

use serde_json::{json, Map, Value as JsonValue};

use crate::collection_kind::CollectionKind;
use crate::sync_model::Record;
use crate::wire_document::WireDocument;

/// Sequence fields of a user record that may arrive as keyed maps or be missing.
const USER_SEQUENCE_FIELDS: [&str; 4] = ["notifications", "messages", "trainingDays", "savedVouchers"];

/// Resolves the wire shape and backfills per-kind defaults.
///
/// Idempotent: normalizing the output again yields the same sequence.
pub fn normalize(kind: CollectionKind, document: WireDocument) -> Vec<Record> {
    document
        .into_entries()
        .into_iter()
        .map(|entry| {
            let mut record = Record::new(entry);
            backfill(kind, &mut record);
            record
        })
        .collect()
}

/// Convenience wrapper over [`normalize`] for a raw, possibly missing document.
pub fn normalize_raw(kind: CollectionKind, raw: Option<JsonValue>) -> Vec<Record> {
    normalize(kind, WireDocument::from_raw(raw))
}

fn backfill(kind: CollectionKind, record: &mut Record) {
    if kind == CollectionKind::Users {
        if let Some(fields) = record.as_object_mut() {
            backfill_user(fields);
        }
    }
}

fn backfill_user(fields: &mut Map<String, JsonValue>) {
    for name in USER_SEQUENCE_FIELDS {
        match fields.get_mut(name) {
            Some(value) => *value = as_sequence(value.take()),
            None => {
                fields.insert(name.to_string(), JsonValue::Array(Vec::new()));
            }
        }
    }

    if fields.get("settings").map_or(true, JsonValue::is_null) {
        fields.insert("settings".to_string(), json!({"popupNotification": true}));
    }

    let status_missing = match fields.get("accountStatus") {
        None | Some(JsonValue::Null) => true,
        Some(JsonValue::String(status)) => status.is_empty(),
        Some(_) => false,
    };
    if status_missing {
        fields.insert("accountStatus".to_string(), json!("Pending"));
    }
}

// Other scalars are left for the caller to deal with.
fn as_sequence(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Null => JsonValue::Array(Vec::new()),
        JsonValue::Object(entries) => {
            JsonValue::Array(entries.into_iter().map(|(_, item)| item).collect())
        }
        other => other,
    }
}
