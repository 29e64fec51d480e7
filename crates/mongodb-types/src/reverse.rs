//! Reverse conversion: BSON value → SyncValue.

use bson::{Bson, Document};
use chrono::DateTime;
use std::str::FromStr;
use sync_core::{Record, SyncValue};

/// Convert a BSON document into a [`Record`].
///
/// The native `_id` is kept; callers decide whether it is meaningful.
pub fn document_to_record(doc: &Document) -> Record {
    doc.iter()
        .map(|(key, value)| (key.clone(), bson_to_sync_value(value)))
        .collect()
}

/// Convert a single BSON value.
///
/// Embedded documents and arrays become JSON; everything MongoDB-specific
/// without a counterpart is carried as text.
pub fn bson_to_sync_value(value: &Bson) -> SyncValue {
    match value {
        Bson::Null | Bson::Undefined => SyncValue::Null,
        Bson::Boolean(b) => SyncValue::Bool(*b),
        Bson::Int32(i) => SyncValue::Int64(i64::from(*i)),
        Bson::Int64(i) => SyncValue::Int64(*i),
        Bson::Double(f) => SyncValue::Float64(*f),
        Bson::String(s) => SyncValue::Text(s.clone()),
        Bson::Decimal128(d) => {
            let s = d.to_string();
            match f64::from_str(&s) {
                Ok(f) => SyncValue::Float64(f),
                Err(_) => SyncValue::Text(s),
            }
        }
        Bson::Binary(bin) => {
            if bin.subtype == bson::spec::BinarySubtype::Uuid
                || bin.subtype == bson::spec::BinarySubtype::UuidOld
            {
                if let Ok(uuid) = uuid::Uuid::from_slice(&bin.bytes) {
                    return SyncValue::Text(uuid.to_string());
                }
            }
            SyncValue::Bytes(bin.bytes.clone())
        }
        Bson::DateTime(dt) => SyncValue::Timestamp(dt.to_chrono()),
        Bson::Timestamp(ts) => match DateTime::from_timestamp(ts.time as i64, 0) {
            Some(dt) => SyncValue::Timestamp(dt),
            None => SyncValue::Null,
        },
        Bson::ObjectId(oid) => SyncValue::Text(oid.to_hex()),
        Bson::Array(_) | Bson::Document(_) => SyncValue::Json(bson_to_json(value)),
        Bson::RegularExpression(regex) => {
            SyncValue::Text(format!("/{}/{}", regex.pattern, regex.options))
        }
        Bson::JavaScriptCode(code) => SyncValue::Text(code.clone()),
        Bson::JavaScriptCodeWithScope(code_scope) => SyncValue::Text(code_scope.code.clone()),
        Bson::Symbol(s) => SyncValue::Text(s.clone()),
        Bson::MinKey => SyncValue::Text("$minKey".to_string()),
        Bson::MaxKey => SyncValue::Text("$maxKey".to_string()),
        Bson::DbPointer(_) => SyncValue::Null,
    }
}

/// Convert a BSON value into plain JSON.
///
/// Dates become RFC 3339 strings and object ids their hex form, so the
/// result can be stored in a JSON column as-is.
pub fn bson_to_json(value: &Bson) -> serde_json::Value {
    match value {
        Bson::Document(doc) => serde_json::Value::Object(
            doc.iter()
                .map(|(k, v)| (k.clone(), bson_to_json(v)))
                .collect(),
        ),
        Bson::Array(items) => serde_json::Value::Array(items.iter().map(bson_to_json).collect()),
        Bson::DateTime(dt) => serde_json::Value::String(dt.to_chrono().to_rfc3339()),
        Bson::Binary(bin) => serde_json::Value::Array(
            bin.bytes
                .iter()
                .map(|b| serde_json::Value::from(*b))
                .collect(),
        ),
        other => match bson_to_sync_value(other) {
            SyncValue::Null => serde_json::Value::Null,
            SyncValue::Bool(b) => serde_json::Value::Bool(b),
            SyncValue::Int64(i) => serde_json::Value::from(i),
            SyncValue::Float64(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            SyncValue::Timestamp(dt) => serde_json::Value::String(dt.to_rfc3339()),
            SyncValue::Json(j) => j,
            scalar => serde_json::Value::String(scalar.to_string()),
        },
    }
}
