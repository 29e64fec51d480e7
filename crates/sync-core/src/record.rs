//! Keyed records and the reserved field names both sides agree on.

use crate::values::{Record, SyncValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Native identifier field of the document store. Never written by the engine.
pub const NATIVE_ID_FIELD: &str = "_id";

/// Reserved document field holding the relational primary key value.
pub const DOCUMENT_KEY_FIELD: &str = "_pg_id";

/// Synchronization-origin marker stamped on every engine write to the document side.
pub const SYNC_ORIGIN_FIELD: &str = "_sync_origin";

/// Synchronization timestamp stamped on every engine write to the document side.
pub const SYNC_TIMESTAMP_FIELD: &str = "_sync_updated_at";

/// Conventional "last modified" field names, in lookup order.
///
/// The sync metadata field comes last so a timestamp the application
/// maintains always takes precedence over the engine's own stamp.
pub const TIMESTAMP_FIELDS: [&str; 5] = [
    "updated_at",
    "updatedAt",
    "modified_at",
    "modifiedAt",
    SYNC_TIMESTAMP_FIELD,
];

/// Which store a record was observed in (or written from).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Relational,
    Document,
}

impl Origin {
    /// Value written into [`SYNC_ORIGIN_FIELD`].
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Relational => "relational",
            Origin::Document => "document",
        }
    }

    /// Parse a marker value previously written by [`Origin::as_str`].
    pub fn from_marker(value: &SyncValue) -> Option<Origin> {
        match value.as_str() {
            Some("relational") => Some(Origin::Relational),
            Some("document") => Some(Origin::Document),
            _ => None,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Primary-key value used to join the two stores.
///
/// Only integer and text keys are supported; both are totally ordered so a
/// key set can be walked deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordKey {
    Int(i64),
    Text(String),
}

impl RecordKey {
    /// Extract a key from a field value. Returns `None` for null and for
    /// value types that cannot serve as a join key.
    pub fn from_value(value: &SyncValue) -> Option<RecordKey> {
        match value {
            SyncValue::Int64(i) => Some(RecordKey::Int(*i)),
            SyncValue::Text(s) => Some(RecordKey::Text(s.clone())),
            _ => None,
        }
    }

    /// Look up `field` in `record` and extract it as a key.
    pub fn from_record(record: &Record, field: &str) -> Option<RecordKey> {
        record.get(field).and_then(RecordKey::from_value)
    }

    /// The key as a field value, for point lookups and writes.
    pub fn to_value(&self) -> SyncValue {
        match self {
            RecordKey::Int(i) => SyncValue::Int64(*i),
            RecordKey::Text(s) => SyncValue::Text(s.clone()),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Int(i) => write!(f, "{i}"),
            RecordKey::Text(s) => f.write_str(s),
        }
    }
}

/// Best-effort "last modified" timestamp of a record.
///
/// Returns the first of [`TIMESTAMP_FIELDS`] that is present and holds a
/// timestamp (or an RFC 3339 string).
pub fn find_timestamp(record: &Record) -> Option<DateTime<Utc>> {
    TIMESTAMP_FIELDS
        .iter()
        .filter_map(|field| record.get(*field))
        .find_map(SyncValue::as_timestamp)
}

/// A single entity's state as observed from one side.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRecord {
    pub key: RecordKey,
    pub payload: Record,
    pub updated_at: Option<DateTime<Utc>>,
    pub origin: Origin,
}

impl SyncRecord {
    /// Build a record, looking up `updated_at` from the payload.
    pub fn new(key: RecordKey, payload: Record, origin: Origin) -> Self {
        let updated_at = find_timestamp(&payload);
        Self {
            key,
            payload,
            updated_at,
            origin,
        }
    }
}
