//! Value representations shared by both stores.
//!
//! Every field read from either store is converted into a [`SyncValue`] at
//! the adapter boundary, so conversion and comparison logic in the engine
//! can match exhaustively instead of inspecting dynamically-typed values.

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single record (row or document) keyed by field name.
///
/// `BTreeMap` keeps iteration and equality independent of the order in
/// which a store happened to return the fields.
pub type Record = BTreeMap<String, SyncValue>;

/// Closed set of values that can cross between the two stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SyncValue {
    /// SQL NULL / BSON null
    Null,

    /// Boolean value
    Bool(bool),

    /// All integer widths are widened to 64 bits
    Int64(i64),

    /// All floating point widths are widened to 64 bits
    Float64(f64),

    /// String value
    Text(String),

    /// Binary data (`bytea` / BSON binary)
    Bytes(Vec<u8>),

    /// Instant in time, always normalized to UTC
    Timestamp(DateTime<Utc>),

    /// Fixed-precision numeric as read from the relational store.
    ///
    /// The document side has no exact equivalent; see [`SyncValue::to_document_numeric`].
    Decimal(Decimal),

    /// Structured value (`json`/`jsonb` columns, nested sub-documents and arrays)
    Json(serde_json::Value),
}

impl SyncValue {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Try to get this value as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get this value as an i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int64(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get this value as an f64. Integers and decimals are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float64(f) => Some(*f),
            Self::Int64(i) => Some(*i as f64),
            Self::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }

    /// Try to get this value as a string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get this value as a timestamp.
    ///
    /// RFC 3339 strings are accepted as well, since documents written by
    /// other tools frequently carry timestamps as text.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(ts) => Some(*ts),
            Self::Text(s) => DateTime::parse_from_rfc3339(s.trim())
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            _ => None,
        }
    }

    /// Short type name used in log and error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int64(_) => "int64",
            Self::Float64(_) => "float64",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Timestamp(_) => "timestamp",
            Self::Decimal(_) => "decimal",
            Self::Json(_) => "json",
        }
    }

    /// Coerce a decimal into the binary64 form the document store can hold.
    ///
    /// This is lossy by nature. Returns `None` when the decimal has no f64
    /// representation at all; every other value is returned unchanged.
    pub fn to_document_numeric(&self) -> Option<SyncValue> {
        match self {
            Self::Decimal(d) => d.to_f64().map(SyncValue::Float64),
            other => Some(other.clone()),
        }
    }

    /// Normalized form used when deciding whether two versions of a record
    /// hold the same data.
    ///
    /// Decimals compare as f64 and timestamps are truncated to millisecond
    /// precision, which is the resolution of the document store.
    pub fn normalized(&self) -> SyncValue {
        match self {
            Self::Decimal(d) => d
                .to_f64()
                .map(SyncValue::Float64)
                .unwrap_or_else(|| SyncValue::Text(d.to_string())),
            Self::Timestamp(ts) => SyncValue::Timestamp(
                ts.duration_trunc(TimeDelta::milliseconds(1))
                    .unwrap_or(*ts),
            ),
            other => other.clone(),
        }
    }
}

impl fmt::Display for SyncValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int64(i) => write!(f, "{i}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Self::Timestamp(ts) => f.write_str(&ts.to_rfc3339()),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for SyncValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for SyncValue {
    fn from(i: i64) -> Self {
        Self::Int64(i)
    }
}

impl From<i32> for SyncValue {
    fn from(i: i32) -> Self {
        Self::Int64(i as i64)
    }
}

impl From<f64> for SyncValue {
    fn from(f: f64) -> Self {
        Self::Float64(f)
    }
}

impl From<&str> for SyncValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for SyncValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<DateTime<Utc>> for SyncValue {
    fn from(ts: DateTime<Utc>) -> Self {
        Self::Timestamp(ts)
    }
}

impl From<Decimal> for SyncValue {
    fn from(d: Decimal) -> Self {
        Self::Decimal(d)
    }
}

impl From<Vec<u8>> for SyncValue {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl<T: Into<SyncValue>> From<Option<T>> for SyncValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SyncValue::Null)
    }
}
