//! Error types shared by the stores and the engine.

use crate::record::RecordKey;
use std::fmt;
use thiserror::Error;

/// Failure reported by a store adapter.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached (refused connection, timeout, auth).
    #[error("connection error: {0}")]
    Connection(String),

    /// A query or write was rejected by the store.
    #[error("query error: {0}")]
    Query(String),

    /// A value could not be converted to or from the store's native form.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// The named table or collection does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

impl StoreError {
    /// Whether retrying the same operation could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Connection(_))
    }
}

/// What went wrong for a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordErrorKind {
    Conversion,
    Apply,
    MissingKey,
}

impl fmt::Display for RecordErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecordErrorKind::Conversion => "conversion",
            RecordErrorKind::Apply => "apply",
            RecordErrorKind::MissingKey => "missing key",
        };
        f.write_str(s)
    }
}

/// A per-record failure. Recorded in the mapping's statistics; never aborts the cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordError {
    pub key: Option<RecordKey>,
    pub kind: RecordErrorKind,
    pub message: String,
}

impl RecordError {
    pub fn new(key: Option<RecordKey>, kind: RecordErrorKind, message: impl Into<String>) -> Self {
        Self {
            key,
            kind,
            message: message.into(),
        }
    }

    pub fn apply(key: &RecordKey, err: &StoreError) -> Self {
        let kind = match err {
            StoreError::Conversion(_) => RecordErrorKind::Conversion,
            _ => RecordErrorKind::Apply,
        };
        Self::new(Some(key.clone()), kind, err.to_string())
    }
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "record {key}: {} error: {}", self.kind, self.message),
            None => write!(f, "{} error: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for RecordError {}
