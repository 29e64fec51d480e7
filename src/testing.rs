//! Test infrastructure
//!
//! In-memory stores that behave like the real adapters closely enough to
//! drive the engine end to end without a database, plus counters and
//! failure injection for asserting on paging and error handling.

pub mod memory;

pub use memory::{MemoryDocumentStore, MemoryRelationalStore};

use sync_core::{Record, SyncValue};

/// Build a record from `(field, value)` pairs.
pub fn record<V: Into<SyncValue> + Clone>(fields: &[(&str, V)]) -> Record {
    fields
        .iter()
        .map(|(field, value)| (field.to_string(), value.clone().into()))
        .collect()
}
