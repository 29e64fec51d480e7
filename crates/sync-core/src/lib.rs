//! Core types for the datasync framework.
//!
//! This crate provides the foundational types shared by the store adapters
//! and the sync engine:
//!
//! - [`SyncValue`] - Closed value type that every field is represented as
//! - [`Record`] - Ordered field-name to value map (one row or one document)
//! - [`RecordKey`] / [`SyncRecord`] - Join key and a keyed record observed from one side
//! - [`TableMapping`] - One relational table paired with one document collection
//! - [`SyncStats`] - Per-mapping counters for one sync cycle
//! - [`RecordStore`], [`RelationalStore`], [`DocumentStore`] - The adapter contract
//!
//! # Architecture
//!
//! ```text
//! sync-core (this crate)
//!    │
//!    ├─── postgresql-types     (Row <-> Record, SyncValue -> ToSql)
//!    ├─── mongodb-types        (Document <-> Record)
//!    │
//!    ├─── datasync-postgresql  (implements RelationalStore)
//!    ├─── datasync-mongodb     (implements DocumentStore)
//!    │
//!    └─── datasync             (converter, resolver, engine, scheduler)
//! ```

pub mod error;
pub mod mapping;
pub mod record;
pub mod stats;
pub mod traits;
pub mod values;

pub use error::{RecordError, RecordErrorKind, StoreError};
pub use mapping::{TableMapping, DEFAULT_PRIMARY_KEY};
pub use record::{
    find_timestamp, Origin, RecordKey, SyncRecord, DOCUMENT_KEY_FIELD, NATIVE_ID_FIELD,
    SYNC_ORIGIN_FIELD, SYNC_TIMESTAMP_FIELD, TIMESTAMP_FIELDS,
};
pub use stats::SyncStats;
pub use traits::{DocumentStore, RecordStore, RelationalStore};
pub use values::{Record, SyncValue};
