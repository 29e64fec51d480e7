//! Shared fixtures for the engine and scheduler integration tests.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use datasync::testing::{MemoryDocumentStore, MemoryRelationalStore};
use datasync::{ConflictStrategy, EngineSettings, SyncDirection, SyncEngine};
use std::sync::Arc;
use sync_core::{Record, SyncValue, TableMapping, DOCUMENT_KEY_FIELD};

pub type MemoryEngine = SyncEngine<MemoryRelationalStore, MemoryDocumentStore>;

pub struct Stores {
    pub relational: Arc<MemoryRelationalStore>,
    pub document: Arc<MemoryDocumentStore>,
}

impl Stores {
    /// Stores with a `users (id, name, updated_at)` table.
    pub fn with_users() -> Self {
        let stores = Self::empty();
        stores
            .relational
            .create_table("users", Some("id"), &["id", "name", "updated_at"]);
        stores
    }

    pub fn empty() -> Self {
        Self {
            relational: Arc::new(MemoryRelationalStore::new()),
            document: Arc::new(MemoryDocumentStore::new()),
        }
    }

    pub fn engine(
        &self,
        direction: SyncDirection,
        strategy: ConflictStrategy,
        mappings: Vec<TableMapping>,
    ) -> MemoryEngine {
        self.engine_with_batch(direction, strategy, mappings, 1000)
    }

    pub fn engine_with_batch(
        &self,
        direction: SyncDirection,
        strategy: ConflictStrategy,
        mappings: Vec<TableMapping>,
        batch_size: usize,
    ) -> MemoryEngine {
        SyncEngine::new(
            self.relational.clone(),
            self.document.clone(),
            EngineSettings {
                batch_size,
                direction,
                conflict_strategy: strategy,
            },
            mappings,
        )
    }

    /// Document for `id`, found by the reserved key field or the `id` field.
    pub fn user_document(&self, id: i64) -> Option<Record> {
        self.document
            .document("users", DOCUMENT_KEY_FIELD, id)
            .or_else(|| self.document.document("users", "id", id))
    }

    pub fn user_row(&self, id: i64) -> Option<Record> {
        self.relational.row("users", "id", id)
    }
}

pub fn users_mapping() -> Vec<TableMapping> {
    vec![TableMapping::new("users", "users", "id")]
}

pub fn ts(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
}

pub fn user(id: i64, name: &str, updated_at: Option<DateTime<Utc>>) -> Record {
    let mut row = Record::new();
    row.insert("id".into(), SyncValue::Int64(id));
    row.insert("name".into(), SyncValue::Text(name.into()));
    if let Some(at) = updated_at {
        row.insert("updated_at".into(), SyncValue::Timestamp(at));
    }
    row
}

/// A document as the engine would have exported it, minus the markers.
pub fn user_doc(id: i64, name: &str, updated_at: Option<DateTime<Utc>>) -> Record {
    let mut doc = Record::new();
    doc.insert(DOCUMENT_KEY_FIELD.into(), SyncValue::Int64(id));
    doc.insert("name".into(), SyncValue::Text(name.into()));
    if let Some(at) = updated_at {
        doc.insert("updated_at".into(), SyncValue::Timestamp(at));
    }
    doc
}

pub fn text(record: &Record, field: &str) -> Option<String> {
    record.get(field).and_then(|v| v.as_str()).map(str::to_string)
}
