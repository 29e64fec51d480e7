//! In-memory [`RelationalStore`] and [`DocumentStore`] implementations.
//!
//! The relational store mimics a table: writes to unknown columns fail,
//! inserted rows get null for columns they do not carry, and a missing table
//! is [`StoreError::NotFound`]. The document store mimics a collection: the
//! store assigns `_id` on insert and a missing collection is simply empty.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use sync_core::{
    DocumentStore, Origin, Record, RecordKey, RecordStore, RelationalStore, StoreError, SyncValue,
    NATIVE_ID_FIELD,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn matches_key(record: &Record, key_field: &str, key: &SyncValue) -> bool {
    record
        .get(key_field)
        .is_some_and(|value| value.normalized() == key.normalized())
}

fn sorted_page(records: &[Record], order_key: &str, limit: usize, offset: u64) -> Vec<Record> {
    let mut ordered: Vec<(Option<RecordKey>, &Record)> = records
        .iter()
        .map(|r| (RecordKey::from_record(r, order_key), r))
        .collect();
    ordered.sort_by(|a, b| a.0.cmp(&b.0));
    ordered
        .into_iter()
        .skip(offset as usize)
        .take(limit)
        .map(|(_, r)| r.clone())
        .collect()
}

/// Shared counters and failure switches.
#[derive(Default)]
struct Instrumentation {
    page_fetches: AtomicUsize,
    upserts: AtomicUsize,
    listing_failures: AtomicUsize,
    unavailable: std::sync::atomic::AtomicBool,
    failing_keys: Mutex<HashSet<RecordKey>>,
}

impl Instrumentation {
    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("store unavailable".into()));
        }
        Ok(())
    }

    fn check_listing(&self) -> Result<(), StoreError> {
        self.check_available()?;
        let remaining = self.listing_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.listing_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Connection("listing failed".into()));
        }
        Ok(())
    }

    fn check_upsert(&self, record: &Record, key_field: &str) -> Result<(), StoreError> {
        self.check_available()?;
        self.upserts.fetch_add(1, Ordering::SeqCst);
        if let Some(key) = RecordKey::from_record(record, key_field) {
            if lock(&self.failing_keys).contains(&key) {
                return Err(StoreError::Query(format!("write rejected for key {key}")));
            }
        }
        Ok(())
    }
}

struct MemoryTable {
    primary_key: Option<String>,
    columns: Vec<String>,
    rows: Vec<Record>,
}

/// Relational store held in memory.
#[derive(Default)]
pub struct MemoryRelationalStore {
    tables: Mutex<BTreeMap<String, MemoryTable>>,
    instrumentation: Instrumentation,
}

impl MemoryRelationalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) an empty table.
    pub fn create_table(&self, name: &str, primary_key: Option<&str>, columns: &[&str]) {
        lock(&self.tables).insert(
            name.to_string(),
            MemoryTable {
                primary_key: primary_key.map(str::to_string),
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows: Vec::new(),
            },
        );
    }

    /// Insert a row directly, bypassing counters. Missing columns become null.
    pub fn insert_row(&self, table: &str, row: Record) {
        let mut tables = lock(&self.tables);
        if let Some(table) = tables.get_mut(table) {
            let mut full: Record = table
                .columns
                .iter()
                .map(|c| (c.clone(), SyncValue::Null))
                .collect();
            full.extend(row);
            table.rows.push(full);
        }
    }

    /// All rows of `table`, in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Record> {
        lock(&self.tables)
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// The row whose `key_field` equals `key`.
    pub fn row(&self, table: &str, key_field: &str, key: impl Into<SyncValue>) -> Option<Record> {
        let key = key.into();
        lock(&self.tables)
            .get(table)
            .and_then(|t| t.rows.iter().find(|r| matches_key(r, key_field, &key)).cloned())
    }

    pub fn page_fetches(&self) -> usize {
        self.instrumentation.page_fetches.load(Ordering::SeqCst)
    }

    pub fn upsert_calls(&self) -> usize {
        self.instrumentation.upserts.load(Ordering::SeqCst)
    }

    pub fn reset_counters(&self) {
        self.instrumentation.page_fetches.store(0, Ordering::SeqCst);
        self.instrumentation.upserts.store(0, Ordering::SeqCst);
    }

    /// Reject every write of the record with `key`.
    pub fn fail_writes_for(&self, key: RecordKey) {
        lock(&self.instrumentation.failing_keys).insert(key);
    }

    /// Make the next `times` table listings fail with a connection error.
    pub fn fail_next_listings(&self, times: usize) {
        self.instrumentation
            .listing_failures
            .store(times, Ordering::SeqCst);
    }

    /// Make every operation fail with a connection error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.instrumentation
            .unavailable
            .store(unavailable, Ordering::SeqCst);
    }

    fn missing(table: &str) -> StoreError {
        StoreError::NotFound(format!("table '{table}'"))
    }
}

#[async_trait]
impl RecordStore for MemoryRelationalStore {
    fn origin(&self) -> Origin {
        Origin::Relational
    }

    async fn list_entities(&self) -> Result<Vec<String>, StoreError> {
        self.instrumentation.check_listing()?;
        Ok(lock(&self.tables).keys().cloned().collect())
    }

    async fn count(&self, entity: &str) -> Result<u64, StoreError> {
        self.instrumentation.check_available()?;
        lock(&self.tables)
            .get(entity)
            .map(|t| t.rows.len() as u64)
            .ok_or_else(|| Self::missing(entity))
    }

    async fn fetch_page(
        &self,
        entity: &str,
        order_key: &str,
        limit: usize,
        offset: u64,
    ) -> Result<Vec<Record>, StoreError> {
        self.instrumentation.check_available()?;
        self.instrumentation
            .page_fetches
            .fetch_add(1, Ordering::SeqCst);
        let tables = lock(&self.tables);
        let table = tables.get(entity).ok_or_else(|| Self::missing(entity))?;
        Ok(sorted_page(&table.rows, order_key, limit, offset))
    }

    async fn get_one(
        &self,
        entity: &str,
        key_field: &str,
        key: &SyncValue,
    ) -> Result<Option<Record>, StoreError> {
        self.instrumentation.check_available()?;
        let tables = lock(&self.tables);
        let table = tables.get(entity).ok_or_else(|| Self::missing(entity))?;
        Ok(table
            .rows
            .iter()
            .find(|r| matches_key(r, key_field, key))
            .cloned())
    }

    async fn upsert(
        &self,
        entity: &str,
        key_field: &str,
        record: &Record,
    ) -> Result<bool, StoreError> {
        self.instrumentation.check_upsert(record, key_field)?;
        let key = match record.get(key_field) {
            Some(value) if !value.is_null() => value.clone(),
            _ => {
                return Err(StoreError::Conversion(format!(
                    "record has no value for key column '{key_field}'"
                )))
            }
        };

        let mut tables = lock(&self.tables);
        let table = tables
            .get_mut(entity)
            .ok_or_else(|| Self::missing(entity))?;
        if let Some(unknown) = record.keys().find(|f| !table.columns.contains(f)) {
            return Err(StoreError::Query(format!(
                "column \"{unknown}\" of relation \"{entity}\" does not exist"
            )));
        }

        match table
            .rows
            .iter_mut()
            .find(|r| matches_key(r, key_field, &key))
        {
            Some(existing) => {
                existing.extend(record.clone());
                Ok(false)
            }
            None => {
                let mut row: Record = table
                    .columns
                    .iter()
                    .map(|c| (c.clone(), SyncValue::Null))
                    .collect();
                row.extend(record.clone());
                table.rows.push(row);
                Ok(true)
            }
        }
    }
}

#[async_trait]
impl RelationalStore for MemoryRelationalStore {
    async fn primary_key_of(&self, table: &str) -> Result<Option<String>, StoreError> {
        self.instrumentation.check_available()?;
        lock(&self.tables)
            .get(table)
            .map(|t| t.primary_key.clone())
            .ok_or_else(|| Self::missing(table))
    }

    async fn columns_of(&self, table: &str) -> Result<Vec<String>, StoreError> {
        self.instrumentation.check_available()?;
        lock(&self.tables)
            .get(table)
            .map(|t| t.columns.clone())
            .ok_or_else(|| Self::missing(table))
    }
}

/// Document store held in memory.
#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: Mutex<BTreeMap<String, Vec<Record>>>,
    next_id: AtomicU64,
    instrumentation: Instrumentation,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn assign_id(&self, doc: &mut Record) {
        if !doc.contains_key(NATIVE_ID_FIELD) {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            doc.insert(NATIVE_ID_FIELD.to_string(), SyncValue::Text(format!("{id:024x}")));
        }
    }

    /// Insert a document directly, bypassing counters. `_id` is assigned if absent.
    pub fn insert_document(&self, collection: &str, mut doc: Record) {
        self.assign_id(&mut doc);
        lock(&self.collections)
            .entry(collection.to_string())
            .or_default()
            .push(doc);
    }

    /// Replace fields of the first document whose `key_field` equals `key`.
    pub fn update_document(
        &self,
        collection: &str,
        key_field: &str,
        key: impl Into<SyncValue>,
        fields: Record,
    ) -> bool {
        let key = key.into();
        let mut collections = lock(&self.collections);
        let found = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| matches_key(d, key_field, &key)));
        match found {
            Some(doc) => {
                doc.extend(fields);
                true
            }
            None => false,
        }
    }

    /// All documents of `collection`, in insertion order.
    pub fn documents(&self, collection: &str) -> Vec<Record> {
        lock(&self.collections)
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// The first document whose `key_field` equals `key`.
    pub fn document(
        &self,
        collection: &str,
        key_field: &str,
        key: impl Into<SyncValue>,
    ) -> Option<Record> {
        let key = key.into();
        lock(&self.collections)
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| matches_key(d, key_field, &key)).cloned())
    }

    pub fn page_fetches(&self) -> usize {
        self.instrumentation.page_fetches.load(Ordering::SeqCst)
    }

    pub fn upsert_calls(&self) -> usize {
        self.instrumentation.upserts.load(Ordering::SeqCst)
    }

    pub fn reset_counters(&self) {
        self.instrumentation.page_fetches.store(0, Ordering::SeqCst);
        self.instrumentation.upserts.store(0, Ordering::SeqCst);
    }

    /// Reject every write of the document with `key`.
    pub fn fail_writes_for(&self, key: RecordKey) {
        lock(&self.instrumentation.failing_keys).insert(key);
    }

    /// Make every operation fail with a connection error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.instrumentation
            .unavailable
            .store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStore for MemoryDocumentStore {
    fn origin(&self) -> Origin {
        Origin::Document
    }

    async fn list_entities(&self) -> Result<Vec<String>, StoreError> {
        self.instrumentation.check_listing()?;
        Ok(lock(&self.collections).keys().cloned().collect())
    }

    async fn count(&self, entity: &str) -> Result<u64, StoreError> {
        self.instrumentation.check_available()?;
        Ok(lock(&self.collections)
            .get(entity)
            .map_or(0, |docs| docs.len() as u64))
    }

    async fn fetch_page(
        &self,
        entity: &str,
        order_key: &str,
        limit: usize,
        offset: u64,
    ) -> Result<Vec<Record>, StoreError> {
        self.instrumentation.check_available()?;
        self.instrumentation
            .page_fetches
            .fetch_add(1, Ordering::SeqCst);
        let collections = lock(&self.collections);
        Ok(collections
            .get(entity)
            .map(|docs| sorted_page(docs, order_key, limit, offset))
            .unwrap_or_default())
    }

    async fn get_one(
        &self,
        entity: &str,
        key_field: &str,
        key: &SyncValue,
    ) -> Result<Option<Record>, StoreError> {
        self.instrumentation.check_available()?;
        Ok(self.document(entity, key_field, key.clone()))
    }

    async fn upsert(
        &self,
        entity: &str,
        key_field: &str,
        record: &Record,
    ) -> Result<bool, StoreError> {
        self.instrumentation.check_upsert(record, key_field)?;
        let key = match record.get(key_field) {
            Some(value) if !value.is_null() => value.clone(),
            _ => {
                return Err(StoreError::Conversion(format!(
                    "document has no value for key field '{key_field}'"
                )))
            }
        };

        let mut fields = record.clone();
        fields.remove(NATIVE_ID_FIELD);
        if self.update_document(entity, key_field, key, fields.clone()) {
            return Ok(false);
        }
        self.insert_document(entity, fields);
        Ok(true)
    }
}

impl DocumentStore for MemoryDocumentStore {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::record;

    #[tokio::test]
    async fn test_relational_upsert_fills_missing_columns() {
        let store = MemoryRelationalStore::new();
        store.create_table("users", Some("id"), &["id", "name", "email"]);

        let inserted = store
            .upsert("users", "id", &record(&[("id", 1i64)]))
            .await
            .unwrap();
        assert!(inserted);
        let row = store.row("users", "id", 1i64).unwrap();
        assert_eq!(row.get("email"), Some(&SyncValue::Null));

        let inserted = store
            .upsert("users", "id", &record(&[("id", "1"), ("name", "x")]))
            .await;
        // Text "1" is a different key than Int64 1.
        assert!(inserted.unwrap());
        assert_eq!(store.rows("users").len(), 2);
    }

    #[tokio::test]
    async fn test_relational_rejects_unknown_columns_and_tables() {
        let store = MemoryRelationalStore::new();
        store.create_table("users", Some("id"), &["id"]);
        let err = store
            .upsert("users", "id", &record(&[("id", 1i64), ("bogus", 2i64)]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Query(_)));
        assert!(matches!(
            store.count("nope").await.unwrap_err(),
            StoreError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_document_store_assigns_ids_and_pages_in_order() {
        let store = MemoryDocumentStore::new();
        for i in 0..5i64 {
            store.insert_document("c", record(&[("n", i)]));
        }
        assert_eq!(store.count("c").await.unwrap(), 5);
        assert_eq!(store.count("missing").await.unwrap(), 0);

        let page = store.fetch_page("c", NATIVE_ID_FIELD, 2, 2).await.unwrap();
        let ns: Vec<_> = page.iter().map(|d| d.get("n").cloned()).collect();
        assert_eq!(ns, vec![Some(SyncValue::Int64(2)), Some(SyncValue::Int64(3))]);
        assert_eq!(store.page_fetches(), 1);
    }

    #[tokio::test]
    async fn test_document_upsert_updates_in_place() {
        let store = MemoryDocumentStore::new();
        assert!(store
            .upsert("c", "_pg_id", &record(&[("_pg_id", 1i64), ("v", 1i64)]))
            .await
            .unwrap());
        assert!(!store
            .upsert("c", "_pg_id", &record(&[("_pg_id", 1i64), ("v", 2i64)]))
            .await
            .unwrap());
        let docs = store.documents("c");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].get("v"), Some(&SyncValue::Int64(2)));
        assert!(docs[0].contains_key(NATIVE_ID_FIELD));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = MemoryRelationalStore::new();
        store.create_table("t", Some("id"), &["id"]);
        store.fail_writes_for(RecordKey::Int(3));
        assert!(store.upsert("t", "id", &record(&[("id", 3i64)])).await.is_err());
        assert!(store.upsert("t", "id", &record(&[("id", 4i64)])).await.is_ok());
        assert_eq!(store.upsert_calls(), 2);

        store.fail_next_listings(1);
        assert!(store.list_entities().await.is_err());
        assert_eq!(store.list_entities().await.unwrap(), vec!["t".to_string()]);
    }
}
