//! Store abstractions the engine is written against.
//!
//! Adapters for concrete databases implement these traits; the engine never
//! sees a driver type. All methods are async and report failures as
//! [`StoreError`].

use async_trait::async_trait;

use crate::error::StoreError;
use crate::record::Origin;
use crate::values::{Record, SyncValue};

/// Operations shared by both kinds of store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Which side of the sync this store represents.
    fn origin(&self) -> Origin;

    /// Names of all tables/collections, sorted.
    async fn list_entities(&self) -> Result<Vec<String>, StoreError>;

    /// Number of records in `entity`.
    async fn count(&self, entity: &str) -> Result<u64, StoreError>;

    /// One page of records ordered by `order_key`.
    async fn fetch_page(
        &self,
        entity: &str,
        order_key: &str,
        limit: usize,
        offset: u64,
    ) -> Result<Vec<Record>, StoreError>;

    /// The record whose `key_field` equals `key`, if any.
    async fn get_one(
        &self,
        entity: &str,
        key_field: &str,
        key: &SyncValue,
    ) -> Result<Option<Record>, StoreError>;

    /// Insert or update the record keyed by `key_field`. Fields absent from
    /// `record` are left untouched on existing rows.
    ///
    /// Returns `true` when a new record was created.
    async fn upsert(&self, entity: &str, key_field: &str, record: &Record)
        -> Result<bool, StoreError>;

    /// Apply each record as an independent upsert. One failure does not
    /// affect the others; results are returned in input order.
    async fn upsert_batch(
        &self,
        entity: &str,
        key_field: &str,
        records: &[Record],
    ) -> Vec<Result<bool, StoreError>> {
        let mut results = Vec::with_capacity(records.len());
        for record in records {
            results.push(self.upsert(entity, key_field, record).await);
        }
        results
    }
}

/// Table-oriented store with schema introspection.
#[async_trait]
pub trait RelationalStore: RecordStore {
    /// Primary-key column of `table`, `None` if it has none.
    async fn primary_key_of(&self, table: &str) -> Result<Option<String>, StoreError>;

    /// Column names of `table` in ordinal order.
    async fn columns_of(&self, table: &str) -> Result<Vec<String>, StoreError>;
}

/// Schema-less collection store.
pub trait DocumentStore: RecordStore {}
