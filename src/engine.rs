//! The sync engine.
//!
//! One call to [`SyncEngine::sync_all`] is one cycle: resolve the mapping
//! set, then synchronize each mapping in order according to the configured
//! [`SyncDirection`]. Every cycle is a full re-scan; no cursor survives
//! between cycles.
//!
//! Failures are contained at two levels:
//!
//! - a record that cannot be converted or written is recorded in its
//!   mapping's [`SyncStats::errors`] and the page continues;
//! - any other store failure ends that mapping only, and is recorded the
//!   same way before the next mapping starts.
//!
//! Only failing to work out *which* mappings to run is a cycle-level error.

use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;
use sync_core::{
    DocumentStore, Origin, Record, RecordError, RecordErrorKind, RecordKey, RecordStore,
    RelationalStore, StoreError, SyncRecord, SyncStats, SyncValue, TableMapping,
    DEFAULT_PRIMARY_KEY, DOCUMENT_KEY_FIELD, NATIVE_ID_FIELD,
};
use tracing::{debug, error, info, warn};

use crate::convert::{
    document_key, document_key_field, filter_columns, has_origin, is_subset_match,
    resolution_view, rows_equal, to_document_shape, to_relational_shape,
};
use crate::resolver::{resolve, ConflictStrategy, Resolution};

/// Which way records flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    #[serde(alias = "pg_to_mongo", alias = "postgres_to_mongo")]
    RelationalToDocument,
    #[serde(alias = "mongo_to_pg", alias = "mongo_to_postgres")]
    DocumentToRelational,
    #[default]
    Bidirectional,
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncDirection::RelationalToDocument => "relational_to_document",
            SyncDirection::DocumentToRelational => "document_to_relational",
            SyncDirection::Bidirectional => "bidirectional",
        };
        f.write_str(s)
    }
}

/// Engine behaviour knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Page size for reads and chunk size for batched writes. Must be at least 1.
    pub batch_size: usize,
    pub direction: SyncDirection,
    pub conflict_strategy: ConflictStrategy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            direction: SyncDirection::default(),
            conflict_strategy: ConflictStrategy::default(),
        }
    }
}

/// Walks an entity page by page in `order_key` order, bounded by its count.
struct Pager<'a, S: ?Sized> {
    store: &'a S,
    entity: &'a str,
    order_key: &'a str,
    limit: usize,
    offset: u64,
    total: u64,
    exhausted: bool,
}

impl<'a, S: RecordStore + ?Sized> Pager<'a, S> {
    async fn start(
        store: &'a S,
        entity: &'a str,
        order_key: &'a str,
        limit: usize,
    ) -> Result<Pager<'a, S>, StoreError> {
        let total = store.count(entity).await?;
        debug!("{} '{entity}' holds {total} record(s)", store.origin());
        Ok(Self {
            store,
            entity,
            order_key,
            limit: limit.max(1),
            offset: 0,
            total,
            exhausted: false,
        })
    }

    async fn next_page(&mut self) -> Result<Option<Vec<Record>>, StoreError> {
        if self.exhausted || self.offset >= self.total {
            return Ok(None);
        }
        let page = self
            .store
            .fetch_page(self.entity, self.order_key, self.limit, self.offset)
            .await?;
        if page.is_empty() {
            self.exhausted = true;
            return Ok(None);
        }
        self.offset += page.len() as u64;
        if page.len() < self.limit {
            self.exhausted = true;
        }
        debug!(
            "Fetched {} record(s) from {} '{}' ({}/{})",
            page.len(),
            self.store.origin(),
            self.entity,
            self.offset,
            self.total
        );
        Ok(Some(page))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteKind {
    Insert,
    Update,
}

/// A write decided on but not yet applied.
#[derive(Debug)]
struct PendingWrite {
    key: RecordKey,
    key_field: String,
    record: Record,
    kind: WriteKind,
}

impl PendingWrite {
    fn new(key: RecordKey, key_field: &str, mut record: Record, kind: WriteKind) -> Self {
        // The target is addressed by `key_field`, so the record must carry it.
        record
            .entry(key_field.to_string())
            .or_insert_with(|| key.to_value());
        Self {
            key,
            key_field: key_field.to_string(),
            record,
            kind,
        }
    }
}

fn record_failure(stats: &mut SyncStats, err: RecordError) {
    error!("{err}");
    stats.push_error(err.to_string());
}

/// Apply `writes` to `store` in chunks of `batch_size`, counting each outcome.
async fn apply_writes<S: RecordStore + ?Sized>(
    store: &S,
    entity: &str,
    writes: Vec<PendingWrite>,
    batch_size: usize,
    stats: &mut SyncStats,
) {
    let mut by_key_field: BTreeMap<String, Vec<PendingWrite>> = BTreeMap::new();
    for write in writes {
        by_key_field
            .entry(write.key_field.clone())
            .or_default()
            .push(write);
    }

    for (key_field, group) in by_key_field {
        for chunk in group.chunks(batch_size.max(1)) {
            let records: Vec<Record> = chunk.iter().map(|w| w.record.clone()).collect();
            let outcomes = store.upsert_batch(entity, &key_field, &records).await;
            for (write, outcome) in chunk.iter().zip(outcomes) {
                match outcome {
                    Ok(_) => {
                        match write.kind {
                            WriteKind::Insert => stats.inserted += 1,
                            WriteKind::Update => stats.updated += 1,
                        }
                        stats.record_write(store.origin());
                    }
                    Err(e) => record_failure(stats, RecordError::apply(&write.key, &e)),
                }
            }
        }
    }
}

/// Orchestrates one relational store and one document store.
pub struct SyncEngine<R, D> {
    relational: Arc<R>,
    document: Arc<D>,
    settings: EngineSettings,
    mappings: Vec<TableMapping>,
    table_filter: Option<String>,
}

impl<R: RelationalStore, D: DocumentStore> SyncEngine<R, D> {
    /// Create an engine. With no `mappings`, tables are discovered every cycle.
    pub fn new(
        relational: Arc<R>,
        document: Arc<D>,
        settings: EngineSettings,
        mappings: Vec<TableMapping>,
    ) -> Self {
        Self {
            relational,
            document,
            settings,
            mappings,
            table_filter: None,
        }
    }

    /// Restrict every cycle to the mapping for one relational table.
    pub fn with_table_filter(mut self, table: Option<String>) -> Self {
        self.table_filter = table;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Mappings the next cycle will run.
    ///
    /// Configured mappings are used as-is. Otherwise every relational table
    /// with a primary key (or an `id` column) is paired with a same-named
    /// collection.
    pub async fn resolve_mappings(&self) -> anyhow::Result<Vec<TableMapping>> {
        let mut mappings = if self.mappings.is_empty() {
            self.discover_mappings().await?
        } else {
            self.mappings.clone()
        };

        if let Some(table) = &self.table_filter {
            mappings.retain(|m| &m.relational_table == table);
            if mappings.is_empty() {
                anyhow::bail!("No mapping found for table '{table}'");
            }
        }
        Ok(mappings)
    }

    async fn discover_mappings(&self) -> anyhow::Result<Vec<TableMapping>> {
        let tables = self
            .relational
            .list_entities()
            .await
            .context("Failed to list relational tables")?;
        info!("Discovered {} relational table(s)", tables.len());

        let mut mappings = Vec::with_capacity(tables.len());
        for table in tables {
            let primary_key = self
                .relational
                .primary_key_of(&table)
                .await
                .with_context(|| format!("Failed to read primary key of table '{table}'"))?;
            let primary_key = match primary_key {
                Some(pk) => pk,
                None => {
                    let columns = self
                        .relational
                        .columns_of(&table)
                        .await
                        .with_context(|| format!("Failed to read columns of table '{table}'"))?;
                    if !columns.iter().any(|c| c == DEFAULT_PRIMARY_KEY) {
                        warn!("Skipping table '{table}': no primary key and no '{DEFAULT_PRIMARY_KEY}' column");
                        continue;
                    }
                    warn!("Table '{table}' has no primary key, falling back to '{DEFAULT_PRIMARY_KEY}'");
                    DEFAULT_PRIMARY_KEY.to_string()
                }
            };
            mappings.push(TableMapping::new(table.clone(), table, primary_key));
        }
        Ok(mappings)
    }

    /// Run one cycle over all mappings.
    ///
    /// Returns per-mapping statistics keyed by [`TableMapping::label`].
    pub async fn sync_all(&self) -> anyhow::Result<BTreeMap<String, SyncStats>> {
        let mappings = self.resolve_mappings().await?;
        info!(
            "Starting sync of {} mapping(s), direction {}, conflict resolution {}",
            mappings.len(),
            self.settings.direction,
            self.settings.conflict_strategy
        );

        let collections: Option<BTreeSet<String>> = match self.document.list_entities().await {
            Ok(names) => Some(names.into_iter().collect()),
            Err(e) => {
                warn!("Could not list document collections: {e}");
                None
            }
        };

        let mut results = BTreeMap::new();
        for mapping in &mappings {
            if let Some(existing) = &collections {
                if !existing.contains(&mapping.document_collection) {
                    info!(
                        "Collection '{}' does not exist yet, treating it as empty",
                        mapping.document_collection
                    );
                }
            }
            let stats = self.sync_mapping(mapping).await;
            results.insert(mapping.label(), stats);
        }

        let applied: u64 = results.values().map(SyncStats::applied).sum();
        let errors: usize = results.values().map(|s| s.errors.len()).sum();
        info!("Sync cycle complete: {applied} write(s) applied, {errors} error(s)");
        Ok(results)
    }

    /// Synchronize one mapping. Never fails; problems end up in the stats.
    pub async fn sync_mapping(&self, mapping: &TableMapping) -> SyncStats {
        let mut stats = SyncStats::new();
        info!("Syncing {mapping} ({})", self.settings.direction);

        if let Err(e) = self.run_mapping(mapping, &mut stats).await {
            error!("Sync of {} failed: {e}", mapping.label());
            stats.push_error(format!("{}: {e}", mapping.label()));
        }

        stats.finish();
        info!(
            "Finished {}: processed={} inserted={} updated={} skipped={} conflicts={} errors={}",
            mapping.label(),
            stats.processed,
            stats.inserted,
            stats.updated,
            stats.skipped,
            stats.conflicts,
            stats.errors.len()
        );
        stats
    }

    async fn run_mapping(
        &self,
        mapping: &TableMapping,
        stats: &mut SyncStats,
    ) -> Result<(), StoreError> {
        // Also validates that the table exists.
        let columns: HashSet<String> = self
            .relational
            .columns_of(&mapping.relational_table)
            .await?
            .into_iter()
            .collect();

        match self.settings.direction {
            SyncDirection::RelationalToDocument => {
                self.relational_to_document(mapping, stats).await
            }
            SyncDirection::DocumentToRelational => {
                self.document_to_relational(mapping, &columns, stats).await
            }
            SyncDirection::Bidirectional => self.bidirectional(mapping, &columns, stats).await,
        }
    }

    async fn find_document(
        &self,
        mapping: &TableMapping,
        key: &RecordKey,
    ) -> Result<Option<Record>, StoreError> {
        let collection = &mapping.document_collection;
        let value = key.to_value();
        let found = self
            .document
            .get_one(collection, DOCUMENT_KEY_FIELD, &value)
            .await?;
        if found.is_some() || mapping.primary_key == DOCUMENT_KEY_FIELD {
            return Ok(found);
        }
        self.document
            .get_one(collection, &mapping.primary_key, &value)
            .await
    }

    async fn relational_to_document(
        &self,
        mapping: &TableMapping,
        stats: &mut SyncStats,
    ) -> Result<(), StoreError> {
        let pk = mapping.primary_key.as_str();
        let mut pager = Pager::start(
            self.relational.as_ref(),
            &mapping.relational_table,
            pk,
            self.settings.batch_size,
        )
        .await?;

        while let Some(page) = pager.next_page().await? {
            let synced_at = Utc::now();
            let mut writes = Vec::with_capacity(page.len());

            for row in page {
                stats.processed += 1;
                let Some(key) = RecordKey::from_record(&row, pk) else {
                    record_failure(
                        stats,
                        RecordError::new(
                            None,
                            RecordErrorKind::MissingKey,
                            format!("row in '{}' has no usable '{pk}' value", mapping.relational_table),
                        ),
                    );
                    continue;
                };

                let existing = match self.find_document(mapping, &key).await {
                    Ok(existing) => existing,
                    Err(e) if e.is_transient() => return Err(e),
                    Err(e) => {
                        record_failure(stats, RecordError::apply(&key, &e));
                        continue;
                    }
                };
                let candidate = to_document_shape(&row, pk, synced_at);
                let key_field = document_key_field(existing.as_ref(), pk);

                let Some(existing) = existing else {
                    writes.push(PendingWrite::new(key, key_field, candidate, WriteKind::Insert));
                    continue;
                };

                if is_subset_match(
                    &to_relational_shape(&candidate, pk),
                    &to_relational_shape(&existing, pk),
                ) {
                    stats.skipped += 1;
                    continue;
                }

                // A copy this engine exported earlier is simply stale.
                let independently_modified = !has_origin(&existing, Origin::Relational);
                let resolution = if independently_modified {
                    let source = SyncRecord::new(key.clone(), row, Origin::Relational);
                    let target = SyncRecord::new(key.clone(), existing, Origin::Document);
                    resolve(self.settings.conflict_strategy, &source, &target)
                } else {
                    Resolution::SideA
                };

                match resolution {
                    Resolution::SideA => {
                        writes.push(PendingWrite::new(key, key_field, candidate, WriteKind::Update))
                    }
                    Resolution::SideB | Resolution::Skip => {
                        debug!("Keeping document version of key {key}");
                        stats.conflicts += 1;
                        stats.skipped += 1;
                    }
                }
            }

            apply_writes(
                self.document.as_ref(),
                &mapping.document_collection,
                writes,
                self.settings.batch_size,
                stats,
            )
            .await;
        }
        Ok(())
    }

    async fn document_to_relational(
        &self,
        mapping: &TableMapping,
        columns: &HashSet<String>,
        stats: &mut SyncStats,
    ) -> Result<(), StoreError> {
        let pk = mapping.primary_key.as_str();
        let table = mapping.relational_table.as_str();
        let mut pager = Pager::start(
            self.document.as_ref(),
            &mapping.document_collection,
            NATIVE_ID_FIELD,
            self.settings.batch_size,
        )
        .await?;

        while let Some(page) = pager.next_page().await? {
            let mut writes = Vec::with_capacity(page.len());

            for doc in page {
                stats.processed += 1;
                // Written by this engine from the relational side.
                if has_origin(&doc, Origin::Relational) {
                    stats.skipped += 1;
                    continue;
                }
                let Some(key) = document_key(&doc, pk) else {
                    record_failure(
                        stats,
                        RecordError::new(
                            None,
                            RecordErrorKind::MissingKey,
                            format!(
                                "document in '{}' has neither '{DOCUMENT_KEY_FIELD}' nor '{pk}'",
                                mapping.document_collection
                            ),
                        ),
                    );
                    continue;
                };

                let candidate = filter_columns(to_relational_shape(&doc, pk), columns);
                let existing = match self.relational.get_one(table, pk, &key.to_value()).await {
                    Ok(existing) => existing,
                    Err(e) if e.is_transient() => return Err(e),
                    Err(e) => {
                        record_failure(stats, RecordError::apply(&key, &e));
                        continue;
                    }
                };

                let Some(existing) = existing else {
                    writes.push(PendingWrite::new(key, pk, candidate, WriteKind::Insert));
                    continue;
                };

                if is_subset_match(&candidate, &existing) {
                    stats.skipped += 1;
                    continue;
                }

                let source = SyncRecord::new(key.clone(), doc, Origin::Document);
                let target = SyncRecord::new(key.clone(), existing, Origin::Relational);
                match resolve(self.settings.conflict_strategy, &source, &target) {
                    Resolution::SideA => {
                        writes.push(PendingWrite::new(key, pk, candidate, WriteKind::Update))
                    }
                    Resolution::SideB | Resolution::Skip => {
                        debug!("Keeping relational version of key {key}");
                        stats.conflicts += 1;
                        stats.skipped += 1;
                    }
                }
            }

            apply_writes(
                self.relational.as_ref(),
                table,
                writes,
                self.settings.batch_size,
                stats,
            )
            .await;
        }
        Ok(())
    }

    /// Read a whole entity into a key-indexed map.
    async fn collect_keyed<S, F>(
        &self,
        store: &S,
        entity: &str,
        order_key: &str,
        key_of: F,
        stats: &mut SyncStats,
    ) -> Result<BTreeMap<RecordKey, Record>, StoreError>
    where
        S: RecordStore + ?Sized,
        F: Fn(&Record) -> Option<RecordKey>,
    {
        let mut keyed = BTreeMap::new();
        let mut pager = Pager::start(store, entity, order_key, self.settings.batch_size).await?;
        while let Some(page) = pager.next_page().await? {
            for record in page {
                match key_of(&record) {
                    Some(key) => {
                        if keyed.insert(key.clone(), record).is_some() {
                            warn!("Duplicate key {key} in {} '{entity}', keeping the later record", store.origin());
                        }
                    }
                    None if store.origin() == Origin::Document => {
                        warn!("Skipping document without a key in '{entity}'");
                        stats.skipped += 1;
                    }
                    None => record_failure(
                        stats,
                        RecordError::new(
                            None,
                            RecordErrorKind::MissingKey,
                            format!("row in '{entity}' has no usable '{order_key}' value"),
                        ),
                    ),
                }
            }
        }
        Ok(keyed)
    }

    async fn bidirectional(
        &self,
        mapping: &TableMapping,
        columns: &HashSet<String>,
        stats: &mut SyncStats,
    ) -> Result<(), StoreError> {
        let pk = mapping.primary_key.as_str();
        let rows = self
            .collect_keyed(
                self.relational.as_ref(),
                &mapping.relational_table,
                pk,
                |row| RecordKey::from_record(row, pk),
                stats,
            )
            .await?;
        let docs = self
            .collect_keyed(
                self.document.as_ref(),
                &mapping.document_collection,
                NATIVE_ID_FIELD,
                |doc| document_key(doc, pk),
                stats,
            )
            .await?;

        let keys: BTreeSet<&RecordKey> = rows.keys().chain(docs.keys()).collect();
        debug!(
            "{}: {} row(s), {} document(s), {} distinct key(s)",
            mapping.label(),
            rows.len(),
            docs.len(),
            keys.len()
        );

        let synced_at = Utc::now();
        let mut to_document = Vec::new();
        let mut to_relational = Vec::new();

        for key in keys {
            stats.processed += 1;
            match (rows.get(key), docs.get(key)) {
                (Some(row), None) => to_document.push(PendingWrite::new(
                    key.clone(),
                    DOCUMENT_KEY_FIELD,
                    to_document_shape(row, pk, synced_at),
                    WriteKind::Insert,
                )),
                (None, Some(doc)) => to_relational.push(PendingWrite::new(
                    key.clone(),
                    pk,
                    filter_columns(to_relational_shape(doc, pk), columns),
                    WriteKind::Insert,
                )),
                (Some(row), Some(doc)) => {
                    let doc_row = filter_columns(to_relational_shape(doc, pk), columns);
                    if rows_equal(row, &doc_row) {
                        stats.skipped += 1;
                        continue;
                    }

                    stats.conflicts += 1;
                    let relational = SyncRecord::new(key.clone(), row.clone(), Origin::Relational);
                    let document =
                        SyncRecord::new(key.clone(), resolution_view(doc), Origin::Document);
                    match resolve(self.settings.conflict_strategy, &relational, &document) {
                        Resolution::SideA => to_document.push(PendingWrite::new(
                            key.clone(),
                            document_key_field(Some(doc), pk),
                            to_document_shape(row, pk, synced_at),
                            WriteKind::Update,
                        )),
                        Resolution::SideB => {
                            // Columns the document lacks are cleared so both sides match.
                            let mut winner = doc_row;
                            for column in row.keys() {
                                winner.entry(column.clone()).or_insert(SyncValue::Null);
                            }
                            to_relational.push(PendingWrite::new(
                                key.clone(),
                                pk,
                                winner,
                                WriteKind::Update,
                            ));
                        }
                        Resolution::Skip => {}
                    }
                }
                (None, None) => {}
            }
        }

        apply_writes(
            self.document.as_ref(),
            &mapping.document_collection,
            to_document,
            self.settings.batch_size,
            stats,
        )
        .await;
        apply_writes(
            self.relational.as_ref(),
            &mapping.relational_table,
            to_relational,
            self.settings.batch_size,
            stats,
        )
        .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_aliases() {
        let parse = |s: &str| serde_yaml::from_str::<SyncDirection>(s);
        assert_eq!(parse("pg_to_mongo").unwrap(), SyncDirection::RelationalToDocument);
        assert_eq!(
            parse("relational_to_document").unwrap(),
            SyncDirection::RelationalToDocument
        );
        assert_eq!(
            parse("mongo_to_postgres").unwrap(),
            SyncDirection::DocumentToRelational
        );
        assert_eq!(parse("bidirectional").unwrap(), SyncDirection::Bidirectional);
        assert!(parse("sideways").is_err());
    }

    #[test]
    fn test_default_settings() {
        let settings = EngineSettings::default();
        assert_eq!(settings.batch_size, 1000);
        assert_eq!(settings.direction, SyncDirection::Bidirectional);
        assert_eq!(settings.conflict_strategy, ConflictStrategy::LatestWins);
    }
}
