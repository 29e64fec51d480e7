//! Bidirectional synchronization through the in-memory stores.

mod common;

use common::*;
use datasync::convert::{filter_columns, rows_equal, to_relational_shape};
use datasync::{ConflictStrategy, SyncDirection};
use std::collections::HashSet;
use sync_core::{Record, RecordStore, SyncValue, TableMapping};

const BOTH: SyncDirection = SyncDirection::Bidirectional;

fn user_columns() -> HashSet<String> {
    ["id", "name", "updated_at"].iter().map(|c| c.to_string()).collect()
}

fn sides_match(stores: &Stores, id: i64) -> bool {
    let (Some(row), Some(doc)) = (stores.user_row(id), stores.user_document(id)) else {
        return false;
    };
    rows_equal(&row, &filter_columns(to_relational_shape(&doc, "id"), &user_columns()))
}

#[tokio::test]
async fn test_newer_relational_version_wins() {
    let stores = Stores::with_users();
    stores.relational.insert_row("users", user(42, "Relational", Some(ts(5))));
    stores.document.insert_document("users", user_doc(42, "Document", Some(ts(2))));

    let engine = stores.engine(BOTH, ConflictStrategy::LatestWins, users_mapping());
    let results = engine.sync_all().await.unwrap();
    let stats = &results["users<->users"];

    assert_eq!(stats.processed, 1);
    assert_eq!(stats.conflicts, 1);
    assert_eq!(stats.updated, 1);
    assert_eq!(stats.relational_to_document, 1);
    assert_eq!(stats.document_to_relational, 0);
    assert_eq!(
        text(&stores.user_document(42).unwrap(), "name").as_deref(),
        Some("Relational")
    );
    assert_eq!(
        text(&stores.user_row(42).unwrap(), "name").as_deref(),
        Some("Relational")
    );
    assert!(sides_match(&stores, 42));
}

#[tokio::test]
async fn test_newer_document_version_wins() {
    let stores = Stores::with_users();
    stores.relational.insert_row("users", user(42, "Relational", Some(ts(1))));
    stores.document.insert_document("users", user_doc(42, "Document", Some(ts(9))));

    let results = stores
        .engine(BOTH, ConflictStrategy::LatestWins, users_mapping())
        .sync_all()
        .await
        .unwrap();
    let stats = &results["users<->users"];
    assert_eq!(stats.conflicts, 1);
    assert_eq!(stats.document_to_relational, 1);

    let row = stores.user_row(42).unwrap();
    assert_eq!(text(&row, "name").as_deref(), Some("Document"));
    assert_eq!(row.get("updated_at"), Some(&SyncValue::Timestamp(ts(9))));
}

#[tokio::test]
async fn test_manual_strategy_leaves_both_sides() {
    let stores = Stores::with_users();
    stores.relational.insert_row("users", user(1, "A", None));
    stores.document.insert_document("users", user_doc(1, "B", None));
    let docs_before = stores.document.documents("users");
    let rows_before = stores.relational.rows("users");

    let results = stores
        .engine(BOTH, ConflictStrategy::Manual, users_mapping())
        .sync_all()
        .await
        .unwrap();
    let stats = &results["users<->users"];

    assert_eq!(stats.conflicts, 1);
    assert_eq!(stats.inserted, 0);
    assert_eq!(stats.updated, 0);
    assert_eq!(stores.relational.upsert_calls(), 0);
    assert_eq!(stores.document.upsert_calls(), 0);
    assert_eq!(stores.document.documents("users"), docs_before);
    assert_eq!(stores.relational.rows("users"), rows_before);
}

#[tokio::test]
async fn test_every_key_ends_up_on_both_sides() {
    let stores = Stores::with_users();
    // Only relational.
    stores.relational.insert_row("users", user(1, "one", Some(ts(1))));
    // Both, document newer.
    stores.relational.insert_row("users", user(2, "two-old", Some(ts(1))));
    stores.document.insert_document("users", user_doc(2, "two-new", Some(ts(4))));
    // Only document, exported shape.
    stores.document.insert_document("users", user_doc(3, "three", None));
    // Only document, native shape with a field the table lacks.
    let mut native = user(4, "four", Some(ts(2)));
    native.insert("tags".into(), SyncValue::Text("x".into()));
    stores.document.insert_document("users", native);

    let results = stores
        .engine(BOTH, ConflictStrategy::LatestWins, users_mapping())
        .sync_all()
        .await
        .unwrap();
    let stats = &results["users<->users"];

    assert_eq!(stats.processed, 4);
    assert_eq!(stats.inserted, 3);
    assert_eq!(stats.updated, 1);
    assert_eq!(stats.conflicts, 1);
    assert!(stats.errors.is_empty(), "{:?}", stats.errors);
    for id in 1..=4 {
        assert!(sides_match(&stores, id), "key {id} differs between stores");
    }
    assert!(!stores.user_row(4).unwrap().contains_key("tags"));
}

#[tokio::test]
async fn test_converged_stores_stay_quiet() {
    let stores = Stores::with_users();
    for id in 1..=3 {
        stores.relational.insert_row("users", user(id, "r", Some(ts(1))));
    }
    stores.document.insert_document("users", user_doc(4, "d", Some(ts(1))));

    let engine = stores.engine(BOTH, ConflictStrategy::LatestWins, users_mapping());
    engine.sync_all().await.unwrap();
    let rows_upserts = stores.relational.upsert_calls();
    let doc_upserts = stores.document.upsert_calls();

    let results = engine.sync_all().await.unwrap();
    let stats = &results["users<->users"];
    assert_eq!(stats.processed, 4);
    assert_eq!(stats.skipped, 4);
    assert_eq!(stats.conflicts, 0);
    assert_eq!(stats.applied(), 0);
    assert_eq!(stores.relational.upsert_calls(), rows_upserts);
    assert_eq!(stores.document.upsert_calls(), doc_upserts);
}

#[tokio::test]
async fn test_document_winner_clears_columns_it_lacks() {
    let stores = Stores::with_users();
    stores.relational.insert_row("users", user(9, "row", Some(ts(1))));
    // No timestamp on the document, so priority decides.
    stores.document.insert_document("users", user_doc(9, "doc", None));

    let results = stores
        .engine(BOTH, ConflictStrategy::DocumentPriority, users_mapping())
        .sync_all()
        .await
        .unwrap();
    assert_eq!(results["users<->users"].updated, 1);

    let row = stores.user_row(9).unwrap();
    assert_eq!(text(&row, "name").as_deref(), Some("doc"));
    assert_eq!(row.get("updated_at"), Some(&SyncValue::Null));
    assert!(sides_match(&stores, 9));
}

#[tokio::test]
async fn test_failed_write_is_recorded_and_others_applied() {
    let stores = Stores::with_users();
    stores.relational.insert_row("users", user(1, "a", None));
    stores.relational.insert_row("users", user(2, "b", None));
    stores.document.fail_writes_for(sync_core::RecordKey::Int(1));

    let results = stores
        .engine(BOTH, ConflictStrategy::LatestWins, users_mapping())
        .sync_all()
        .await
        .unwrap();
    let stats = &results["users<->users"];
    assert_eq!(stats.inserted, 1);
    assert_eq!(stats.errors.len(), 1);
    assert!(stores.user_document(1).is_none());
    assert!(stores.user_document(2).is_some());
}

#[tokio::test]
async fn test_relational_edit_survives_without_timestamp_column() {
    let stores = Stores::empty();
    stores.relational.create_table("notes", Some("id"), &["id", "name"]);
    let mut note = Record::new();
    note.insert("id".into(), SyncValue::Int64(1));
    note.insert("name".into(), SyncValue::Text("Ann".into()));
    stores.relational.insert_row("notes", note.clone());

    let engine = stores.engine(
        BOTH,
        ConflictStrategy::LatestWins,
        vec![TableMapping::new("notes", "notes", "id")],
    );
    engine.sync_all().await.unwrap();

    note.insert("name".into(), SyncValue::Text("Annie".into()));
    stores.relational.upsert("notes", "id", &note).await.unwrap();

    let results = engine.sync_all().await.unwrap();
    let stats = &results["notes<->notes"];
    assert_eq!(stats.conflicts, 1);
    assert_eq!(stats.relational_to_document, 1);
    assert_eq!(stats.document_to_relational, 0);

    let row = stores.relational.row("notes", "id", 1i64).unwrap();
    assert_eq!(text(&row, "name").as_deref(), Some("Annie"));
    let doc = stores
        .document
        .document("notes", sync_core::DOCUMENT_KEY_FIELD, 1i64)
        .unwrap();
    assert_eq!(text(&doc, "name").as_deref(), Some("Annie"));
}
