//! Record shape conversion between table rows and documents.
//!
//! A row becomes a document by moving its primary key into the reserved
//! [`DOCUMENT_KEY_FIELD`], coercing decimals to binary64 and stamping the
//! sync markers. The inverse strips everything the document store owns
//! (`_id`, the markers) and moves the key back.
//!
//! Decimal → float is lossy; rows with decimal columns only round-trip
//! approximately.

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashSet};
use sync_core::{
    Origin, Record, RecordKey, SyncValue, DOCUMENT_KEY_FIELD, NATIVE_ID_FIELD, SYNC_ORIGIN_FIELD,
    SYNC_TIMESTAMP_FIELD,
};

/// Fields owned by the document store or the engine; never table columns.
pub const RESERVED_FIELDS: [&str; 3] = [NATIVE_ID_FIELD, SYNC_ORIGIN_FIELD, SYNC_TIMESTAMP_FIELD];

/// Whether `field` is one of [`RESERVED_FIELDS`].
pub fn is_reserved(field: &str) -> bool {
    RESERVED_FIELDS.contains(&field)
}

/// Convert a table row into the document written to the document store.
pub fn to_document_shape(row: &Record, primary_key: &str, synced_at: DateTime<Utc>) -> Record {
    let mut doc = Record::new();
    for (field, value) in row {
        if field == NATIVE_ID_FIELD {
            continue;
        }
        let value = value
            .to_document_numeric()
            .unwrap_or_else(|| SyncValue::Text(value.to_string()));
        if field == primary_key {
            doc.insert(DOCUMENT_KEY_FIELD.to_string(), value);
        } else {
            doc.insert(field.clone(), value);
        }
    }
    doc.insert(
        SYNC_ORIGIN_FIELD.to_string(),
        SyncValue::Text(Origin::Relational.as_str().to_string()),
    );
    doc.insert(
        SYNC_TIMESTAMP_FIELD.to_string(),
        SyncValue::Timestamp(synced_at),
    );
    doc
}

/// Convert a document into a table row.
///
/// The reserved key field, when present, wins over a stale `primary_key`
/// field carried by the document.
pub fn to_relational_shape(doc: &Record, primary_key: &str) -> Record {
    let mut row: Record = doc
        .iter()
        .filter(|(field, _)| !is_reserved(field) && field.as_str() != DOCUMENT_KEY_FIELD)
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect();
    if let Some(key) = doc.get(DOCUMENT_KEY_FIELD) {
        row.insert(primary_key.to_string(), key.clone());
    }
    row
}

/// Keep only the fields that are columns of the target table.
pub fn filter_columns(row: Record, columns: &HashSet<String>) -> Record {
    row.into_iter()
        .filter(|(field, _)| columns.contains(field))
        .collect()
}

/// Join key of a document: the reserved key field, else the primary key field.
pub fn document_key(doc: &Record, primary_key: &str) -> Option<RecordKey> {
    RecordKey::from_record(doc, DOCUMENT_KEY_FIELD)
        .or_else(|| RecordKey::from_record(doc, primary_key))
}

/// Field to address an existing document by when writing it back.
///
/// Documents the engine wrote carry [`DOCUMENT_KEY_FIELD`]; documents that
/// predate it are addressed by the primary key field itself.
pub fn document_key_field<'a>(existing: Option<&Record>, primary_key: &'a str) -> &'a str {
    match existing {
        Some(doc) if !doc.contains_key(DOCUMENT_KEY_FIELD) && doc.contains_key(primary_key) => {
            primary_key
        }
        _ => DOCUMENT_KEY_FIELD,
    }
}

/// Whether the document carries the origin marker for `origin`.
pub fn has_origin(doc: &Record, origin: Origin) -> bool {
    doc.get(SYNC_ORIGIN_FIELD)
        .and_then(Origin::from_marker)
        .is_some_and(|marked| marked == origin)
}

/// The document as conflict resolution should see it.
///
/// A document still marked as exported from the relational side carries
/// only the engine's export time in [`SYNC_TIMESTAMP_FIELD`], not an edit
/// time, so that stamp is dropped.
pub fn resolution_view(doc: &Record) -> Record {
    let mut view = doc.clone();
    if has_origin(doc, Origin::Relational) {
        view.remove(SYNC_TIMESTAMP_FIELD);
    }
    view
}

fn normalized(value: Option<&SyncValue>) -> SyncValue {
    value.map(SyncValue::normalized).unwrap_or(SyncValue::Null)
}

/// Whether writing `candidate` over `existing` would change nothing.
///
/// Upserts only touch the fields they carry, so fields present only in
/// `existing` are ignored. Reserved fields are never compared.
pub fn is_subset_match(candidate: &Record, existing: &Record) -> bool {
    candidate
        .iter()
        .filter(|(field, _)| !is_reserved(field))
        .all(|(field, value)| value.normalized() == normalized(existing.get(field)))
}

/// Whether two rows hold the same data over the union of their fields,
/// treating absent fields as null. Reserved fields are never compared.
pub fn rows_equal(a: &Record, b: &Record) -> bool {
    let fields: BTreeSet<&String> = a
        .keys()
        .chain(b.keys())
        .filter(|field| !is_reserved(field))
        .collect();
    fields
        .into_iter()
        .all(|field| normalized(a.get(field)) == normalized(b.get(field)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn value_strategy() -> impl Strategy<Value = SyncValue> {
        prop_oneof![
            Just(SyncValue::Null),
            any::<bool>().prop_map(SyncValue::Bool),
            any::<i64>().prop_map(SyncValue::Int64),
            (-1_000_000i32..1_000_000).prop_map(|v| SyncValue::Float64(f64::from(v) / 8.0)),
            "[a-zA-Z0-9 ]{0,16}".prop_map(SyncValue::Text),
            prop::collection::vec(any::<u8>(), 0..16).prop_map(SyncValue::Bytes),
            (0i64..4_000_000_000, 0u32..1_000_000_000).prop_map(|(secs, nanos)| {
                SyncValue::Timestamp(Utc.timestamp_opt(secs, nanos).unwrap())
            }),
            any::<i32>().prop_map(|v| SyncValue::Json(serde_json::json!({ "n": v }))),
        ]
    }

    fn key_strategy() -> impl Strategy<Value = SyncValue> {
        prop_oneof![
            any::<i64>().prop_map(SyncValue::Int64),
            "[a-z0-9-]{1,12}".prop_map(SyncValue::Text),
        ]
    }

    /// Rows keyed by `id` with up to six ordinary columns.
    fn row_strategy() -> impl Strategy<Value = Record> {
        (
            key_strategy(),
            prop::collection::btree_map("[a-z][a-z0-9_]{0,10}", value_strategy(), 0..6),
        )
            .prop_map(|(key, mut row)| {
                row.insert("id".to_string(), key);
                row
            })
    }

    proptest! {
        #[test]
        fn test_row_round_trips_through_document_shape(r in row_strategy()) {
            let mut doc = to_document_shape(&r, "id", now());
            doc.insert(NATIVE_ID_FIELD.into(), SyncValue::Text("65a0f0".into()));
            prop_assert_eq!(document_key(&doc, "id"), RecordKey::from_record(&r, "id"));
            prop_assert_eq!(to_relational_shape(&doc, "id"), r);
        }

        #[test]
        fn test_decimal_rows_round_trip_approximately(
            r in row_strategy(),
            mantissa in -1_000_000_000i64..1_000_000_000,
            scale in 0u32..6,
        ) {
            let mut r = r;
            r.insert("price".into(), SyncValue::Decimal(Decimal::new(mantissa, scale)));
            let back = to_relational_shape(&to_document_shape(&r, "id", now()), "id");
            prop_assert!(rows_equal(&back, &r));
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn row(fields: &[(&str, SyncValue)]) -> Record {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_document_shape_moves_key_and_stamps_markers() {
        let r = row(&[
            ("id", SyncValue::Int64(1)),
            ("name", SyncValue::Text("Ann".into())),
        ]);
        let doc = to_document_shape(&r, "id", now());
        assert_eq!(doc.get(DOCUMENT_KEY_FIELD), Some(&SyncValue::Int64(1)));
        assert!(!doc.contains_key("id"));
        assert_eq!(doc.get("name"), Some(&SyncValue::Text("Ann".into())));
        assert_eq!(
            doc.get(SYNC_ORIGIN_FIELD),
            Some(&SyncValue::Text("relational".into()))
        );
        assert_eq!(
            doc.get(SYNC_TIMESTAMP_FIELD),
            Some(&SyncValue::Timestamp(now()))
        );
        assert!(has_origin(&doc, Origin::Relational));
        assert!(!has_origin(&doc, Origin::Document));
    }

    #[test]
    fn test_resolution_view_drops_export_stamp_only() {
        let exported = to_document_shape(&row(&[("id", SyncValue::Int64(1))]), "id", now());
        let view = resolution_view(&exported);
        assert!(!view.contains_key(SYNC_TIMESTAMP_FIELD));
        assert_eq!(view.get(SYNC_ORIGIN_FIELD), exported.get(SYNC_ORIGIN_FIELD));

        let native = row(&[
            ("id", SyncValue::Int64(1)),
            (SYNC_TIMESTAMP_FIELD, SyncValue::Timestamp(now())),
            (SYNC_ORIGIN_FIELD, SyncValue::Text("document".into())),
        ]);
        assert_eq!(resolution_view(&native), native);
    }

    #[test]
    fn test_decimal_coerced_and_bytes_kept() {
        let r = row(&[
            ("id", SyncValue::Int64(1)),
            ("price", SyncValue::Decimal(Decimal::from_str("9.5").unwrap())),
            ("blob", SyncValue::Bytes(vec![0, 1, 2])),
        ]);
        let doc = to_document_shape(&r, "id", now());
        assert_eq!(doc.get("price"), Some(&SyncValue::Float64(9.5)));
        assert_eq!(doc.get("blob"), Some(&SyncValue::Bytes(vec![0, 1, 2])));
    }

    #[test]
    fn test_round_trip_restores_row() {
        let r = row(&[
            ("id", SyncValue::Int64(7)),
            ("name", SyncValue::Text("Bo".into())),
            ("active", SyncValue::Bool(true)),
            ("nickname", SyncValue::Null),
            ("updated_at", SyncValue::Timestamp(now())),
        ]);
        let mut doc = to_document_shape(&r, "id", now());
        // The store adds its own identifier on insert.
        doc.insert(NATIVE_ID_FIELD.into(), SyncValue::Text("65a0f0".into()));
        assert_eq!(to_relational_shape(&doc, "id"), r);
    }

    #[test]
    fn test_key_named_like_reserved_field_is_not_renamed() {
        let r = row(&[
            (DOCUMENT_KEY_FIELD, SyncValue::Text("k".into())),
            ("v", SyncValue::Int64(1)),
        ]);
        let doc = to_document_shape(&r, DOCUMENT_KEY_FIELD, now());
        assert_eq!(doc.get(DOCUMENT_KEY_FIELD), Some(&SyncValue::Text("k".into())));
        assert_eq!(to_relational_shape(&doc, DOCUMENT_KEY_FIELD), r);
    }

    #[test]
    fn test_reserved_key_wins_over_stale_field() {
        let doc = row(&[
            (DOCUMENT_KEY_FIELD, SyncValue::Int64(2)),
            ("id", SyncValue::Int64(99)),
        ]);
        assert_eq!(to_relational_shape(&doc, "id").get("id"), Some(&SyncValue::Int64(2)));
        assert_eq!(document_key(&doc, "id"), Some(RecordKey::Int(2)));
    }

    #[test]
    fn test_document_key_falls_back_to_primary_key() {
        let doc = row(&[("sku", SyncValue::Text("A-1".into()))]);
        assert_eq!(document_key(&doc, "sku"), Some(RecordKey::Text("A-1".into())));
        assert_eq!(document_key_field(Some(&doc), "sku"), "sku");
        assert_eq!(document_key_field(None, "sku"), DOCUMENT_KEY_FIELD);
        assert_eq!(document_key(&Record::new(), "sku"), None);
    }

    #[test]
    fn test_filter_columns_drops_unknown_fields() {
        let r = row(&[
            ("id", SyncValue::Int64(1)),
            ("extra", SyncValue::Text("x".into())),
        ]);
        let columns: HashSet<String> = ["id".to_string(), "name".to_string()].into();
        let filtered = filter_columns(r, &columns);
        assert_eq!(filtered.len(), 1);
        assert!(filtered.contains_key("id"));
    }

    #[test]
    fn test_subset_match_ignores_extra_existing_fields() {
        let candidate = row(&[("id", SyncValue::Int64(1)), ("name", SyncValue::Text("a".into()))]);
        let existing = row(&[
            ("id", SyncValue::Int64(1)),
            ("name", SyncValue::Text("a".into())),
            ("other", SyncValue::Bool(false)),
            (SYNC_ORIGIN_FIELD, SyncValue::Text("document".into())),
        ]);
        assert!(is_subset_match(&candidate, &existing));

        let changed = row(&[("id", SyncValue::Int64(1)), ("name", SyncValue::Text("b".into()))]);
        assert!(!is_subset_match(&changed, &existing));

        let null_candidate = row(&[("missing", SyncValue::Null)]);
        assert!(is_subset_match(&null_candidate, &existing));
    }

    #[test]
    fn test_rows_equal_normalizes_values() {
        let micro = Utc.timestamp_opt(1_700_000_000, 123_456_000).unwrap();
        let milli = Utc.timestamp_opt(1_700_000_000, 123_000_000).unwrap();
        let a = row(&[
            ("price", SyncValue::Decimal(Decimal::from_str("2.5").unwrap())),
            ("at", SyncValue::Timestamp(micro)),
            ("note", SyncValue::Null),
        ]);
        let b = row(&[
            ("price", SyncValue::Float64(2.5)),
            ("at", SyncValue::Timestamp(milli)),
        ]);
        assert!(rows_equal(&a, &b));

        let c = row(&[("price", SyncValue::Float64(2.5))]);
        assert!(!rows_equal(&a, &c));
    }
}
