//! Forward conversion: SyncValue → BSON value.

use bson::{Bson, DateTime as BsonDateTime, Document};
use sync_core::{Record, SyncValue};

/// Wrapper for BSON values that can be written to MongoDB.
#[derive(Debug, Clone, PartialEq)]
pub struct BsonValue(pub Bson);

impl BsonValue {
    /// Get the inner BSON value.
    pub fn into_inner(self) -> Bson {
        self.0
    }
}

impl From<SyncValue> for BsonValue {
    fn from(value: SyncValue) -> Self {
        BsonValue::from(&value)
    }
}

impl From<&SyncValue> for BsonValue {
    fn from(value: &SyncValue) -> Self {
        let bson = match value {
            SyncValue::Null => Bson::Null,
            SyncValue::Bool(b) => Bson::Boolean(*b),
            SyncValue::Int64(i) => Bson::Int64(*i),
            SyncValue::Float64(f) => Bson::Double(*f),
            // Stored as a double: the document side has no exact-decimal
            // convention shared with the relational side.
            SyncValue::Decimal(_) => match value.to_document_numeric() {
                Some(SyncValue::Float64(f)) => Bson::Double(f),
                _ => Bson::String(value.to_string()),
            },
            SyncValue::Text(s) => Bson::String(s.clone()),
            SyncValue::Bytes(b) => Bson::Binary(bson::Binary {
                subtype: bson::spec::BinarySubtype::Generic,
                bytes: b.clone(),
            }),
            // MongoDB DateTime has millisecond precision
            SyncValue::Timestamp(dt) => Bson::DateTime(BsonDateTime::from_chrono(*dt)),
            SyncValue::Json(j) => json_to_bson(j),
        };
        BsonValue(bson)
    }
}

/// Convert a whole record into a BSON document, preserving field order.
pub fn record_to_document(record: &Record) -> Document {
    let mut doc = Document::new();
    for (field, value) in record {
        doc.insert(field.clone(), BsonValue::from(value).into_inner());
    }
    doc
}

/// Convert a JSON value into plain BSON (objects become embedded documents).
pub fn json_to_bson(value: &serde_json::Value) -> Bson {
    match value {
        serde_json::Value::Null => Bson::Null,
        serde_json::Value::Bool(b) => Bson::Boolean(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Bson::Int64(i)
            } else {
                Bson::Double(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => Bson::String(s.clone()),
        serde_json::Value::Array(items) => Bson::Array(items.iter().map(json_to_bson).collect()),
        serde_json::Value::Object(map) => {
            let mut doc = Document::new();
            for (k, v) in map {
                doc.insert(k.clone(), json_to_bson(v));
            }
            Bson::Document(doc)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    #[test]
    fn test_scalar_conversion() {
        assert_eq!(BsonValue::from(SyncValue::Null).0, Bson::Null);
        assert_eq!(BsonValue::from(SyncValue::Int64(5)).0, Bson::Int64(5));
        assert_eq!(
            BsonValue::from(SyncValue::Text("x".into())).0,
            Bson::String("x".into())
        );
    }

    #[test]
    fn test_decimal_becomes_double() {
        let d = Decimal::from_str("19.99").unwrap();
        assert_eq!(BsonValue::from(SyncValue::Decimal(d)).0, Bson::Double(19.99));
    }

    #[test]
    fn test_timestamp_conversion() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let bson = BsonValue::from(SyncValue::Timestamp(dt)).0;
        assert_eq!(bson, Bson::DateTime(BsonDateTime::from_chrono(dt)));
    }

    #[test]
    fn test_json_becomes_embedded_document() {
        let json = serde_json::json!({"city": "Oslo", "tags": [1, 2.5, null]});
        let bson = BsonValue::from(SyncValue::Json(json)).0;
        let doc = bson.as_document().unwrap();
        assert_eq!(doc.get_str("city").unwrap(), "Oslo");
        let tags = doc.get_array("tags").unwrap();
        assert_eq!(tags[0], Bson::Int64(1));
        assert_eq!(tags[1], Bson::Double(2.5));
        assert_eq!(tags[2], Bson::Null);
    }

    #[test]
    fn test_record_to_document() {
        let mut record = Record::new();
        record.insert("a".into(), SyncValue::Int64(1));
        record.insert("b".into(), SyncValue::Bool(true));
        let doc = record_to_document(&record);
        assert_eq!(doc.get_i64("a").unwrap(), 1);
        assert!(doc.get_bool("b").unwrap());
    }
}
