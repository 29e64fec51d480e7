//! Table/collection pairing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Primary key used when neither configuration nor introspection provides one.
pub const DEFAULT_PRIMARY_KEY: &str = "id";

fn default_primary_key() -> String {
    DEFAULT_PRIMARY_KEY.to_string()
}

/// One unit of synchronization: a relational table paired with a document collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMapping {
    #[serde(alias = "postgres_table", alias = "table", alias = "name")]
    pub relational_table: String,

    #[serde(alias = "mongo_collection", alias = "collection")]
    pub document_collection: String,

    #[serde(default = "default_primary_key")]
    pub primary_key: String,
}

impl TableMapping {
    pub fn new(
        relational_table: impl Into<String>,
        document_collection: impl Into<String>,
        primary_key: impl Into<String>,
    ) -> Self {
        Self {
            relational_table: relational_table.into(),
            document_collection: document_collection.into(),
            primary_key: primary_key.into(),
        }
    }

    /// Label used as the key of per-mapping statistics and in log lines.
    pub fn label(&self) -> String {
        format!("{}<->{}", self.relational_table, self.document_collection)
    }
}

impl fmt::Display for TableMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} <-> {} (key: {})",
            self.relational_table, self.document_collection, self.primary_key
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_key_defaults_to_id() {
        let json = r#"{"relational_table": "users", "document_collection": "people"}"#;
        let mapping: TableMapping = serde_json::from_str(json).unwrap();
        assert_eq!(mapping.primary_key, "id");
        assert_eq!(mapping.label(), "users<->people");
    }

    #[test]
    fn test_legacy_field_names() {
        let json = r#"{"postgres_table": "orders", "mongo_collection": "orders", "primary_key": "order_id"}"#;
        let mapping: TableMapping = serde_json::from_str(json).unwrap();
        assert_eq!(mapping, TableMapping::new("orders", "orders", "order_id"));
    }
}
