//! [`RelationalStore`] implementation for PostgreSQL.

use async_trait::async_trait;
use postgresql_types::{row_to_record, ConversionError, PostgreSQLValue};
use sync_core::{Origin, Record, RecordStore, RelationalStore, StoreError, SyncValue};
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Statement};
use tracing::{debug, warn};

use crate::client::ClientPool;
use crate::config::PostgresConfig;

/// Quote an identifier for interpolation into SQL, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Build the upsert statement for `columns`, which must include `key_field`.
///
/// The statement returns one row with a boolean `inserted` column when a row
/// was written, and no row when the record only carries the key and the row
/// already exists.
pub fn upsert_statement(table: &str, key_field: &str, columns: &[&str]) -> String {
    let column_list = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=columns.len())
        .map(|i| format!("${i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let updates = columns
        .iter()
        .filter(|c| **c != key_field)
        .map(|c| format!("{0} = EXCLUDED.{0}", quote_ident(c)))
        .collect::<Vec<_>>();
    let on_conflict = if updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", updates.join(", "))
    };

    format!(
        "INSERT INTO {} ({column_list}) VALUES ({placeholders}) ON CONFLICT ({}) {on_conflict} RETURNING (xmax = 0) AS inserted",
        quote_ident(table),
        quote_ident(key_field),
    )
}

fn classify(err: tokio_postgres::Error) -> StoreError {
    if err.is_closed() {
        return StoreError::Connection(err.to_string());
    }
    match err.code() {
        Some(code) if *code == SqlState::UNDEFINED_TABLE => StoreError::NotFound(err.to_string()),
        // Class 08 (connection exception) and 28 (invalid authorization)
        Some(code) if code.code().starts_with("08") || code.code().starts_with("28") => {
            StoreError::Connection(err.to_string())
        }
        Some(_) => StoreError::Query(err.to_string()),
        None => match err.as_db_error() {
            Some(db) => StoreError::Query(db.to_string()),
            None => StoreError::Connection(err.to_string()),
        },
    }
}

fn conversion(err: ConversionError) -> StoreError {
    StoreError::Conversion(err.to_string())
}

/// Bind `values` against the statement's parameter types.
fn bind_params(
    statement: &Statement,
    values: &[&SyncValue],
) -> Result<Vec<Box<dyn ToSql + Sync + Send>>, StoreError> {
    statement
        .params()
        .iter()
        .zip(values)
        .map(|(ty, value)| {
            PostgreSQLValue::from_sync(value, ty)
                .map(|pg| pg.to_param())
                .map_err(conversion)
        })
        .collect()
}

/// PostgreSQL-backed relational store.
pub struct PostgresStore {
    pool: ClientPool,
}

impl PostgresStore {
    /// Connect using `config` and verify the server answers.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, StoreError> {
        let pool = ClientPool::connect(config).await?;
        debug!(
            "Connected to PostgreSQL at {} with {} client(s)",
            config.describe(),
            pool.size()
        );
        Ok(Self { pool })
    }

    async fn query_records(
        client: &Client,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Record>, StoreError> {
        let rows = client.query(sql, params).await.map_err(classify)?;
        rows.iter()
            .map(|row| row_to_record(row).map_err(conversion))
            .collect()
    }
}

#[async_trait]
impl RecordStore for PostgresStore {
    fn origin(&self) -> Origin {
        Origin::Relational
    }

    async fn list_entities(&self) -> Result<Vec<String>, StoreError> {
        let client = self.pool.acquire().await;
        let rows = client
            .query(
                "SELECT table_name::text FROM information_schema.tables \
                 WHERE table_schema = 'public' AND table_type = 'BASE TABLE' \
                 ORDER BY table_name",
                &[],
            )
            .await
            .map_err(classify)?;
        rows.iter()
            .map(|row| row.try_get::<_, String>(0).map_err(classify))
            .collect()
    }

    async fn count(&self, entity: &str) -> Result<u64, StoreError> {
        let client = self.pool.acquire().await;
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(entity));
        let row = client.query_one(&sql, &[]).await.map_err(classify)?;
        let count: i64 = row.try_get(0).map_err(classify)?;
        Ok(count.max(0) as u64)
    }

    async fn fetch_page(
        &self,
        entity: &str,
        order_key: &str,
        limit: usize,
        offset: u64,
    ) -> Result<Vec<Record>, StoreError> {
        let client = self.pool.acquire().await;
        let sql = format!(
            "SELECT * FROM {} ORDER BY {} LIMIT $1 OFFSET $2",
            quote_ident(entity),
            quote_ident(order_key)
        );
        let limit = limit as i64;
        let offset = offset as i64;
        Self::query_records(&client, &sql, &[&limit, &offset]).await
    }

    async fn get_one(
        &self,
        entity: &str,
        key_field: &str,
        key: &SyncValue,
    ) -> Result<Option<Record>, StoreError> {
        let client = self.pool.acquire().await;
        let sql = format!(
            "SELECT * FROM {} WHERE {} = $1 LIMIT 1",
            quote_ident(entity),
            quote_ident(key_field)
        );
        let statement = client.prepare(&sql).await.map_err(classify)?;
        let params = bind_params(&statement, &[key])?;
        let refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();
        let row = client
            .query_opt(&statement, &refs)
            .await
            .map_err(classify)?;
        row.as_ref()
            .map(row_to_record)
            .transpose()
            .map_err(conversion)
    }

    async fn upsert(
        &self,
        entity: &str,
        key_field: &str,
        record: &Record,
    ) -> Result<bool, StoreError> {
        if record.get(key_field).map_or(true, SyncValue::is_null) {
            return Err(StoreError::Conversion(format!(
                "record has no value for key column '{key_field}'"
            )));
        }

        let columns: Vec<&str> = record.keys().map(String::as_str).collect();
        let values: Vec<&SyncValue> = record.values().collect();
        let sql = upsert_statement(entity, key_field, &columns);

        let client = self.pool.acquire().await;
        let statement = client.prepare(&sql).await.map_err(classify)?;
        let params = bind_params(&statement, &values)?;
        let refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();
        let row = client
            .query_opt(&statement, &refs)
            .await
            .map_err(classify)?;

        match row {
            Some(row) => row.try_get::<_, bool>("inserted").map_err(classify),
            None => Ok(false),
        }
    }
}

#[async_trait]
impl RelationalStore for PostgresStore {
    async fn primary_key_of(&self, table: &str) -> Result<Option<String>, StoreError> {
        let client = self.pool.acquire().await;
        let qualified = format!("public.{}", quote_ident(table));
        let rows = client
            .query(
                "SELECT a.attname::text \
                 FROM pg_index i \
                 JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey) \
                 WHERE i.indrelid = $1::text::regclass AND i.indisprimary \
                 ORDER BY array_position(i.indkey, a.attnum)",
                &[&qualified],
            )
            .await
            .map_err(classify)?;

        let columns: Vec<String> = rows
            .iter()
            .map(|row| row.try_get::<_, String>(0))
            .collect::<Result<_, _>>()
            .map_err(classify)?;

        match columns.as_slice() {
            [] => {
                warn!("Table '{table}' has no primary key constraint");
                Ok(None)
            }
            [single] => Ok(Some(single.clone())),
            [first, ..] => {
                warn!(
                    "Table '{table}' has a composite primary key ({}); using '{first}'",
                    columns.join(", ")
                );
                Ok(Some(first.clone()))
            }
        }
    }

    async fn columns_of(&self, table: &str) -> Result<Vec<String>, StoreError> {
        let client = self.pool.acquire().await;
        let rows = client
            .query(
                "SELECT column_name::text FROM information_schema.columns \
                 WHERE table_schema = 'public' AND table_name = $1 \
                 ORDER BY ordinal_position",
                &[&table],
            )
            .await
            .map_err(classify)?;
        let columns: Vec<String> = rows
            .iter()
            .map(|row| row.try_get::<_, String>(0))
            .collect::<Result<_, _>>()
            .map_err(classify)?;
        if columns.is_empty() {
            return Err(StoreError::NotFound(format!("table '{table}'")));
        }
        Ok(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_upsert_statement_updates_non_key_columns() {
        let sql = upsert_statement("users", "id", &["email", "id", "name"]);
        assert_eq!(
            sql,
            "INSERT INTO \"users\" (\"email\", \"id\", \"name\") VALUES ($1, $2, $3) \
             ON CONFLICT (\"id\") DO UPDATE SET \"email\" = EXCLUDED.\"email\", \
             \"name\" = EXCLUDED.\"name\" RETURNING (xmax = 0) AS inserted"
        );
    }

    #[test]
    fn test_upsert_statement_key_only() {
        let sql = upsert_statement("tags", "id", &["id"]);
        assert_eq!(
            sql,
            "INSERT INTO \"tags\" (\"id\") VALUES ($1) ON CONFLICT (\"id\") DO NOTHING \
             RETURNING (xmax = 0) AS inserted"
        );
    }
}
