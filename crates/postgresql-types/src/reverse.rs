//! Reverse conversion: PostgreSQL row → Record
//!
//! Each column is read with the Rust type matching its declared PostgreSQL
//! type and mapped into the closed [`SyncValue`] set.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use postgres_types::Type;
use rust_decimal::Decimal;
use sync_core::{Record, SyncValue};
use tokio_postgres::Row;

use crate::ConversionError;

/// Convert every column of `row` into a [`Record`].
pub fn row_to_record(row: &Row) -> Result<Record, ConversionError> {
    let mut record = Record::new();
    for (index, column) in row.columns().iter().enumerate() {
        let value = column_to_sync_value(row, index)?;
        record.insert(column.name().to_string(), value);
    }
    Ok(record)
}

/// Convert a single column of `row`.
pub fn column_to_sync_value(row: &Row, index: usize) -> Result<SyncValue, ConversionError> {
    let column = &row.columns()[index];
    let pg_type = column.type_();
    let read_err = |source| ConversionError::Column {
        column: column.name().to_string(),
        source,
    };

    let value = match *pg_type {
        Type::BOOL => row
            .try_get::<_, Option<bool>>(index)
            .map_err(read_err)?
            .into(),
        Type::INT2 => row
            .try_get::<_, Option<i16>>(index)
            .map_err(read_err)?
            .map(i64::from)
            .into(),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(index)
            .map_err(read_err)?
            .map(i64::from)
            .into(),
        Type::INT8 => row
            .try_get::<_, Option<i64>>(index)
            .map_err(read_err)?
            .into(),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(index)
            .map_err(read_err)?
            .map(f64::from)
            .into(),
        Type::FLOAT8 => row
            .try_get::<_, Option<f64>>(index)
            .map_err(read_err)?
            .into(),
        Type::NUMERIC => row
            .try_get::<_, Option<Decimal>>(index)
            .map_err(read_err)?
            .into(),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => row
            .try_get::<_, Option<String>>(index)
            .map_err(read_err)?
            .into(),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(index)
            .map_err(read_err)?
            .map(|ts| DateTime::<Utc>::from_naive_utc_and_offset(ts, Utc))
            .into(),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(index)
            .map_err(read_err)?
            .into(),
        Type::DATE => match row.try_get::<_, Option<NaiveDate>>(index).map_err(read_err)? {
            Some(date) => {
                let midnight = date.and_time(NaiveTime::MIN);
                SyncValue::Timestamp(DateTime::<Utc>::from_naive_utc_and_offset(midnight, Utc))
            }
            None => SyncValue::Null,
        },
        Type::TIME => row
            .try_get::<_, Option<NaiveTime>>(index)
            .map_err(read_err)?
            .map(|t| t.to_string())
            .into(),
        Type::UUID => row
            .try_get::<_, Option<uuid::Uuid>>(index)
            .map_err(read_err)?
            .map(|u| u.to_string())
            .into(),
        Type::BYTEA => row
            .try_get::<_, Option<Vec<u8>>>(index)
            .map_err(read_err)?
            .into(),
        Type::JSON | Type::JSONB => match row
            .try_get::<_, Option<serde_json::Value>>(index)
            .map_err(read_err)?
        {
            Some(json) => SyncValue::Json(json),
            None => SyncValue::Null,
        },
        _ => match row.try_get::<_, Option<String>>(index) {
            Ok(text) => text.into(),
            Err(_) => {
                return Err(ConversionError::UnsupportedType(format!(
                    "{} (column '{}')",
                    pg_type.name(),
                    column.name()
                )))
            }
        },
    };

    Ok(value)
}
