//! Forward conversion: SyncValue → PostgreSQL value
//!
//! The engine only knows the closed [`SyncValue`] set, while PostgreSQL binds
//! parameters strictly by column type. Conversion therefore always takes the
//! target [`Type`] (as reported by the prepared statement) into account.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use bytes::BytesMut;
use postgres_types::{to_sql_checked, IsNull, Type};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;
use sync_core::SyncValue;
use tokio_postgres::types::ToSql;
use uuid::Uuid;

use crate::ConversionError;

/// PostgreSQL value wrapper for type-safe parameter binding.
#[derive(Debug, Clone, PartialEq)]
pub enum PostgreSQLValue {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    /// Timestamp without timezone
    Timestamp(NaiveDateTime),
    /// Timestamp with timezone
    TimestampTz(DateTime<Utc>),
    Json(serde_json::Value),
}

fn is_text_type(ty: &Type) -> bool {
    matches!(*ty, Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME)
}

fn mismatch(value: &SyncValue, ty: &Type) -> ConversionError {
    ConversionError::TypeMismatch {
        value: value.type_name().to_string(),
        pg_type: ty.name().to_string(),
    }
}

fn out_of_range(value: impl ToString, ty: &Type) -> ConversionError {
    ConversionError::OutOfRange {
        value: value.to_string(),
        pg_type: ty.name().to_string(),
    }
}

fn parse_error(value: &str, ty: &Type) -> ConversionError {
    ConversionError::Parse {
        value: value.to_string(),
        pg_type: ty.name().to_string(),
    }
}

impl PostgreSQLValue {
    /// Convert `value` for storage in a column of type `ty`.
    pub fn from_sync(value: &SyncValue, ty: &Type) -> Result<Self, ConversionError> {
        match value {
            SyncValue::Null => Ok(PostgreSQLValue::Null),
            SyncValue::Bool(b) => from_bool(*b, value, ty),
            SyncValue::Int64(i) => from_int(*i, value, ty),
            SyncValue::Float64(f) => from_float(*f, value, ty),
            SyncValue::Decimal(d) => from_decimal(*d, value, ty),
            SyncValue::Text(s) => from_text(s, ty),
            SyncValue::Bytes(b) => match *ty {
                Type::BYTEA => Ok(PostgreSQLValue::Bytes(b.clone())),
                _ => Err(mismatch(value, ty)),
            },
            SyncValue::Timestamp(dt) => from_timestamp(*dt, value, ty),
            SyncValue::Json(j) => match *ty {
                Type::JSON | Type::JSONB => Ok(PostgreSQLValue::Json(j.clone())),
                ref t if is_text_type(t) => Ok(PostgreSQLValue::Text(j.to_string())),
                _ => Err(mismatch(value, ty)),
            },
        }
    }

    /// Box the value as a query parameter.
    ///
    /// NULL is bound as [`PgNull`], so it passes the driver's type check
    /// whatever the column type.
    pub fn to_param(&self) -> Box<dyn ToSql + Sync + Send> {
        match self {
            PostgreSQLValue::Null => Box::new(PgNull),
            PostgreSQLValue::Bool(b) => Box::new(*b),
            PostgreSQLValue::Int16(i) => Box::new(*i),
            PostgreSQLValue::Int32(i) => Box::new(*i),
            PostgreSQLValue::Int64(i) => Box::new(*i),
            PostgreSQLValue::Float32(f) => Box::new(*f),
            PostgreSQLValue::Float64(f) => Box::new(*f),
            PostgreSQLValue::Decimal(d) => Box::new(*d),
            PostgreSQLValue::Text(s) => Box::new(s.clone()),
            PostgreSQLValue::Bytes(b) => Box::new(b.clone()),
            PostgreSQLValue::Uuid(u) => Box::new(*u),
            PostgreSQLValue::Date(d) => Box::new(*d),
            PostgreSQLValue::Time(t) => Box::new(*t),
            PostgreSQLValue::Timestamp(ts) => Box::new(*ts),
            PostgreSQLValue::TimestampTz(ts) => Box::new(*ts),
            PostgreSQLValue::Json(j) => Box::new(j.clone()),
        }
    }
}

/// NULL parameter accepted for a column of any type.
#[derive(Debug, Clone, Copy)]
pub struct PgNull;

impl ToSql for PgNull {
    fn to_sql(
        &self,
        _ty: &Type,
        _out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        Ok(IsNull::Yes)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn from_bool(b: bool, value: &SyncValue, ty: &Type) -> Result<PostgreSQLValue, ConversionError> {
    match *ty {
        Type::BOOL => Ok(PostgreSQLValue::Bool(b)),
        Type::JSON | Type::JSONB => Ok(PostgreSQLValue::Json(serde_json::Value::Bool(b))),
        ref t if is_text_type(t) => Ok(PostgreSQLValue::Text(b.to_string())),
        _ => Err(mismatch(value, ty)),
    }
}

fn from_int(i: i64, value: &SyncValue, ty: &Type) -> Result<PostgreSQLValue, ConversionError> {
    match *ty {
        Type::INT2 => i16::try_from(i)
            .map(PostgreSQLValue::Int16)
            .map_err(|_| out_of_range(i, ty)),
        Type::INT4 => i32::try_from(i)
            .map(PostgreSQLValue::Int32)
            .map_err(|_| out_of_range(i, ty)),
        Type::INT8 => Ok(PostgreSQLValue::Int64(i)),
        Type::FLOAT4 => Ok(PostgreSQLValue::Float32(i as f32)),
        Type::FLOAT8 => Ok(PostgreSQLValue::Float64(i as f64)),
        Type::NUMERIC => Ok(PostgreSQLValue::Decimal(Decimal::from(i))),
        Type::JSON | Type::JSONB => Ok(PostgreSQLValue::Json(serde_json::Value::from(i))),
        ref t if is_text_type(t) => Ok(PostgreSQLValue::Text(i.to_string())),
        _ => Err(mismatch(value, ty)),
    }
}

fn from_float(f: f64, value: &SyncValue, ty: &Type) -> Result<PostgreSQLValue, ConversionError> {
    match *ty {
        Type::FLOAT4 => Ok(PostgreSQLValue::Float32(f as f32)),
        Type::FLOAT8 => Ok(PostgreSQLValue::Float64(f)),
        Type::NUMERIC => Decimal::try_from(f)
            .map(PostgreSQLValue::Decimal)
            .map_err(|_| out_of_range(f, ty)),
        Type::INT2 | Type::INT4 | Type::INT8 => {
            if f.fract() != 0.0 || !f.is_finite() {
                return Err(out_of_range(f, ty));
            }
            from_int(f as i64, value, ty)
        }
        Type::JSON | Type::JSONB => Ok(PostgreSQLValue::Json(serde_json::Value::from(f))),
        ref t if is_text_type(t) => Ok(PostgreSQLValue::Text(f.to_string())),
        _ => Err(mismatch(value, ty)),
    }
}

fn from_decimal(
    d: Decimal,
    value: &SyncValue,
    ty: &Type,
) -> Result<PostgreSQLValue, ConversionError> {
    match *ty {
        Type::NUMERIC => Ok(PostgreSQLValue::Decimal(d)),
        Type::FLOAT4 | Type::FLOAT8 => {
            let f = d.to_f64().ok_or_else(|| out_of_range(d, ty))?;
            from_float(f, value, ty)
        }
        Type::INT2 | Type::INT4 | Type::INT8 => {
            if !d.fract().is_zero() {
                return Err(out_of_range(d, ty));
            }
            let i = d.to_i64().ok_or_else(|| out_of_range(d, ty))?;
            from_int(i, value, ty)
        }
        ref t if is_text_type(t) => Ok(PostgreSQLValue::Text(d.to_string())),
        _ => Err(mismatch(value, ty)),
    }
}

fn from_timestamp(
    dt: DateTime<Utc>,
    value: &SyncValue,
    ty: &Type,
) -> Result<PostgreSQLValue, ConversionError> {
    match *ty {
        Type::TIMESTAMPTZ => Ok(PostgreSQLValue::TimestampTz(dt)),
        Type::TIMESTAMP => Ok(PostgreSQLValue::Timestamp(dt.naive_utc())),
        Type::DATE => Ok(PostgreSQLValue::Date(dt.date_naive())),
        Type::TIME => Ok(PostgreSQLValue::Time(dt.time())),
        ref t if is_text_type(t) => Ok(PostgreSQLValue::Text(dt.to_rfc3339())),
        _ => Err(mismatch(value, ty)),
    }
}

/// Text is the lingua franca of the document side, so it is parsed into
/// whatever the column wants.
fn from_text(s: &str, ty: &Type) -> Result<PostgreSQLValue, ConversionError> {
    match *ty {
        Type::BOOL => match s.to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "1" => Ok(PostgreSQLValue::Bool(true)),
            "false" | "f" | "no" | "0" => Ok(PostgreSQLValue::Bool(false)),
            _ => Err(parse_error(s, ty)),
        },
        Type::INT2 | Type::INT4 | Type::INT8 => {
            let i = i64::from_str(s.trim()).map_err(|_| parse_error(s, ty))?;
            from_int(i, &SyncValue::Int64(i), ty)
        }
        Type::FLOAT4 => f32::from_str(s.trim())
            .map(PostgreSQLValue::Float32)
            .map_err(|_| parse_error(s, ty)),
        Type::FLOAT8 => f64::from_str(s.trim())
            .map(PostgreSQLValue::Float64)
            .map_err(|_| parse_error(s, ty)),
        Type::NUMERIC => Decimal::from_str(s.trim())
            .map(PostgreSQLValue::Decimal)
            .map_err(|_| parse_error(s, ty)),
        Type::UUID => Uuid::parse_str(s)
            .map(PostgreSQLValue::Uuid)
            .map_err(|_| parse_error(s, ty)),
        Type::TIMESTAMPTZ | Type::TIMESTAMP | Type::DATE => {
            if let Some(dt) = SyncValue::Text(s.to_string()).as_timestamp() {
                return from_timestamp(dt, &SyncValue::Timestamp(dt), ty);
            }
            match *ty {
                Type::DATE => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .map(PostgreSQLValue::Date)
                    .map_err(|_| parse_error(s, ty)),
                Type::TIMESTAMP => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                    .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
                    .map(PostgreSQLValue::Timestamp)
                    .map_err(|_| parse_error(s, ty)),
                _ => Err(parse_error(s, ty)),
            }
        }
        Type::TIME => NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
            .map(PostgreSQLValue::Time)
            .map_err(|_| parse_error(s, ty)),
        Type::JSON | Type::JSONB => Ok(PostgreSQLValue::Json(
            serde_json::from_str(s).unwrap_or_else(|_| serde_json::Value::String(s.to_string())),
        )),
        Type::BYTEA => Ok(PostgreSQLValue::Bytes(s.as_bytes().to_vec())),
        // Let the server coerce anything else (enums, domains) from text.
        _ => Ok(PostgreSQLValue::Text(s.to_string())),
    }
}
