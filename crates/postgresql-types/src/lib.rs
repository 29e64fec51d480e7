//! PostgreSQL type conversions for sync-core values.
//!
//! # Modules
//!
//! - [`forward`] - SyncValue → PostgreSQL parameter, driven by the target column type
//! - [`reverse`] - PostgreSQL row column → SyncValue
//!
//! # Example
//!
//! ```ignore
//! use postgresql_types::PostgreSQLValue;
//! use sync_core::SyncValue;
//! use tokio_postgres::types::Type;
//!
//! let pg = PostgreSQLValue::from_sync(&SyncValue::Int64(7), &Type::INT4)?;
//! let param = pg.to_param();
//! ```

pub mod forward;
pub mod reverse;

pub use forward::{PgNull, PostgreSQLValue};
pub use reverse::{column_to_sync_value, row_to_record};

use thiserror::Error;

/// Errors raised while converting between PostgreSQL and sync-core values.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// The column type has no mapping
    #[error("Unsupported PostgreSQL type: {0}")]
    UnsupportedType(String),

    /// The value cannot be stored in a column of the given type
    #[error("Cannot store {value} value in {pg_type} column")]
    TypeMismatch { value: String, pg_type: String },

    /// The value does not fit the target type
    #[error("Value out of range for {pg_type}: {value}")]
    OutOfRange { value: String, pg_type: String },

    /// Text could not be parsed into the target type
    #[error("Invalid {pg_type} literal '{value}'")]
    Parse { value: String, pg_type: String },

    /// Reading the column from the row failed
    #[error("Failed to read column '{column}': {source}")]
    Column {
        column: String,
        #[source]
        source: tokio_postgres::Error,
    },
}
