//! MongoDB/BSON type conversions for sync-core values.
//!
//! # Modules
//!
//! - [`forward`] - SyncValue → BSON value conversion
//! - [`reverse`] - BSON value → SyncValue conversion
//!
//! # Example
//!
//! ```ignore
//! use mongodb_types::{document_to_record, record_to_document};
//!
//! let doc = record_to_document(&record);
//! let back = document_to_record(&doc);
//! ```

pub mod forward;
pub mod reverse;

pub use forward::{json_to_bson, record_to_document, BsonValue};
pub use reverse::{bson_to_json, bson_to_sync_value, document_to_record};
