//! MongoDB document store for datasync.
//!
//! [`MongoStore`] implements [`sync_core::DocumentStore`] with the official
//! `mongodb` driver. Documents cross the boundary through the
//! `mongodb-types` crate.

mod config;
mod store;

pub use config::{MongoConfig, MongoOptions};
pub use store::MongoStore;
