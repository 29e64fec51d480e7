//! PostgreSQL relational store for datasync.
//!
//! [`PostgresStore`] implements [`sync_core::RelationalStore`] on top of
//! `tokio-postgres`. Values cross the boundary through the
//! `postgresql-types` crate.

mod client;
mod config;
mod store;

pub use client::ClientPool;
pub use config::{PoolConfig, PostgresConfig};
pub use store::{quote_ident, upsert_statement, PostgresStore};
