//! Datasync Library
//!
//! Keeps PostgreSQL tables and MongoDB collections in sync, one-way in
//! either direction or bidirectionally with conflict resolution.
//!
//! # Components
//!
//! - [`convert`] - row/document shape conversion and payload comparison
//! - [`resolver`] - conflict resolution strategies
//! - [`engine`] - per-mapping synchronization over the store traits
//! - [`scheduler`] - single-shot and continuous cycle driver
//! - [`config`] - YAML configuration with `${VAR}` substitution
//!
//! Store adapters live in their own crates (`datasync_postgresql`,
//! `datasync_mongodb`); value conversions in `postgresql_types` and
//! `mongodb_types`; shared types and traits in `sync_core`.
//!
//! # CLI Usage
//!
//! ```bash
//! # One cycle using ./config.yaml
//! datasync --once
//!
//! # Daemon loop, one table only
//! datasync --config /etc/datasync.yaml --continuous --table users
//! ```

use clap::Parser;
use std::path::PathBuf;

pub mod config;
pub mod convert;
pub mod engine;
pub mod logging;
pub mod resolver;
pub mod scheduler;
pub mod testing;

pub use config::{Config, ConfigError, SyncConfig};
pub use engine::{EngineSettings, SyncDirection, SyncEngine};
pub use resolver::{resolve, ConflictStrategy, Resolution};
pub use scheduler::{CycleReport, RetryPolicy, Scheduler, StopHandle};

#[derive(Parser, Clone, Debug, Default)]
pub struct SyncOpts {
    /// Configuration file
    #[arg(long, short = 'c', env = "DATASYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Run a single cycle and exit
    #[arg(long, conflicts_with = "continuous")]
    pub once: bool,

    /// Run cycles until interrupted
    #[arg(long)]
    pub continuous: bool,

    /// Only sync the mapping for this relational table
    #[arg(long)]
    pub table: Option<String>,

    /// Enable debug logging
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl SyncOpts {
    /// Whether to run the daemon loop given the configured interval.
    pub fn run_continuously(&self, interval_seconds: u64) -> bool {
        if self.once {
            return false;
        }
        self.continuous || interval_seconds > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_selection() {
        let opts = SyncOpts::parse_from(["datasync", "--once"]);
        assert!(!opts.run_continuously(60));

        let opts = SyncOpts::parse_from(["datasync", "--continuous", "--table", "users"]);
        assert!(opts.run_continuously(0));
        assert_eq!(opts.table.as_deref(), Some("users"));

        let opts = SyncOpts::parse_from(["datasync"]);
        assert!(!opts.run_continuously(0));
        assert!(opts.run_continuously(30));

        assert!(SyncOpts::try_parse_from(["datasync", "--once", "--continuous"]).is_err());
    }
}
