//! Command-line interface for datasync
//!
//! # Usage Examples
//!
//! ```bash
//! # Single cycle, summary printed, exit code 1 if any mapping had errors
//! datasync --config config.yaml --once
//!
//! # Daemon loop at the configured interval until Ctrl-C / SIGTERM
//! datasync --config config.yaml --continuous
//!
//! # Restrict to one table
//! datasync --once --table users
//! ```

use anyhow::Context;
use clap::Parser;
use datasync::config::{resolve_config_path, Config};
use datasync::{logging, Scheduler, StopHandle, SyncEngine, SyncOpts};
use datasync_mongodb::MongoStore;
use datasync_postgresql::PostgresStore;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "datasync")]
#[command(about = "Synchronize PostgreSQL tables with MongoDB collections")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    opts: SyncOpts,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match run().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}

/// Stop `handle` on Ctrl-C or, on unix, SIGTERM.
fn install_shutdown_handler(handle: StopHandle) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {e}");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }

        info!("Shutdown signal received, stopping after the current cycle");
        handle.stop();
    });
}

async fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();
    let opts = cli.opts;

    let path = resolve_config_path(opts.config.clone());
    let config = Config::load(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    logging::init(opts.verbose, &config.logging.level);
    info!("Loaded configuration from {}", path.display());

    let relational = PostgresStore::connect(&config.postgresql)
        .await
        .with_context(|| format!("Failed to connect to PostgreSQL at {}", config.postgresql.describe()))?;
    let document = MongoStore::connect(&config.mongodb)
        .await
        .with_context(|| format!("Failed to connect to MongoDB at {}", config.mongodb.describe()))?;
    info!("Using MongoDB database '{}'", document.database_name());
    let document = Arc::new(document);

    let engine = SyncEngine::new(
        Arc::new(relational),
        document.clone(),
        config.sync.engine_settings(),
        config.sync.mappings.clone(),
    )
    .with_table_filter(opts.table.clone());
    let scheduler = Scheduler::from_config(engine, &config.sync);
    install_shutdown_handler(scheduler.stop_handle());

    let outcome = if opts.run_continuously(config.sync.interval_seconds) {
        let last = scheduler.run_continuous().await;
        Ok(last.map_or(0, |report| report.exit_code()))
    } else {
        scheduler.run_once().await.map(|report| {
            println!("{report}");
            report.exit_code()
        })
    };

    document.shutdown().await;
    outcome
}
