//! Cycle scheduling: single-shot runs with retry, and the daemon loop.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sync_core::{DocumentStore, RelationalStore, SyncStats};
use tracing::{error, info, warn};

use crate::config::SyncConfig;
use crate::engine::SyncEngine;

/// Cloneable stop flag. Stopping is idempotent and never interrupts a cycle
/// already running.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of one complete cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Statistics per mapping, keyed by mapping label.
    pub mappings: BTreeMap<String, SyncStats>,
}

impl CycleReport {
    pub fn has_errors(&self) -> bool {
        self.mappings.values().any(SyncStats::has_errors)
    }

    /// Process exit code: `0` when no mapping reported an error, `1` otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.has_errors() {
            1
        } else {
            0
        }
    }

    pub fn total_processed(&self) -> u64 {
        self.mappings.values().map(|s| s.processed).sum()
    }

    pub fn total_applied(&self) -> u64 {
        self.mappings.values().map(SyncStats::applied).sum()
    }

    pub fn total_conflicts(&self) -> u64 {
        self.mappings.values().map(|s| s.conflicts).sum()
    }

    pub fn total_errors(&self) -> usize {
        self.mappings.values().map(|s| s.errors.len()).sum()
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Sync summary ({})", self.completed_at.to_rfc3339())?;
        for (label, stats) in &self.mappings {
            writeln!(
                f,
                "  {label}: processed={} inserted={} updated={} skipped={} conflicts={} \
                 relational->document={} document->relational={} errors={} ({:.2}s)",
                stats.processed,
                stats.inserted,
                stats.updated,
                stats.skipped,
                stats.conflicts,
                stats.relational_to_document,
                stats.document_to_relational,
                stats.errors.len(),
                stats.duration_secs()
            )?;
            for err in &stats.errors {
                writeln!(f, "    error: {err}")?;
            }
        }
        write!(
            f,
            "Total: processed={} applied={} conflicts={} errors={}",
            self.total_processed(),
            self.total_applied(),
            self.total_conflicts(),
            self.total_errors()
        )
    }
}

/// Retry behaviour for cycle-level failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first failed attempt.
    pub attempts: u32,
    /// Delay before the first retry; doubled after each retry.
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay: Duration::from_secs(5),
        }
    }
}

/// Drives a [`SyncEngine`] once or on an interval.
pub struct Scheduler<R, D> {
    engine: SyncEngine<R, D>,
    interval: Duration,
    retry: RetryPolicy,
    tick: Duration,
    stop: StopHandle,
}

impl<R: RelationalStore, D: DocumentStore> Scheduler<R, D> {
    pub fn new(engine: SyncEngine<R, D>, interval: Duration, retry: RetryPolicy) -> Self {
        Self {
            engine,
            interval,
            retry,
            tick: Duration::from_secs(1),
            stop: StopHandle::new(),
        }
    }

    pub fn from_config(engine: SyncEngine<R, D>, config: &SyncConfig) -> Self {
        let retry = RetryPolicy {
            attempts: config.retry_attempts,
            initial_delay: Duration::from_secs(config.retry_delay_seconds),
        };
        Self::new(engine, Duration::from_secs(config.interval_seconds), retry)
    }

    /// Granularity at which sleeps observe the stop flag.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick.max(Duration::from_millis(1));
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn engine(&self) -> &SyncEngine<R, D> {
        &self.engine
    }

    /// Sleep for `total` in ticks. Returns `false` if stopped meanwhile.
    async fn sleep(&self, total: Duration) -> bool {
        let mut remaining = total;
        while !remaining.is_zero() {
            if self.stop.is_stopped() {
                return false;
            }
            let step = remaining.min(self.tick);
            tokio::time::sleep(step).await;
            remaining -= step;
        }
        !self.stop.is_stopped()
    }

    /// Run exactly one cycle, retrying cycle-level failures with backoff.
    pub async fn run_once(&self) -> anyhow::Result<CycleReport> {
        let started_at = Utc::now();
        let mut delay = self.retry.initial_delay;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match self.engine.sync_all().await {
                Ok(mappings) => {
                    return Ok(CycleReport {
                        started_at,
                        completed_at: Utc::now(),
                        mappings,
                    })
                }
                Err(e) if attempt <= self.retry.attempts && !self.stop.is_stopped() => {
                    warn!(
                        "Sync cycle failed (attempt {attempt} of {}): {e:#}. Retrying in {delay:?}",
                        self.retry.attempts + 1
                    );
                    if !self.sleep(delay).await {
                        return Err(e.context("Stopped while waiting to retry the sync cycle"));
                    }
                    delay = delay.saturating_mul(2);
                }
                Err(e) => {
                    return Err(e.context(format!("Sync cycle failed after {attempt} attempt(s)")))
                }
            }
        }
    }

    /// Run cycles until stopped. Returns the last successful report, if any.
    pub async fn run_continuous(&self) -> Option<CycleReport> {
        let interval = self.interval.max(self.tick);
        info!("Starting continuous sync every {interval:?}");
        let mut last = None;

        while !self.stop.is_stopped() {
            match self.run_once().await {
                Ok(report) => {
                    info!(
                        "Cycle finished: processed={} applied={} errors={}",
                        report.total_processed(),
                        report.total_applied(),
                        report.total_errors()
                    );
                    last = Some(report);
                }
                Err(e) => error!("{e:#}"),
            }
            if !self.sleep(interval).await {
                break;
            }
        }

        info!("Continuous sync stopped");
        last
    }
}
