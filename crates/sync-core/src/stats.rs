//! Per-mapping statistics for one sync cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::Origin;

/// Counters accumulated while one mapping is synchronized.
///
/// Created when the mapping starts, mutated only by the engine while the
/// cycle runs, and treated as a read-only report once [`SyncStats::finish`]
/// has been called.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStats {
    pub processed: u64,
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
    pub conflicts: u64,
    /// Writes applied to the document side.
    pub relational_to_document: u64,
    /// Writes applied to the relational side.
    pub document_to_relational: u64,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Default for SyncStats {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncStats {
    pub fn new() -> Self {
        Self {
            processed: 0,
            inserted: 0,
            updated: 0,
            skipped: 0,
            conflicts: 0,
            relational_to_document: 0,
            document_to_relational: 0,
            errors: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Count one applied write towards the side it landed on.
    pub fn record_write(&mut self, target: Origin) {
        match target {
            Origin::Document => self.relational_to_document += 1,
            Origin::Relational => self.document_to_relational += 1,
        }
    }

    pub fn push_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Total writes applied in either direction.
    pub fn applied(&self) -> u64 {
        self.relational_to_document + self.document_to_relational
    }

    /// Stamp the completion time. Idempotent.
    pub fn finish(&mut self) {
        if self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
        }
    }

    /// Wall-clock duration, available once finished.
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|done| done - self.started_at)
    }

    /// Duration in seconds, `0.0` while still running.
    pub fn duration_secs(&self) -> f64 {
        self.duration()
            .map(|d| d.num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_is_idempotent() {
        let mut stats = SyncStats::new();
        assert!(stats.duration().is_none());
        stats.finish();
        let first = stats.completed_at;
        stats.finish();
        assert_eq!(stats.completed_at, first);
        assert!(stats.duration().unwrap() >= chrono::Duration::zero());
    }

    #[test]
    fn test_record_write_direction() {
        let mut stats = SyncStats::new();
        stats.record_write(Origin::Document);
        stats.record_write(Origin::Document);
        stats.record_write(Origin::Relational);
        assert_eq!(stats.relational_to_document, 2);
        assert_eq!(stats.document_to_relational, 1);
        assert_eq!(stats.applied(), 3);
    }
}
