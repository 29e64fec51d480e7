//! Conflict resolution between two versions of the same record.
//!
//! [`resolve`] is a pure function: it only looks at the two records and the
//! strategy, performs no I/O and keeps no state. The engine decides which
//! record is side A and which is side B:
//!
//! - one-way sync: A is the source, B is the existing target version
//! - bidirectional sync: A is the relational version, B the document version

use serde::{Deserialize, Serialize};
use std::fmt;
use sync_core::{Origin, SyncRecord};
use tracing::warn;

/// How to pick a winner when both sides hold different data for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConflictStrategy {
    SourceWins,
    TargetWins,
    #[default]
    LatestWins,
    Manual,
    /// The relational version always wins.
    RelationalPriority,
    /// The document version always wins.
    DocumentPriority,
}

impl ConflictStrategy {
    /// Parse a strategy name. Unknown names fall back to
    /// [`ConflictStrategy::LatestWins`] with a warning instead of failing.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "source_wins" => Self::SourceWins,
            "target_wins" => Self::TargetWins,
            "latest_wins" => Self::LatestWins,
            "manual" => Self::Manual,
            "relational_priority" | "postgres_priority" => Self::RelationalPriority,
            "document_priority" | "mongo_priority" => Self::DocumentPriority,
            other => {
                warn!("Unknown conflict resolution strategy '{other}', falling back to latest_wins");
                Self::LatestWins
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SourceWins => "source_wins",
            Self::TargetWins => "target_wins",
            Self::LatestWins => "latest_wins",
            Self::Manual => "manual",
            Self::RelationalPriority => "relational_priority",
            Self::DocumentPriority => "document_priority",
        }
    }
}

impl From<String> for ConflictStrategy {
    fn from(name: String) -> Self {
        Self::parse(&name)
    }
}

impl From<ConflictStrategy> for String {
    fn from(strategy: ConflictStrategy) -> Self {
        strategy.as_str().to_string()
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Side A's version should be written over side B.
    SideA,
    /// Side B's version should be written over side A.
    SideB,
    /// Leave both sides untouched.
    Skip,
}

fn prefer_origin(origin: Origin, a: &SyncRecord, b: &SyncRecord) -> Resolution {
    if a.origin == origin {
        Resolution::SideA
    } else if b.origin == origin {
        Resolution::SideB
    } else {
        Resolution::SideA
    }
}

/// Decide which of two differing versions of one record wins.
pub fn resolve(strategy: ConflictStrategy, a: &SyncRecord, b: &SyncRecord) -> Resolution {
    match strategy {
        ConflictStrategy::SourceWins => Resolution::SideA,
        ConflictStrategy::TargetWins => Resolution::SideB,
        ConflictStrategy::LatestWins => match (a.updated_at, b.updated_at) {
            // Ties go to side A.
            (Some(ta), Some(tb)) if tb > ta => Resolution::SideB,
            (Some(_), Some(_)) => Resolution::SideA,
            (Some(_), None) => Resolution::SideA,
            (None, Some(_)) => Resolution::SideB,
            (None, None) => Resolution::SideA,
        },
        ConflictStrategy::Manual => {
            warn!(
                "Conflict on key {} requires manual resolution ({} vs {} version); leaving both sides unchanged",
                a.key, a.origin, b.origin
            );
            Resolution::Skip
        }
        ConflictStrategy::RelationalPriority => prefer_origin(Origin::Relational, a, b),
        ConflictStrategy::DocumentPriority => prefer_origin(Origin::Document, a, b),
    }
}
