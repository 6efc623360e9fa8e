//! Per-record outcomes and cycle summaries

use crate::error::DavError;
use chrono::{DateTime, Utc};
use std::fmt;

/// Result of reconciling one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Created,
    Updated,
    Unchanged,
    Skipped(String),
    Failed(DavError),
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
            Self::Unchanged => write!(f, "unchanged"),
            Self::Skipped(reason) => write!(f, "skipped ({})", reason),
            Self::Failed(e) => write!(f, "failed ({})", e),
        }
    }
}

/// Outcome tagged with the record it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
    pub identity_key: String,
    pub display_name: String,
    pub outcome: SyncOutcome,
}

/// Summary of one sync cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<RecordOutcome>,
}

impl CycleReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: started_at,
            outcomes: Vec::new(),
        }
    }

    pub fn push(
        &mut self,
        identity_key: impl Into<String>,
        display_name: impl Into<String>,
        outcome: SyncOutcome,
    ) {
        self.outcomes.push(RecordOutcome {
            identity_key: identity_key.into(),
            display_name: display_name.into(),
            outcome,
        });
    }

    fn count(&self, pred: impl Fn(&SyncOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.outcome)).count()
    }

    pub fn created(&self) -> usize {
        self.count(|o| matches!(o, SyncOutcome::Created))
    }

    pub fn updated(&self) -> usize {
        self.count(|o| matches!(o, SyncOutcome::Updated))
    }

    pub fn unchanged(&self) -> usize {
        self.count(|o| matches!(o, SyncOutcome::Unchanged))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, SyncOutcome::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, SyncOutcome::Failed(_)))
    }

    /// Failed outcomes only
    pub fn failures(&self) -> impl Iterator<Item = &RecordOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, SyncOutcome::Failed(_)))
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} records: {} created, {} updated, {} unchanged, {} skipped, {} failed ({} ms)",
            self.outcomes.len(),
            self.created(),
            self.updated(),
            self.unchanged(),
            self.skipped(),
            self.failed(),
            self.duration().num_milliseconds()
        )
    }
}
