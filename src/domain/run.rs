//! Reports describing a single pipeline run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of one triggered pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique identifier for this run
    pub run_id: Uuid,

    /// Tag of the trigger event that started the run
    pub tag: String,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// When the run finished (successfully or not)
    pub completed_at: DateTime<Utc>,

    /// How the run ended
    pub outcome: RunOutcome,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, RunOutcome::Completed { .. })
    }

    /// Wall-clock duration in milliseconds
    pub fn duration_ms(&self) -> i64 {
        (self.completed_at - self.started_at).num_milliseconds()
    }
}

/// Terminal state of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum RunOutcome {
    /// Every stage returned; `records` is the size of the batch handed to the sink
    Completed { records: usize },

    /// A stage failed and the remaining stages were skipped
    Failed { stage: String, error: String },
}
