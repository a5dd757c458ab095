//! File-based task queue.
//!
//! Descriptors dropped into the tasks directory are dispatched to external
//! agents. The flow per descriptor:
//!
//! 1. **Queue**: point-in-time scan for `*.task.json` files
//! 2. **Registry**: resolve the descriptor's agent to an executable
//! 3. **Executor**: run the agent, capturing stdout/stderr/exit status
//! 4. **Log sink**: write one execution log per attempt
//! 5. **Archiver**: move the descriptor into the archive directory
//!
//! # Architecture
//!
//! ```text
//! tasks/*.task.json → Dispatcher → Executor → logs/<agent>_<ts>.log
//!                          ↓
//!                   tasks/archive/
//! ```
//!
//! Delivery is at-least-once: a descriptor that was executed but could not
//! be archived stays in the queue and is dispatched again on the next scan.

pub mod archive;
pub mod dispatcher;
pub mod executor;
pub mod log_sink;
pub mod queue;
pub mod registry;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use archive::Archiver;
pub use dispatcher::{Dispatcher, PollSummary};
pub use executor::{ExecutionOutput, Executor, ExecutorError, ScriptExecutor};
pub use log_sink::LogSink;
pub use queue::{QueueLock, TaskQueue};
pub use registry::{AgentRegistry, AgentSpec};

use crate::domain::TaskState;

/// Errors that stop a single descriptor from being archived
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("malformed task descriptor: {reason}")]
    Malformed { reason: String },

    #[error("missing 'agent' field")]
    MissingAgent,

    #[error("unknown or missing agent '{agent}': {reason}")]
    UnresolvedAgent { agent: String, reason: String },

    #[error("dispatch of agent '{agent}' failed: {source}")]
    Dispatch {
        agent: String,
        #[source]
        source: ExecutorError,
    },

    #[error("failed to write execution log {}: {source}", path.display())]
    LogWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to archive to {}: {reason}", destination.display())]
    Archive { destination: PathBuf, reason: String },

    #[error("dispatch aborted: {reason}")]
    Aborted { reason: String },
}

impl TaskError {
    /// Whether the descriptor needs an operator rather than another scan
    pub fn needs_inspection(&self) -> bool {
        matches!(
            self,
            Self::Malformed { .. } | Self::MissingAgent | Self::UnresolvedAgent { .. }
        )
    }
}

/// What happened to one descriptor during a scan
#[derive(Debug)]
pub enum TaskOutcome {
    /// Dispatched, logged and moved to the archive
    Archived {
        agent: String,
        log_path: PathBuf,
        archived_to: PathBuf,
        exit_code: Option<i32>,
    },

    /// Could not be resolved to an agent; left in the queue untouched
    LeftForInspection(TaskError),

    /// Failed during or after dispatch; left in the queue for the next scan
    Retry(TaskError),
}

impl TaskOutcome {
    pub(crate) fn from_error(error: TaskError) -> Self {
        if error.needs_inspection() {
            Self::LeftForInspection(error)
        } else {
            Self::Retry(error)
        }
    }

    /// Final descriptor state for this scan
    pub fn state(&self) -> TaskState {
        match self {
            Self::Archived { .. } => TaskState::Archived,
            Self::LeftForInspection(_) => TaskState::LeftForInspection,
            Self::Retry(_) => TaskState::Dispatched,
        }
    }
}

/// Outcome for one descriptor file
#[derive(Debug)]
pub struct TaskReport {
    pub file: PathBuf,
    pub outcome: TaskOutcome,
}

impl TaskReport {
    /// File name for display
    pub fn name(&self) -> String {
        display_name(&self.file)
    }
}

/// Result of one scan-and-dispatch cycle
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Per-descriptor outcomes in scan order
    pub tasks: Vec<TaskReport>,

    /// Another process held the queue lock; nothing was scanned
    pub locked_out: bool,
}

impl ScanReport {
    pub fn archived(&self) -> usize {
        self.count(TaskState::Archived)
    }

    pub fn left_for_inspection(&self) -> usize {
        self.count(TaskState::LeftForInspection)
    }

    pub fn retry(&self) -> usize {
        self.count(TaskState::Dispatched)
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn count(&self, state: TaskState) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.outcome.state() == state)
            .count()
    }
}

pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
