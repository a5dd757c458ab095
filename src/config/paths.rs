//! Directory layout of the task queue.
//!
//! ## Layout
//!
//! | Location | Purpose |
//! |----------|---------|
//! | `<root>/tasks` | Pending task descriptors |
//! | `<root>/tasks/archive` | Descriptors that have been dispatched |
//! | `<root>/logs` | One execution log per dispatch attempt |
//! | `<root>/agents` | Agent scripts referenced by the registry |

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Default glob for descriptor file names
pub const TASK_PATTERN: &str = "*.task.json";

/// Name of the advisory lock file inside the tasks directory
pub const LOCK_FILE: &str = ".queue.lock";

/// The three directories the task runner works in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuePaths {
    pub tasks: PathBuf,
    pub logs: PathBuf,
    pub archive: PathBuf,
}

impl QueuePaths {
    /// Standard layout under a project root
    pub fn under(root: &Path) -> Self {
        let tasks = root.join("tasks");
        Self {
            archive: tasks.join("archive"),
            logs: root.join("logs"),
            tasks,
        }
    }

    /// Create every directory that does not exist yet. Safe to call repeatedly.
    pub async fn ensure(&self) -> Result<()> {
        for dir in [&self.tasks, &self.logs, &self.archive] {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn lock_file(&self) -> PathBuf {
        self.tasks.join(LOCK_FILE)
    }
}

/// Directory holding agent scripts under a project root
pub fn agents_dir(root: &Path) -> PathBuf {
    root.join("agents")
}
