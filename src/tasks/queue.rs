//! Task queue directory: setup, discovery and locking.
//!
//! Discovery is a point-in-time scan, not a watch. Callers poll. Restarting
//! mid-scan is safe because anything not yet archived is simply found again.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;
use glob::Pattern;

use crate::config::paths::{QueuePaths, LOCK_FILE};

/// The tasks directory and its descriptor naming convention
#[derive(Debug, Clone)]
pub struct TaskQueue {
    paths: QueuePaths,
    pattern: Pattern,
}

impl TaskQueue {
    /// Create a queue matching descriptor file names against `pattern`
    pub fn new(paths: QueuePaths, pattern: &str) -> Result<Self> {
        let pattern = Pattern::new(pattern)
            .with_context(|| format!("Invalid task file pattern: {}", pattern))?;
        Ok(Self { paths, pattern })
    }

    pub fn paths(&self) -> &QueuePaths {
        &self.paths
    }

    /// Create the tasks, logs and archive directories if absent
    pub async fn ensure_directories(&self) -> Result<()> {
        self.paths.ensure().await
    }

    /// Whether a path names a descriptor file. The queue lock never does,
    /// whatever the pattern.
    pub fn is_descriptor(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(|n| n != LOCK_FILE && self.pattern.matches(n))
            .unwrap_or(false)
    }

    /// List descriptor files currently in the queue, sorted by name
    pub async fn scan(&self) -> Result<Vec<PathBuf>> {
        let mut found = Vec::new();

        let mut entries = tokio::fs::read_dir(&self.paths.tasks)
            .await
            .with_context(|| format!("Failed to read tasks directory: {}", self.paths.tasks.display()))?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();

            if !self.is_descriptor(&path) {
                continue;
            }

            match entry.file_type().await {
                Ok(file_type) if file_type.is_file() => found.push(path),
                _ => continue,
            }
        }

        found.sort();
        Ok(found)
    }

    /// Take the exclusive queue lock without blocking.
    ///
    /// Returns `None` if another scan (in this or another process) holds it.
    pub fn try_lock(&self) -> Result<Option<QueueLock>> {
        let path = self.paths.lock_file();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)
            .with_context(|| format!("Failed to open queue lock: {}", path.display()))?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(QueueLock { file })),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to lock queue: {}", path.display())),
        }
    }
}

/// Exclusive hold on the task queue, released on drop
#[derive(Debug)]
pub struct QueueLock {
    file: File,
}

impl Drop for QueueLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
