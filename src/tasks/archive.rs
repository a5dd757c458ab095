//! Archiver: the single point past which a descriptor counts as done.

use std::path::{Path, PathBuf};

use super::TaskError;

/// Moves dispatched descriptors into the archive directory
#[derive(Debug, Clone)]
pub struct Archiver {
    dir: PathBuf,
}

impl Archiver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Rename `file` into the archive under its original name.
    ///
    /// An archive entry with the same name is never replaced; the descriptor
    /// stays queued instead.
    pub async fn archive(&self, file: &Path) -> Result<PathBuf, TaskError> {
        let name = file.file_name().ok_or_else(|| TaskError::Archive {
            destination: self.dir.clone(),
            reason: format!("{} has no file name", file.display()),
        })?;
        let destination = self.dir.join(name);

        match tokio::fs::try_exists(&destination).await {
            Ok(false) => {}
            Ok(true) => {
                return Err(TaskError::Archive {
                    destination,
                    reason: "an archived task with this name already exists".to_string(),
                })
            }
            Err(e) => {
                return Err(TaskError::Archive {
                    destination,
                    reason: e.to_string(),
                })
            }
        }

        tokio::fs::rename(file, &destination)
            .await
            .map_err(|e| TaskError::Archive {
                destination: destination.clone(),
                reason: e.to_string(),
            })?;

        Ok(destination)
    }
}
