//! Execution logs: one immutable file per dispatch attempt.
//!
//! File name: `<agent>_<YYYYmmdd_HHMMSS>.log` (UTC). A second attempt for the
//! same agent within the same second gets a `-1`, `-2`, ... suffix; existing
//! logs are never overwritten.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use super::executor::ExecutionOutput;
use super::TaskError;

const MAX_SUFFIX: u32 = 10_000;

/// Writes execution logs into a directory
#[derive(Debug, Clone)]
pub struct LogSink {
    dir: PathBuf,
}

impl LogSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Render the log body.
    ///
    /// Layout: command line, params (if any), exit status, then the stdout
    /// and stderr sections.
    pub fn render(params: Option<&str>, output: &ExecutionOutput) -> String {
        let mut body = format!("# Command: {}\n", output.command);
        if let Some(params) = params {
            body.push_str(&format!("# Params: {}\n", params));
        }
        match output.exit_code {
            Some(code) => body.push_str(&format!("# Exit status: {}\n", code)),
            None => body.push_str("# Exit status: terminated by signal\n"),
        }
        body.push_str("\n=== STDOUT ===\n");
        body.push_str(&output.stdout);
        body.push_str("\n=== STDERR ===\n");
        body.push_str(&output.stderr);
        body
    }

    /// Write the log for one attempt and return its path
    pub async fn write(
        &self,
        agent: &str,
        params: Option<&str>,
        output: &ExecutionOutput,
    ) -> Result<PathBuf, TaskError> {
        let body = Self::render(params, output);
        let stem = log_stem(agent, Utc::now());

        let mut suffix = 0u32;
        loop {
            let path = if suffix == 0 {
                self.dir.join(format!("{}.log", stem))
            } else {
                self.dir.join(format!("{}-{}.log", stem, suffix))
            };

            let opened = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;

            let mut file = match opened {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && suffix < MAX_SUFFIX => {
                    suffix += 1;
                    continue;
                }
                Err(source) => return Err(TaskError::LogWrite { path, source }),
            };

            let written = async {
                file.write_all(body.as_bytes()).await?;
                file.flush().await
            }
            .await;

            return match written {
                Ok(()) => Ok(path),
                Err(source) => Err(TaskError::LogWrite { path, source }),
            };
        }
    }
}

/// `<agent>_<timestamp>` with path-unsafe characters replaced
fn log_stem(agent: &str, at: DateTime<Utc>) -> String {
    let agent: String = agent
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}_{}", agent, at.format("%Y%m%d_%H%M%S"))
}
