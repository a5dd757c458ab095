//! Executors run an agent for a task and capture what it printed.
//!
//! The dispatcher only depends on the [`Executor`] trait, so in-process
//! agents can replace the subprocess implementation without touching it.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::registry::AgentSpec;

/// Errors that prevent an agent's output from being captured
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("failed to launch '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to collect output of '{command}': {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' timed out after {after:?}")]
    Timeout { command: String, after: Duration },
}

/// Everything an agent produced during one invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOutput {
    /// Command line that was run (without parameters)
    pub command: String,

    pub stdout: String,

    pub stderr: String,

    /// Exit code; `None` if the process was terminated by a signal
    pub exit_code: Option<i32>,
}

impl ExecutionOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Trait for task executors
#[async_trait]
pub trait Executor: Send + Sync {
    /// Human-readable executor name
    fn name(&self) -> &str;

    /// Run `agent` with the serialized parameters, if any.
    ///
    /// A non-zero exit status is not an error; it is reported in the output.
    async fn execute(
        &self,
        agent: &AgentSpec,
        params: Option<&str>,
    ) -> Result<ExecutionOutput, ExecutorError>;
}

/// Executor that launches agents as child processes
#[derive(Debug, Clone, Default)]
pub struct ScriptExecutor {
    timeout: Option<Duration>,
}

impl ScriptExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill agents that run longer than `limit`
    pub fn with_timeout(limit: Option<Duration>) -> Self {
        Self { timeout: limit }
    }

    fn command(agent: &AgentSpec, params: Option<&str>) -> Command {
        let mut cmd = match &agent.runtime {
            Some(runtime) => {
                let mut cmd = Command::new(runtime);
                cmd.arg(&agent.path);
                cmd
            }
            None => Command::new(&agent.path),
        };

        if let Some(params) = params {
            cmd.arg(params);
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Only reached when the timeout drops the wait future
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Executor for ScriptExecutor {
    fn name(&self) -> &str {
        "script"
    }

    async fn execute(
        &self,
        agent: &AgentSpec,
        params: Option<&str>,
    ) -> Result<ExecutionOutput, ExecutorError> {
        let command = agent.command_line();
        debug!(%command, has_params = params.is_some(), "Spawning agent");

        let child = Self::command(agent, params)
            .spawn()
            .map_err(|source| ExecutorError::Spawn {
                command: command.clone(),
                source,
            })?;

        let waited = match self.timeout {
            Some(limit) => timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| ExecutorError::Timeout {
                    command: command.clone(),
                    after: limit,
                })?,
            None => child.wait_with_output().await,
        };

        let output = waited.map_err(|source| ExecutorError::Io {
            command: command.clone(),
            source,
        })?;

        Ok(ExecutionOutput {
            command,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn script(temp: &TempDir, body: &str) -> AgentSpec {
        let path = temp.path().join("agent.sh");
        std::fs::write(&path, body).unwrap();
        AgentSpec::new(path, Some("sh".to_string()))
    }

    #[tokio::test]
    async fn test_captures_stdout_stderr_and_exit() {
        let temp = TempDir::new().unwrap();
        let agent = script(&temp, "echo out\necho err >&2\nexit 3\n");

        let output = ScriptExecutor::new().execute(&agent, None).await.unwrap();
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert_eq!(output.exit_code, Some(3));
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_params_passed_as_single_argument() {
        let temp = TempDir::new().unwrap();
        let agent = script(&temp, "echo \"$#:$1\"\n");

        let output = ScriptExecutor::new()
            .execute(&agent, Some(r#"{"id": 1, "name": "a b"}"#))
            .await
            .unwrap();
        assert_eq!(output.stdout, "1:{\"id\": 1, \"name\": \"a b\"}\n");

        let output = ScriptExecutor::new().execute(&agent, None).await.unwrap();
        assert_eq!(output.stdout, "0:\n");
    }

    #[tokio::test]
    async fn test_missing_runtime_is_spawn_error() {
        let temp = TempDir::new().unwrap();
        let mut agent = script(&temp, "echo hi\n");
        agent.runtime = Some("definitely-not-a-real-runtime".to_string());

        let err = ScriptExecutor::new().execute(&agent, None).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_timeout() {
        let temp = TempDir::new().unwrap();
        let agent = script(&temp, "sleep 5\n");

        let err = ScriptExecutor::with_timeout(Some(Duration::from_millis(100)))
            .execute(&agent, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Timeout { .. }));
    }
}
