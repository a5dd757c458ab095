//! Dispatcher: scan the queue, run each descriptor's agent, log and archive.
//!
//! Every error is contained to the descriptor that caused it. Descriptors
//! that cannot be resolved to an agent are left for an operator; descriptors
//! that fail during or after dispatch are left for the next scan.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use super::archive::Archiver;
use super::executor::{Executor, ScriptExecutor};
use super::log_sink::LogSink;
use super::queue::TaskQueue;
use super::registry::AgentRegistry;
use super::{display_name, ScanReport, TaskError, TaskOutcome, TaskReport};
use crate::config::ResolvedConfig;
use crate::core::wait_for_shutdown;
use crate::domain::{TaskDescriptor, TaskState};

/// Everything needed to take one descriptor from discovered to archived
struct DispatchContext {
    registry: AgentRegistry,
    executor: Arc<dyn Executor>,
    log_sink: LogSink,
    archiver: Archiver,
}

impl DispatchContext {
    #[instrument(skip(self, file), fields(task = %display_name(file)))]
    async fn process(&self, file: &Path) -> TaskOutcome {
        match self.try_process(file).await {
            Ok(outcome) => outcome,
            Err(error) => {
                if error.needs_inspection() {
                    warn!(%error, "Task left in queue for inspection");
                } else {
                    error!(%error, "Task left in queue for retry");
                }
                TaskOutcome::from_error(error)
            }
        }
    }

    async fn try_process(&self, file: &Path) -> Result<TaskOutcome, TaskError> {
        debug!(state = ?TaskState::Discovered, "Reading descriptor");
        let content = tokio::fs::read_to_string(file)
            .await
            .map_err(|e| TaskError::Malformed {
                reason: e.to_string(),
            })?;

        let task = TaskDescriptor::from_json(&content).map_err(|e| TaskError::Malformed {
            reason: e.to_string(),
        })?;

        let agent = task.agent().ok_or(TaskError::MissingAgent)?.to_string();
        let spec = self.registry.resolve(&agent)?;
        let params = task.params_arg();

        info!(
            %agent,
            executor = self.executor.name(),
            state = ?TaskState::Dispatched,
            "Running agent"
        );
        let output = self
            .executor
            .execute(spec, params.as_deref())
            .await
            .map_err(|source| TaskError::Dispatch {
                agent: agent.clone(),
                source,
            })?;

        if !output.success() {
            warn!(%agent, exit_code = ?output.exit_code, "Agent exited unsuccessfully");
        }

        let log_path = self.log_sink.write(&agent, params.as_deref(), &output).await?;
        let archived_to = self.archiver.archive(file).await?;

        info!(%agent, log = %display_name(&log_path), "Task processed");
        Ok(TaskOutcome::Archived {
            agent,
            log_path,
            archived_to,
            exit_code: output.exit_code,
        })
    }
}

fn aborted(file: &Path, e: tokio::task::JoinError) -> TaskOutcome {
    error!(task = %display_name(file), error = %e, "Task dispatch panicked");
    TaskOutcome::from_error(TaskError::Aborted {
        reason: e.to_string(),
    })
}

/// Totals accumulated by [`Dispatcher::poll`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub scans: usize,
    pub archived: usize,
    pub left_for_inspection: usize,
    pub retry: usize,
}

/// Drives descriptors from the queue through their agents
pub struct Dispatcher {
    queue: TaskQueue,
    context: Arc<DispatchContext>,
    max_parallel: usize,
}

impl Dispatcher {
    /// Create a dispatcher writing logs and archives under the queue's paths
    pub fn new(queue: TaskQueue, registry: AgentRegistry, executor: Arc<dyn Executor>) -> Self {
        let paths = queue.paths().clone();
        Self {
            queue,
            context: Arc::new(DispatchContext {
                registry,
                executor,
                log_sink: LogSink::new(paths.logs),
                archiver: Archiver::new(paths.archive),
            }),
            max_parallel: 1,
        }
    }

    /// Build a subprocess-backed dispatcher from resolved configuration
    pub fn from_config(config: &ResolvedConfig) -> Result<Self> {
        let queue = TaskQueue::new(config.paths.clone(), &config.task_pattern)?;
        let executor = Arc::new(ScriptExecutor::with_timeout(config.executor.timeout));
        Ok(Self::new(queue, config.agents.clone(), executor)
            .with_max_parallel(config.executor.max_parallel))
    }

    /// Dispatch up to `n` distinct descriptors at once
    pub fn with_max_parallel(mut self, n: usize) -> Self {
        self.max_parallel = n.max(1);
        self
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.context.registry
    }

    /// Run one scan-and-dispatch cycle over the queue
    pub async fn process_tasks(&self) -> Result<ScanReport> {
        self.queue.ensure_directories().await?;

        let Some(_lock) = self.queue.try_lock()? else {
            info!("Task queue is locked by another scan, skipping");
            return Ok(ScanReport {
                tasks: Vec::new(),
                locked_out: true,
            });
        };

        let files = self.queue.scan().await?;
        debug!(found = files.len(), "Scanned task queue");

        let tasks = if self.max_parallel <= 1 || files.len() <= 1 {
            let mut tasks = Vec::with_capacity(files.len());
            for file in files {
                let context = Arc::clone(&self.context);
                let path = file.clone();
                // Spawned so a panicking dispatch is contained
                let handle = tokio::spawn(async move { context.process(&path).await });
                let outcome = handle.await.unwrap_or_else(|e| aborted(&file, e));
                tasks.push(TaskReport { file, outcome });
            }
            tasks
        } else {
            self.process_parallel(files).await
        };

        let report = ScanReport {
            tasks,
            locked_out: false,
        };
        if !report.is_empty() {
            info!(
                archived = report.archived(),
                left_for_inspection = report.left_for_inspection(),
                retry = report.retry(),
                "Scan complete"
            );
        }
        Ok(report)
    }

    async fn process_parallel(&self, files: Vec<PathBuf>) -> Vec<TaskReport> {
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let mut set = JoinSet::new();

        for (index, file) in files.iter().cloned().enumerate() {
            let context = Arc::clone(&self.context);
            let semaphore = Arc::clone(&semaphore);
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                (index, context.process(&file).await)
            });
        }

        let mut outcomes: Vec<Option<TaskOutcome>> = files.iter().map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = Some(outcome),
                Err(e) => error!(error = %e, "Task dispatch panicked"),
            }
        }

        // A panicked dispatch never reports back; its slot stays empty
        files
            .into_iter()
            .zip(outcomes)
            .map(|(file, outcome)| {
                let outcome = outcome.unwrap_or_else(|| {
                    TaskOutcome::from_error(TaskError::Aborted {
                        reason: "dispatch task panicked".to_string(),
                    })
                });
                TaskReport { file, outcome }
            })
            .collect()
    }

    /// Scan every `interval` until shutdown is requested.
    ///
    /// The cycle in progress when shutdown arrives runs to completion.
    pub async fn poll(
        &self,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> PollSummary {
        let mut ticker = time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut summary = PollSummary::default();

        info!(interval_secs = interval.as_secs_f64(), "Polling task queue");

        loop {
            tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => break,
                _ = ticker.tick() => {}
            }

            summary.scans += 1;
            match self.process_tasks().await {
                Ok(report) => {
                    summary.archived += report.archived();
                    summary.left_for_inspection += report.left_for_inspection();
                    summary.retry += report.retry();
                }
                Err(e) => error!("Task scan failed: {:#}", e),
            }
        }

        info!(scans = summary.scans, archived = summary.archived, "Stopped polling task queue");
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::paths::{QueuePaths, TASK_PATTERN};
    use crate::tasks::executor::{ExecutionOutput, ExecutorError};
    use crate::tasks::registry::AgentSpec;
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// Executor that never spawns anything
    struct Canned;

    #[async_trait]
    impl Executor for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        async fn execute(
            &self,
            agent: &AgentSpec,
            params: Option<&str>,
        ) -> Result<ExecutionOutput, ExecutorError> {
            if params == Some(r#"{"panic":true}"#) {
                panic!("agent blew up");
            }
            if params == Some(r#"{"fail":true}"#) {
                return Err(ExecutorError::Io {
                    command: agent.command_line(),
                    source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed"),
                });
            }
            Ok(ExecutionOutput {
                command: agent.command_line(),
                stdout: format!("params={}\n", params.unwrap_or("-")),
                stderr: String::new(),
                exit_code: Some(0),
            })
        }
    }

    async fn setup(max_parallel: usize) -> (Dispatcher, TempDir) {
        let temp = TempDir::new().unwrap();
        let agent_path = temp.path().join("agent.sh");
        tokio::fs::write(&agent_path, "").await.unwrap();

        let registry = AgentRegistry::new().with_agent("echo", AgentSpec::new(agent_path, None));
        let queue = TaskQueue::new(QueuePaths::under(temp.path()), TASK_PATTERN).unwrap();
        let dispatcher =
            Dispatcher::new(queue, registry, Arc::new(Canned)).with_max_parallel(max_parallel);
        dispatcher.queue().ensure_directories().await.unwrap();
        (dispatcher, temp)
    }

    async fn drop_task(dispatcher: &Dispatcher, name: &str, body: &str) -> PathBuf {
        let path = dispatcher.queue().paths().tasks.join(name);
        tokio::fs::write(&path, body).await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_mixed_queue() {
        let (dispatcher, _temp) = setup(1).await;
        let ok = drop_task(&dispatcher, "1.task.json", r#"{"agent":"echo","params":{"id":1}}"#).await;
        let broken = drop_task(&dispatcher, "2.task.json", "{not json").await;
        let unknown = drop_task(&dispatcher, "3.task.json", r#"{"agent":"ghost"}"#).await;
        let flaky = drop_task(&dispatcher, "4.task.json", r#"{"agent":"echo","params":{"fail":true}}"#).await;

        let report = dispatcher.process_tasks().await.unwrap();
        assert_eq!(report.tasks.len(), 4);
        assert_eq!(report.archived(), 1);
        assert_eq!(report.left_for_inspection(), 2);
        assert_eq!(report.retry(), 1);

        assert!(!ok.exists());
        assert!(broken.exists());
        assert!(unknown.exists());
        assert!(flaky.exists());
    }

    #[tokio::test]
    async fn test_parallel_preserves_scan_order() {
        let (dispatcher, _temp) = setup(4).await;
        for i in 0..6 {
            drop_task(
                &dispatcher,
                &format!("{}.task.json", i),
                &format!(r#"{{"agent":"echo","params":{{"n":{}}}}}"#, i),
            )
            .await;
        }

        let report = dispatcher.process_tasks().await.unwrap();
        assert_eq!(report.archived(), 6);
        let names: Vec<String> = report.tasks.iter().map(|t| t.name()).collect();
        assert_eq!(
            names,
            (0..6).map(|i| format!("{}.task.json", i)).collect::<Vec<_>>()
        );
    }

    async fn assert_panic_is_reported(max_parallel: usize) {
        let (dispatcher, _temp) = setup(max_parallel).await;
        drop_task(&dispatcher, "1.task.json", r#"{"agent":"echo"}"#).await;
        let exploding =
            drop_task(&dispatcher, "2.task.json", r#"{"agent":"echo","params":{"panic":true}}"#).await;
        drop_task(&dispatcher, "3.task.json", r#"{"agent":"echo"}"#).await;

        let report = dispatcher.process_tasks().await.unwrap();
        assert_eq!(report.tasks.len(), 3);
        assert_eq!(report.archived(), 2);
        assert_eq!(report.retry(), 1);

        assert_eq!(report.tasks[1].file, exploding);
        assert!(matches!(
            report.tasks[1].outcome,
            TaskOutcome::Retry(TaskError::Aborted { .. })
        ));
        assert!(exploding.exists());
    }

    #[tokio::test]
    async fn test_panicking_dispatch_is_retried_sequential() {
        assert_panic_is_reported(1).await;
    }

    #[tokio::test]
    async fn test_panicking_dispatch_is_retried_parallel() {
        assert_panic_is_reported(3).await;
    }

    #[tokio::test]
    async fn test_locked_queue_is_skipped() {
        let (dispatcher, _temp) = setup(1).await;
        let task = drop_task(&dispatcher, "1.task.json", r#"{"agent":"echo"}"#).await;

        let _held = dispatcher.queue().try_lock().unwrap().unwrap();
        let report = dispatcher.process_tasks().await.unwrap();

        assert!(report.locked_out);
        assert!(report.is_empty());
        assert!(task.exists());
    }

    #[tokio::test]
    async fn test_poll_stops_on_shutdown() {
        let (dispatcher, _temp) = setup(1).await;
        drop_task(&dispatcher, "1.task.json", r#"{"agent":"echo"}"#).await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stopper = tokio::spawn(async move {
            time::sleep(Duration::from_millis(200)).await;
            let _ = shutdown_tx.send(true);
        });

        let summary = dispatcher.poll(Duration::from_millis(20), shutdown_rx).await;
        stopper.await.unwrap();

        assert!(summary.scans >= 1);
        assert_eq!(summary.archived, 1);
    }
}
