//! Task Runner Integration Tests
//!
//! End-to-end checks of the file-based queue: descriptors on disk, real
//! agent scripts run through `sh`, logs and archive verified on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use auction_operator::config::paths::{QueuePaths, TASK_PATTERN};
use auction_operator::config::ResolvedConfig;
use auction_operator::domain::TaskState;
use auction_operator::tasks::{
    AgentRegistry, AgentSpec, Dispatcher, ScriptExecutor, TaskError, TaskOutcome, TaskQueue,
};
use tempfile::TempDir;

/// Project root with an agent script that echoes its params, then "ok"
struct Fixture {
    temp: TempDir,
    paths: QueuePaths,
}

impl Fixture {
    async fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let paths = QueuePaths::under(temp.path());
        paths.ensure().await.unwrap();
        Self { temp, paths }
    }

    fn root(&self) -> &Path {
        self.temp.path()
    }

    async fn script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.root().join("agents").join(name);
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, body).await.unwrap();
        path
    }

    async fn task(&self, name: &str, content: &str) -> PathBuf {
        let path = self.paths.tasks.join(name);
        tokio::fs::write(&path, content).await.unwrap();
        path
    }

    async fn dispatcher(&self) -> Dispatcher {
        let echo = self.script("echo.sh", "echo \"$1\"\necho ok\n").await;
        let failing = self.script("fail.sh", "echo broken >&2\nexit 3\n").await;

        let registry = AgentRegistry::new()
            .with_agent("normalize_data", AgentSpec::new(echo, Some("sh".to_string())))
            .with_agent("check_compliance", AgentSpec::new(failing, Some("sh".to_string())));
        let queue = TaskQueue::new(self.paths.clone(), TASK_PATTERN).unwrap();
        Dispatcher::new(queue, registry, Arc::new(ScriptExecutor::new()))
    }

    async fn logs(&self) -> Vec<PathBuf> {
        let mut logs = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.paths.logs).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            logs.push(entry.path());
        }
        logs.sort();
        logs
    }
}

#[tokio::test]
async fn test_descriptor_is_executed_logged_and_archived() {
    let fx = Fixture::new().await;
    let dispatcher = fx.dispatcher().await;

    let content = r#"{"agent":"normalize_data","params":{"id":1}}"#;
    let task = fx.task("job.task.json", content).await;

    let report = tokio_test::assert_ok!(dispatcher.process_tasks().await);
    assert_eq!(report.archived(), 1);

    let outcome = &report.tasks[0].outcome;
    assert_eq!(outcome.state(), TaskState::Archived);
    let TaskOutcome::Archived {
        agent,
        log_path,
        archived_to,
        exit_code,
    } = outcome
    else {
        panic!("expected archived, got {:?}", outcome);
    };
    assert_eq!(agent, "normalize_data");
    assert_eq!(*exit_code, Some(0));

    let name = log_path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("normalize_data_"));
    assert!(name.ends_with(".log"));

    let log = tokio::fs::read_to_string(log_path).await.unwrap();
    assert!(log.contains("# Params: {\"id\":1}"));
    assert!(log.contains("=== STDOUT ===\n{\"id\":1}\nok\n"));
    assert!(log.contains("# Exit status: 0"));

    assert!(!task.exists());
    assert_eq!(*archived_to, fx.paths.archive.join("job.task.json"));
    assert_eq!(tokio::fs::read_to_string(archived_to).await.unwrap(), content);
}

#[tokio::test]
async fn test_unresolvable_descriptors_stay_untouched() {
    let fx = Fixture::new().await;
    let dispatcher = fx.dispatcher().await;

    let cases = [
        ("a_no_agent.task.json", r#"{"params":{"id":1}}"#),
        ("b_empty_agent.task.json", r#"{"agent":""}"#),
        ("c_unknown.task.json", r#"{"agent":"does_not_exist"}"#),
        ("d_garbage.task.json", "not json at all"),
    ];
    for (name, content) in cases {
        fx.task(name, content).await;
    }

    let report = dispatcher.process_tasks().await.unwrap();
    assert_eq!(report.tasks.len(), 4);
    assert_eq!(report.left_for_inspection(), 4);
    assert_eq!(report.archived(), 0);

    assert!(matches!(
        report.tasks[0].outcome,
        TaskOutcome::LeftForInspection(TaskError::MissingAgent)
    ));
    assert!(matches!(
        report.tasks[2].outcome,
        TaskOutcome::LeftForInspection(TaskError::UnresolvedAgent { .. })
    ));
    assert!(matches!(
        report.tasks[3].outcome,
        TaskOutcome::LeftForInspection(TaskError::Malformed { .. })
    ));

    assert!(fx.logs().await.is_empty());
    for (name, content) in cases {
        let on_disk = tokio::fs::read_to_string(fx.paths.tasks.join(name)).await.unwrap();
        assert_eq!(on_disk, content);
    }
}

#[tokio::test]
async fn test_registered_agent_with_missing_script_is_not_run() {
    let fx = Fixture::new().await;
    let registry = AgentRegistry::builtin(fx.root(), Some("sh"));
    let queue = TaskQueue::new(fx.paths.clone(), TASK_PATTERN).unwrap();
    let dispatcher = Dispatcher::new(queue, registry, Arc::new(ScriptExecutor::new()));

    fx.task("push.task.json", r#"{"agent":"push_repo"}"#).await;

    let report = dispatcher.process_tasks().await.unwrap();
    assert_eq!(report.left_for_inspection(), 1);
    assert!(fx.logs().await.is_empty());
    assert!(fx.paths.tasks.join("push.task.json").exists());
}

#[tokio::test]
async fn test_nonzero_exit_is_logged_and_archived() {
    let fx = Fixture::new().await;
    let dispatcher = fx.dispatcher().await;
    fx.task("check.task.json", r#"{"agent":"check_compliance"}"#).await;

    let report = dispatcher.process_tasks().await.unwrap();
    let TaskOutcome::Archived {
        log_path,
        exit_code,
        ..
    } = &report.tasks[0].outcome
    else {
        panic!("expected archived");
    };
    assert_eq!(*exit_code, Some(3));

    let log = tokio::fs::read_to_string(log_path).await.unwrap();
    assert!(log.contains("# Exit status: 3"));
    assert!(log.contains("=== STDERR ===\nbroken\n"));
    assert!(!log.contains("# Params:"));
    assert!(fx.paths.archive.join("check.task.json").exists());
}

#[tokio::test]
async fn test_archive_collision_keeps_descriptor_for_retry() {
    let fx = Fixture::new().await;
    let dispatcher = fx.dispatcher().await;

    tokio::fs::write(fx.paths.archive.join("dup.task.json"), "earlier")
        .await
        .unwrap();
    fx.task("dup.task.json", r#"{"agent":"normalize_data"}"#).await;

    let report = dispatcher.process_tasks().await.unwrap();
    assert_eq!(report.retry(), 1);
    assert!(matches!(
        report.tasks[0].outcome,
        TaskOutcome::Retry(TaskError::Archive { .. })
    ));
    assert_eq!(report.tasks[0].outcome.state(), TaskState::Dispatched);

    // Executed and logged, but still queued and the archive entry untouched
    assert_eq!(fx.logs().await.len(), 1);
    assert!(fx.paths.tasks.join("dup.task.json").exists());
    assert_eq!(
        tokio::fs::read_to_string(fx.paths.archive.join("dup.task.json"))
            .await
            .unwrap(),
        "earlier"
    );
}

#[tokio::test]
async fn test_non_matching_files_are_ignored() {
    let fx = Fixture::new().await;
    let dispatcher = fx.dispatcher().await;
    fx.task("notes.json", r#"{"agent":"normalize_data"}"#).await;
    fx.task("readme.txt", "hello").await;

    let report = dispatcher.process_tasks().await.unwrap();
    assert!(report.is_empty());
    assert!(fx.paths.tasks.join("notes.json").exists());
    assert!(fx.logs().await.is_empty());
}

#[tokio::test]
async fn test_setup_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let paths = QueuePaths::under(temp.path());

    paths.ensure().await.unwrap();
    tokio::fs::write(paths.tasks.join("keep.task.json"), "{}")
        .await
        .unwrap();
    paths.ensure().await.unwrap();

    assert!(paths.tasks.is_dir());
    assert!(paths.logs.is_dir());
    assert!(paths.archive.is_dir());
    assert!(paths.tasks.join("keep.task.json").exists());
}

#[tokio::test]
async fn test_dispatcher_from_config_file() {
    let fx = Fixture::new().await;
    fx.script("echo.sh", "echo \"$1\"\n").await;

    let config_dir = fx.root().join(".operator");
    tokio::fs::create_dir_all(&config_dir).await.unwrap();
    let config_path = config_dir.join("config.yaml");
    tokio::fs::write(
        &config_path,
        r#"
version: "1"
executor:
  runtime: sh
agents:
  echo:
    path: agents/echo.sh
"#,
    )
    .await
    .unwrap();

    let config = ResolvedConfig::load_from(&config_path).unwrap();
    assert_eq!(config.root, fx.root());

    let dispatcher = Dispatcher::from_config(&config).unwrap();
    assert!(dispatcher.registry().get("echo").is_some());

    fx.task("e.task.json", r#"{"agent":"echo","params":{"x":"y"}}"#)
        .await;
    let report = dispatcher.process_tasks().await.unwrap();
    assert_eq!(report.archived(), 1);

    let logs = fx.logs().await;
    assert_eq!(logs.len(), 1);
    let log = tokio::fs::read_to_string(&logs[0]).await.unwrap();
    assert!(log.contains("{\"x\":\"y\"}"));
}
