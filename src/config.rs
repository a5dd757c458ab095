//! Configuration for the operator.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (OPERATOR_ROOT, OPERATOR_TASKS_DIR, OPERATOR_LOGS_DIR)
//! 2. Config file (.operator/config.yaml)
//! 3. Defaults (current directory as project root)
//!
//! Config file discovery:
//! - Searches current directory and parents for .operator/config.yaml
//! - Paths in config file are relative to the project root (parent of .operator/)
//!
//! The resolved configuration is a plain value built once at startup and
//! passed into the components that need it.

pub mod paths;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::CoalescePolicy;
use crate::domain::SCRAPE;
use crate::tasks::registry::{AgentRegistry, AgentSpec, DEFAULT_RUNTIME};

use self::paths::{QueuePaths, TASK_PATTERN};

/// Directory holding the config file, relative to the project root
pub const CONFIG_DIR: &str = ".operator";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub agents: HashMap<String, AgentConfig>,
    #[serde(default)]
    pub scheduler: Option<SchedulerConfig>,
    #[serde(default)]
    pub executor: Option<ExecutorConfig>,
    #[serde(default)]
    pub task_pattern: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Project root (relative to the directory containing .operator/)
    pub root: Option<String>,
    pub tasks: Option<String>,
    pub logs: Option<String>,
    pub archive: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    pub path: String,
    /// Interpreter override; an empty string executes `path` directly
    pub runtime: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    pub tag: Option<String>,
    pub interval_seconds: Option<u64>,
    pub run_on_start: Option<bool>,
    pub coalesce: Option<CoalescePolicy>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
    pub runtime: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub max_parallel: Option<usize>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Project root
    pub root: PathBuf,
    /// Task queue, log and archive directories
    pub paths: QueuePaths,
    /// Glob matched against descriptor file names
    pub task_pattern: String,
    /// Agents available to the dispatcher
    pub agents: AgentRegistry,
    pub scheduler: SchedulerSettings,
    pub executor: ExecutorSettings,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub tag: String,
    pub interval: Duration,
    pub run_on_start: bool,
    pub coalesce: CoalescePolicy,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tag: SCRAPE.to_string(),
            interval: Duration::from_secs(300), // 5 min
            run_on_start: false,
            coalesce: CoalescePolicy::Queue,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub runtime: String,
    pub timeout: Option<Duration>,
    pub max_parallel: usize,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            runtime: DEFAULT_RUNTIME.to_string(),
            timeout: None,
            max_parallel: 1,
        }
    }
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_DIR).join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base` or start with `~/`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    if let Some(rest) = path_str.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }

    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

impl ResolvedConfig {
    /// Load configuration from the environment, the discovered config file
    /// and defaults
    pub fn load() -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to determine current directory")?;
        let config_file = find_config_file(&cwd);
        Self::resolve(config_file, &cwd, |key| std::env::var(key).ok())
    }

    /// Load configuration from an explicit config file
    pub fn load_from(path: &Path) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to determine current directory")?;
        Self::resolve(Some(path.to_path_buf()), &cwd, |key| std::env::var(key).ok())
    }

    fn resolve(
        config_file: Option<PathBuf>,
        cwd: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let file = match &config_file {
            Some(path) => Some(load_config_file(path)?),
            None => None,
        };

        // Base directory is the parent of .operator/ (i.e., grandparent of config.yaml)
        let base_dir = config_file
            .as_deref()
            .and_then(|p| p.parent())
            .and_then(|p| p.parent())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| cwd.to_path_buf());

        let paths_cfg = file.as_ref().map(|f| f.paths.clone()).unwrap_or_default();

        let root = if let Some(env_root) = env("OPERATOR_ROOT") {
            PathBuf::from(env_root)
        } else if let Some(ref root) = paths_cfg.root {
            resolve_path(&base_dir, root)
        } else {
            base_dir.clone()
        };

        let mut paths = QueuePaths::under(&root);
        if let Some(tasks) = env("OPERATOR_TASKS_DIR") {
            paths.tasks = PathBuf::from(tasks);
            paths.archive = paths.tasks.join("archive");
        } else if let Some(ref tasks) = paths_cfg.tasks {
            paths.tasks = resolve_path(&root, tasks);
            paths.archive = paths.tasks.join("archive");
        }
        if let Some(ref archive) = paths_cfg.archive {
            paths.archive = resolve_path(&root, archive);
        }
        if let Some(logs) = env("OPERATOR_LOGS_DIR") {
            paths.logs = PathBuf::from(logs);
        } else if let Some(ref logs) = paths_cfg.logs {
            paths.logs = resolve_path(&root, logs);
        }

        let defaults = ExecutorSettings::default();
        let executor = match file.as_ref().and_then(|f| f.executor.as_ref()) {
            Some(cfg) => ExecutorSettings {
                runtime: cfg.runtime.clone().unwrap_or(defaults.runtime),
                timeout: cfg.timeout_seconds.map(Duration::from_secs),
                max_parallel: cfg.max_parallel.unwrap_or(defaults.max_parallel).max(1),
            },
            None => defaults,
        };

        let defaults = SchedulerSettings::default();
        let scheduler = match file.as_ref().and_then(|f| f.scheduler.as_ref()) {
            Some(cfg) => SchedulerSettings {
                tag: cfg.tag.clone().unwrap_or(defaults.tag),
                interval: cfg
                    .interval_seconds
                    .filter(|s| *s > 0)
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.interval),
                run_on_start: cfg.run_on_start.unwrap_or(defaults.run_on_start),
                coalesce: cfg.coalesce.unwrap_or(defaults.coalesce),
            },
            None => defaults,
        };

        // Config file agents override the built-in ones by name
        let mut agents = AgentRegistry::builtin(&root, Some(&executor.runtime));
        if let Some(ref f) = file {
            for (name, agent) in &f.agents {
                let runtime = agent
                    .runtime
                    .clone()
                    .unwrap_or_else(|| executor.runtime.clone());
                agents = agents.with_agent(
                    name.clone(),
                    AgentSpec::new(resolve_path(&root, &agent.path), Some(runtime)),
                );
            }
        }

        let task_pattern = file
            .as_ref()
            .and_then(|f| f.task_pattern.clone())
            .unwrap_or_else(|| TASK_PATTERN.to_string());

        Ok(Self {
            root,
            paths,
            task_pattern,
            agents,
            scheduler,
            executor,
            config_file,
        })
    }
}
