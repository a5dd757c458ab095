//! Agent registry: maps agent names to external executables.
//!
//! The registry is built once at startup and never reloaded. Lookups that
//! cannot be satisfied fail the individual task, never the dispatcher.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::TaskError;
use crate::config::paths::agents_dir;

/// Default interpreter used to launch agent scripts
pub const DEFAULT_RUNTIME: &str = "python3";

/// How to launch one agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentSpec {
    /// Script or binary to execute
    pub path: PathBuf,

    /// Interpreter that runs `path`; `None` executes `path` directly
    pub runtime: Option<String>,
}

impl AgentSpec {
    pub fn new(path: impl Into<PathBuf>, runtime: Option<String>) -> Self {
        Self {
            path: path.into(),
            runtime: runtime.filter(|r| !r.is_empty()),
        }
    }

    /// Human-readable command line without parameters
    pub fn command_line(&self) -> String {
        match &self.runtime {
            Some(runtime) => format!("{} {}", runtime, self.path.display()),
            None => self.path.display().to_string(),
        }
    }
}

/// Immutable name → executable mapping
#[derive(Debug, Clone, Default, Serialize)]
pub struct AgentRegistry {
    agents: BTreeMap<String, AgentSpec>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in agents, laid out under `<root>/agents`
    pub fn builtin(root: &Path, runtime: Option<&str>) -> Self {
        let base = agents_dir(root);
        let runtime = runtime.map(str::to_string);

        [
            ("gsa_scraper", "scraper/gsa/gsa_scraper.py"),
            ("nyc_scraper", "scraper/nyc/nyc_scraper.py"),
            ("normalize_data", "normalizer/normalize.py"),
            ("check_compliance", "compliance/check.py"),
            ("generate_outreach", "outreach/contact_copart.py"),
            ("push_repo", "push_repo/commit_push.py"),
        ]
        .into_iter()
        .fold(Self::new(), |registry, (name, script)| {
            registry.with_agent(name, AgentSpec::new(base.join(script), runtime.clone()))
        })
    }

    /// Add or replace an agent
    pub fn with_agent(mut self, name: impl Into<String>, spec: AgentSpec) -> Self {
        self.agents.insert(name.into(), spec);
        self
    }

    pub fn get(&self, name: &str) -> Option<&AgentSpec> {
        self.agents.get(name)
    }

    /// Look up an agent whose executable exists on disk
    pub fn resolve(&self, name: &str) -> Result<&AgentSpec, TaskError> {
        let spec = self.agents.get(name).ok_or_else(|| TaskError::UnresolvedAgent {
            agent: name.to_string(),
            reason: "not registered".to_string(),
        })?;

        if !spec.path.is_file() {
            return Err(TaskError::UnresolvedAgent {
                agent: name.to_string(),
                reason: format!("executable not found at {}", spec.path.display()),
            });
        }

        Ok(spec)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AgentSpec)> {
        self.agents.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
