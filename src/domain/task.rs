//! Task descriptors dropped into the queue directory.
//!
//! A descriptor names an agent and carries opaque parameters that are passed
//! through to the agent unmodified. Descriptor files are never rewritten;
//! they are either archived or left in place for an operator.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parsed contents of a `*.task.json` file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Name selecting an executor from the agent registry
    #[serde(default)]
    pub agent: Option<String>,

    /// Key/value parameters forwarded to the executor
    #[serde(default)]
    pub params: Option<Map<String, Value>>,
}

impl TaskDescriptor {
    /// Parse a descriptor from raw file content
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// The agent name, treating an empty string as absent
    pub fn agent(&self) -> Option<&str> {
        self.agent.as_deref().filter(|a| !a.is_empty())
    }

    /// Parameters serialized as the single argument handed to the executor.
    ///
    /// Returns `None` when there are no parameters or the mapping is empty,
    /// in which case no argument is passed.
    pub fn params_arg(&self) -> Option<String> {
        self.params
            .as_ref()
            .filter(|p| !p.is_empty())
            .map(|p| Value::Object(p.clone()).to_string())
    }
}

/// Lifecycle of a descriptor within one scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Found by a directory scan
    Discovered,

    /// Dispatch was attempted but the descriptor is still queued; the next
    /// scan discovers it again
    Dispatched,

    /// Moved into the archive directory
    Archived,

    /// Left in the queue for manual inspection
    LeftForInspection,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_descriptor() {
        let task = TaskDescriptor::from_json(r#"{"agent":"normalize_data","params":{"id":1}}"#)
            .unwrap();
        assert_eq!(task.agent(), Some("normalize_data"));
        assert_eq!(task.params_arg(), Some(r#"{"id":1}"#.to_string()));
    }

    #[test]
    fn test_missing_agent_and_params() {
        let task = TaskDescriptor::from_json("{}").unwrap();
        assert_eq!(task.agent(), None);
        assert_eq!(task.params_arg(), None);
    }

    #[test]
    fn test_empty_agent_is_absent() {
        let task = TaskDescriptor::from_json(r#"{"agent":"","params":{}}"#).unwrap();
        assert_eq!(task.agent(), None);
        assert_eq!(task.params_arg(), None);
    }

    #[test]
    fn test_non_object_is_rejected() {
        assert!(TaskDescriptor::from_json("[1,2,3]").is_err());
        assert!(TaskDescriptor::from_json(r#"{"agent":5}"#).is_err());
    }
}
