//! Task definition and status, as seen from the task registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ids::TaskId;

/// The parts of a task definition the scheduler cares about.
///
/// `extra` is free-form metadata; the dependency list lives under a
/// configurable key inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub deadline: DateTime<Utc>,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

/// Outcome of reading the dependency field of a definition.
#[derive(Debug, Clone, PartialEq)]
pub enum DeclaredDependencies {
    /// The field is not present at all.
    Undeclared,
    /// The field is a list of well-formed ids (possibly empty).
    List(Vec<TaskId>),
    /// The field is present but is not a list of well-formed ids.
    Malformed(Value),
}

impl TaskDefinition {
    pub fn new(deadline: DateTime<Utc>) -> Self {
        Self {
            deadline,
            extra: Map::new(),
        }
    }

    /// Builder-style helper: declare `required` under `extra[extra_key]`.
    pub fn with_dependencies(mut self, extra_key: &str, required: &[TaskId]) -> Self {
        let list = required
            .iter()
            .map(|id| Value::String(id.to_string()))
            .collect();
        self.extra.insert(extra_key.to_string(), Value::Array(list));
        self
    }

    /// Read and validate the dependency list declared under `extra_key`.
    ///
    /// Validation is all-or-nothing: a single bad element makes the whole
    /// field `Malformed`.
    pub fn dependencies(&self, extra_key: &str) -> DeclaredDependencies {
        let Some(field) = self.extra.get(extra_key) else {
            return DeclaredDependencies::Undeclared;
        };
        let Value::Array(items) = field else {
            return DeclaredDependencies::Malformed(field.clone());
        };
        let parsed: Option<Vec<TaskId>> = items
            .iter()
            .map(|item| item.as_str().and_then(|s| TaskId::parse(s).ok()))
            .collect();
        match parsed {
            Some(ids) => DeclaredDependencies::List(ids),
            None => DeclaredDependencies::Malformed(field.clone()),
        }
    }
}

/// State of a single run of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Failed,
    Exception,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatus {
    pub state: RunState,
}

/// Status of a task: the list of its runs so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub runs: Vec<RunStatus>,
}

impl TaskStatus {
    /// A task counts as completed once any of its runs completed.
    pub fn is_completed(&self) -> bool {
        self.runs.iter().any(|run| run.state == RunState::Completed)
    }
}
