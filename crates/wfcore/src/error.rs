use crate::history::TaskId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by an activity body or by the runtime while running it.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActivityError {
    #[error("{0}")]
    Failed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Activity not registered: {0}")]
    NotRegistered(String),

    #[error("Timeout after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Cancelled")]
    Cancelled,
}

impl ActivityError {
    pub fn failed(message: impl Into<String>) -> Self {
        ActivityError::Failed(message.into())
    }

    /// Whether running the activity again could produce a different outcome
    pub fn is_retryable(&self) -> bool {
        matches!(self, ActivityError::Failed(_) | ActivityError::Timeout { .. })
    }
}

/// A task in a fan-out group that did not complete successfully.
///
/// Displays as the bare message so it can be stored directly as the
/// workflow's error string.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct TaskFailure {
    pub task: String,
    pub message: String,
}

impl TaskFailure {
    pub fn new(task: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrchestrationError {
    #[error("Non-deterministic replay of task {id}: history has {recorded}, orchestrator requested {requested}")]
    NonDeterminism {
        id: TaskId,
        recorded: String,
        requested: String,
    },

    #[error("Duplicate task name in fan-out group: {0}")]
    DuplicateTask(String),

    #[error("Orchestration failed: {0}")]
    Failed(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for OrchestrationError {
    fn from(err: serde_json::Error) -> Self {
        OrchestrationError::Serialization(err.to_string())
    }
}
