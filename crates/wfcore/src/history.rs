use crate::{ActivityRequest, ActivityResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sequence number of a durable task within one orchestration run
pub type TaskId = u64;

/// Append-only record of everything that happened to an orchestration instance.
///
/// The runtime owns the log; the orchestrator only ever reads it through the
/// [`OrchestrationContext`](crate::OrchestrationContext) during replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HistoryEvent {
    ExecutionStarted {
        name: String,
        input: Value,
        timestamp: DateTime<Utc>,
    },
    ActivityScheduled {
        id: TaskId,
        name: String,
        request: ActivityRequest,
    },
    ActivityCompleted {
        id: TaskId,
        response: ActivityResponse,
        timestamp: DateTime<Utc>,
    },
    ActivityFailed {
        id: TaskId,
        error: String,
        timestamp: DateTime<Utc>,
    },
    TimerCreated {
        id: TaskId,
        fire_at: DateTime<Utc>,
    },
    TimerFired {
        id: TaskId,
        fire_at: DateTime<Utc>,
    },
    EventSubscribed {
        id: TaskId,
        name: String,
    },
    EventRaised {
        name: String,
        data: Value,
        timestamp: DateTime<Utc>,
    },
    ContinuedAsNew {
        input: Value,
    },
    ExecutionCompleted {
        output: Value,
    },
    ExecutionFailed {
        error: String,
    },
}

impl HistoryEvent {
    /// Instant at which the event happened, for events that carry one
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            HistoryEvent::ExecutionStarted { timestamp, .. }
            | HistoryEvent::ActivityCompleted { timestamp, .. }
            | HistoryEvent::ActivityFailed { timestamp, .. }
            | HistoryEvent::EventRaised { timestamp, .. } => Some(*timestamp),
            HistoryEvent::TimerFired { fire_at, .. } => Some(*fire_at),
            _ => None,
        }
    }

    /// Task id for events that open or close a durable task
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            HistoryEvent::ActivityScheduled { id, .. }
            | HistoryEvent::ActivityCompleted { id, .. }
            | HistoryEvent::ActivityFailed { id, .. }
            | HistoryEvent::TimerCreated { id, .. }
            | HistoryEvent::TimerFired { id, .. }
            | HistoryEvent::EventSubscribed { id, .. } => Some(*id),
            _ => None,
        }
    }

    /// True for events that schedule a task (as opposed to completing one)
    pub fn is_scheduling(&self) -> bool {
        matches!(
            self,
            HistoryEvent::ActivityScheduled { .. }
                | HistoryEvent::TimerCreated { .. }
                | HistoryEvent::EventSubscribed { .. }
        )
    }

    /// Short label used in logs and determinism errors
    pub fn describe(&self) -> String {
        match self {
            HistoryEvent::ExecutionStarted { name, .. } => format!("execution '{}'", name),
            HistoryEvent::ActivityScheduled { name, .. } => format!("activity '{}'", name),
            HistoryEvent::ActivityCompleted { id, .. } => format!("completion of task {}", id),
            HistoryEvent::ActivityFailed { id, .. } => format!("failure of task {}", id),
            HistoryEvent::TimerCreated { .. } => "timer".to_string(),
            HistoryEvent::TimerFired { id, .. } => format!("timer {} fired", id),
            HistoryEvent::EventSubscribed { name, .. } => format!("event '{}'", name),
            HistoryEvent::EventRaised { name, .. } => format!("event '{}' raised", name),
            HistoryEvent::ContinuedAsNew { .. } => "continue-as-new".to_string(),
            HistoryEvent::ExecutionCompleted { .. } => "execution completed".to_string(),
            HistoryEvent::ExecutionFailed { .. } => "execution failed".to_string(),
        }
    }
}
