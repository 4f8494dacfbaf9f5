//! Core abstractions for deterministic orchestration
//!
//! This crate provides the activity contract, the workflow data model, the
//! history log, the orchestration context with its fan-out/fan-in join, and
//! the replay-safe logger. It has no runtime dependencies.

mod activity;
pub mod context;
mod error;
pub mod history;
mod join;
mod logger;
mod workflow;

pub use activity::{Activity, ActivityContext, ActivityRequest, ActivityResponse, ActivityType};
pub use context::{
    Action, ActivityTask, DurableTask, EventTask, OrchestrationContext, ReplayAware, TimerTask,
    TurnRecord,
};
pub use error::{ActivityError, OrchestrationError, TaskFailure};
pub use history::{HistoryEvent, TaskId};
pub use join::{when_all, when_any, FanOut, WhenAll, WhenAny};
pub use logger::{LogSink, ReplaySafeLogger, TracingSink};
pub use workflow::{WorkflowActivityInfo, WorkflowData, WorkflowResult, WORKFLOW_DATA_VERSION};

/// Result type for orchestration operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;
