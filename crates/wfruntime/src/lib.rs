//! Durable orchestration runtime
//!
//! This crate hosts orchestration instances: it keeps their history, replays
//! orchestrator functions turn by turn, and runs the activities, timers, and
//! event waits they schedule.

mod config;
mod dispatch;
mod error;
mod executor;
mod registry;
mod runtime;
mod store;

pub use config::{RetryPolicy, RuntimeConfig};
pub use error::RuntimeError;
pub use executor::{Turn, TurnExecutor, TurnOutcome};
pub use registry::{
    ActivityMetadata, ActivityRegistry, FnOrchestrator, Orchestrator, OrchestratorFuture,
    OrchestratorRegistry,
};
pub use runtime::DurableRuntime;
pub use store::{InstanceStatus, InstanceStore, RuntimeStatus};
