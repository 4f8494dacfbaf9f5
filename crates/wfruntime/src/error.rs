use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    #[error("Instance already exists: {0}")]
    InstanceExists(String),

    #[error("Instance is not running: {0}")]
    InstanceNotRunning(String),

    #[error("Instance is still running: {0}")]
    InstanceRunning(String),

    #[error("Unknown workflow: {0}")]
    UnknownWorkflow(String),

    #[error("Timed out waiting for instance {0}")]
    Timeout(String),

    #[error("Runtime is shut down")]
    ShutDown,
}
