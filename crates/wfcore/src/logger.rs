use crate::context::ReplayAware;
use tracing::Level;

/// Destination for orchestrator log lines
pub trait LogSink: Send + Sync {
    fn log(&self, level: Level, instance_id: &str, message: &str);
}

/// Emits through `tracing` with the instance id as a structured field
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: Level, instance_id: &str, message: &str) {
        match level {
            Level::ERROR => tracing::error!(target: "wfcore::orchestrator", instance_id, "{}", message),
            Level::WARN => tracing::warn!(target: "wfcore::orchestrator", instance_id, "{}", message),
            Level::INFO => tracing::info!(target: "wfcore::orchestrator", instance_id, "{}", message),
            Level::DEBUG => tracing::debug!(target: "wfcore::orchestrator", instance_id, "{}", message),
            _ => tracing::trace!(target: "wfcore::orchestrator", instance_id, "{}", message),
        }
    }
}

/// Logger for orchestrator code that stays quiet while history is replayed.
///
/// The context is passed into every call and the replay flag is read each
/// time, since it flips from replaying to live partway through a turn.
#[derive(Debug, Clone, Default)]
pub struct ReplaySafeLogger<S: LogSink = TracingSink> {
    sink: S,
}

impl ReplaySafeLogger<TracingSink> {
    pub fn new() -> Self {
        Self { sink: TracingSink }
    }
}

impl<S: LogSink> ReplaySafeLogger<S> {
    pub fn with_sink(sink: S) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn emit(&self, ctx: &impl ReplayAware, level: Level, message: &str) {
        if !ctx.is_replaying() {
            self.sink.log(level, ctx.instance_id(), message);
        }
    }

    pub fn debug(&self, ctx: &impl ReplayAware, message: impl AsRef<str>) {
        self.emit(ctx, Level::DEBUG, message.as_ref());
    }

    pub fn info(&self, ctx: &impl ReplayAware, message: impl AsRef<str>) {
        self.emit(ctx, Level::INFO, message.as_ref());
    }

    pub fn warn(&self, ctx: &impl ReplayAware, message: impl AsRef<str>) {
        self.emit(ctx, Level::WARN, message.as_ref());
    }

    pub fn error(&self, ctx: &impl ReplayAware, message: impl AsRef<str>) {
        self.emit(ctx, Level::ERROR, message.as_ref());
    }
}
