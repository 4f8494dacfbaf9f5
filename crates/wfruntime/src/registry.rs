use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use serde_json::Value;
use wfcore::{Activity, OrchestrationContext};

/// Future returned by an orchestrator for one turn.
///
/// Not `Send`: it is created, polled, and dropped inside a single turn.
pub type OrchestratorFuture = Pin<Box<dyn Future<Output = wfcore::Result<Value>>>>;

/// A deterministic workflow function
pub trait Orchestrator: Send + Sync {
    /// Registered workflow name (e.g., "employee_onboarding_workflow")
    fn name(&self) -> &str;

    /// Start a fresh poll of the workflow body against `ctx`
    fn run(&self, ctx: OrchestrationContext, input: Value) -> OrchestratorFuture;
}

/// Adapts a plain async function into an [`Orchestrator`]
pub struct FnOrchestrator<F> {
    name: String,
    func: F,
}

impl<F, Fut> FnOrchestrator<F>
where
    F: Fn(OrchestrationContext, Value) -> Fut + Send + Sync,
    Fut: Future<Output = wfcore::Result<Value>> + 'static,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F, Fut> Orchestrator for FnOrchestrator<F>
where
    F: Fn(OrchestrationContext, Value) -> Fut + Send + Sync,
    Fut: Future<Output = wfcore::Result<Value>> + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, ctx: OrchestrationContext, input: Value) -> OrchestratorFuture {
        Box::pin((self.func)(ctx, input))
    }
}

/// Metadata about a registered activity
#[derive(Debug, Clone)]
pub struct ActivityMetadata {
    pub name: String,
    pub description: String,
}

/// Activities available to the runtime, keyed by name.
///
/// Built explicitly at startup and handed to the runtime.
pub struct ActivityRegistry {
    activities: HashMap<String, Arc<dyn Activity>>,
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self {
            activities: HashMap::new(),
        }
    }

    /// Register an activity; a later registration under the same name wins
    pub fn register(&mut self, activity: Arc<dyn Activity>) {
        let name = activity.name().to_string();
        if self.activities.contains_key(&name) {
            tracing::warn!("Replacing activity registration: {}", name);
        } else {
            tracing::info!("Registering activity: {}", name);
        }
        self.activities.insert(name, activity);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Activity>> {
        self.activities.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.activities.contains_key(name)
    }

    /// Registered names, sorted
    pub fn list_activities(&self) -> Vec<String> {
        let mut names: Vec<String> = self.activities.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn get_metadata(&self, name: &str) -> Option<ActivityMetadata> {
        self.activities.get(name).map(|a| ActivityMetadata {
            name: a.name().to_string(),
            description: a.description().to_string(),
        })
    }
}

impl Default for ActivityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Workflows available to the runtime, keyed by name
pub struct OrchestratorRegistry {
    orchestrators: HashMap<String, Arc<dyn Orchestrator>>,
}

impl OrchestratorRegistry {
    pub fn new() -> Self {
        Self {
            orchestrators: HashMap::new(),
        }
    }

    pub fn register(&mut self, orchestrator: Arc<dyn Orchestrator>) {
        let name = orchestrator.name().to_string();
        tracing::info!("Registering workflow: {}", name);
        self.orchestrators.insert(name, orchestrator);
    }

    /// Register an async function as a workflow
    pub fn register_fn<F, Fut>(&mut self, name: impl Into<String>, func: F)
    where
        F: Fn(OrchestrationContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = wfcore::Result<Value>> + 'static,
    {
        self.register(Arc::new(FnOrchestrator::new(name, func)));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Orchestrator>> {
        self.orchestrators.get(name).cloned()
    }

    /// Registered names, sorted
    pub fn list_workflows(&self) -> Vec<String> {
        let mut names: Vec<String> = self.orchestrators.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for OrchestratorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
