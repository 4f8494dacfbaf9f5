//! Employee onboarding activities and workflow
//!
//! The two simulated onboarding activities, the orchestrator that fans them
//! out, and helpers to register both with a runtime.

mod activities;
mod onboarding;

pub use activities::{
    PreparePaperworkActivity, ProvisionEquipmentActivity, DEFAULT_ACTIVITY_DELAY,
    PREPARE_PAPERWORK, PROVISION_EQUIPMENT,
};
pub use onboarding::{
    employee_onboarding_workflow, run_employee_onboarding, EMPLOYEE_ONBOARDING_WORKFLOW,
};
use std::sync::Arc;
use std::time::Duration;
use wfruntime::{ActivityRegistry, OrchestratorRegistry};

/// Register the onboarding activities, each simulating `delay` of work
pub fn register_all(registry: &mut ActivityRegistry, delay: Duration) {
    registry.register(Arc::new(ProvisionEquipmentActivity::new(delay)));
    registry.register(Arc::new(PreparePaperworkActivity::new(delay)));
}

/// Register the onboarding workflow. `debug_mode` is fixed for every
/// instance the registry starts.
pub fn register_workflows(registry: &mut OrchestratorRegistry, debug_mode: bool) {
    registry.register_fn(EMPLOYEE_ONBOARDING_WORKFLOW, move |ctx, input| {
        run_employee_onboarding(ctx, input, debug_mode)
    });
}
