//! The employee onboarding orchestration.
//!
//! Everything here runs inside an orchestrator turn and may be replayed any
//! number of times. It reads time and results only through the context and
//! logs only through [`ReplaySafeLogger`].

use crate::activities::{PREPARE_PAPERWORK, PROVISION_EQUIPMENT};
use serde_json::Value;
use wfcore::{FanOut, OrchestrationContext, ReplayAware, ReplaySafeLogger, WorkflowData, WorkflowResult};

pub const EMPLOYEE_ONBOARDING_WORKFLOW: &str = "employee_onboarding_workflow";

/// Provision equipment and prepare paperwork in parallel, then join.
///
/// A failed join is not an orchestration error: the returned data carries
/// `success = false` and the failure message, with no results merged.
pub async fn employee_onboarding_workflow(
    ctx: OrchestrationContext,
    input: Value,
    debug_mode: bool,
) -> wfcore::Result<WorkflowData> {
    let logger = ReplaySafeLogger::new();
    logger.info(&ctx, format!("Starting workflow: {}", ctx.instance_id()));

    let mut data = WorkflowData::from_input(&input, debug_mode);

    logger.info(
        &ctx,
        "Starting parallel execution of equipment provisioning and paperwork preparation",
    );
    let mut tasks = FanOut::new();
    logger.info(&ctx, "Adding parallel task: provides necessary equipment to the new employee");
    tasks.add(
        PROVISION_EQUIPMENT,
        ctx.call_activity(PROVISION_EQUIPMENT, data.get_activity_request()),
    )?;
    logger.info(&ctx, "Adding parallel task: prepares required onboarding paperwork");
    tasks.add(
        PREPARE_PAPERWORK,
        ctx.call_activity(PREPARE_PAPERWORK, data.get_activity_request()),
    )?;

    logger.info(&ctx, "Waiting for all tasks to complete");
    match tasks.when_all().await {
        Ok(results) => {
            logger.info(&ctx, "All parallel tasks completed successfully");
            for (task_name, response) in &results {
                logger.info(&ctx, format!("Processing result from {}", task_name));
                data.add_activity_response(task_name, response);
            }
        }
        Err(failure) => {
            logger.error(&ctx, format!("Error in parallel execution: {}", failure));
            data.mark_failed(failure.to_string());
            return Ok(data);
        }
    }

    Ok(process_join_tasks(&ctx, &logger, data))
}

/// Continuation after the join
fn process_join_tasks(
    ctx: &OrchestrationContext,
    logger: &ReplaySafeLogger,
    data: WorkflowData,
) -> WorkflowData {
    logger.info(ctx, "Workflow reached end of employee onboarding process");
    data
}

/// Registered entry point: runs the workflow and projects the result
pub async fn run_employee_onboarding(
    ctx: OrchestrationContext,
    input: Value,
    debug_mode: bool,
) -> wfcore::Result<Value> {
    let data = employee_onboarding_workflow(ctx, input, debug_mode).await?;
    Ok(WorkflowResult::from(&data).to_value())
}
