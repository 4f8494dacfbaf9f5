use crate::registry::Orchestrator;
use futures::task::noop_waker_ref;
use serde_json::Value;
use std::task::{Context, Poll};
use wfcore::{Action, HistoryEvent, OrchestrationContext, OrchestrationError};

/// What the orchestrator decided at the end of a turn
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// Suspended on tasks that have no recorded outcome yet
    Pending,
    Completed(Value),
    ContinuedAsNew(Value),
    Failed(OrchestrationError),
}

/// Result of polling an orchestrator once against a history snapshot
#[derive(Debug)]
pub struct Turn {
    pub new_events: Vec<HistoryEvent>,
    pub actions: Vec<Action>,
    pub outcome: TurnOutcome,
}

/// Replays orchestrator functions against recorded history.
///
/// Each turn rebuilds the orchestrator future from scratch and polls it once
/// with a no-op waker. Tasks resolve only from history, so nothing is lost by
/// never waking: the runtime starts another turn when new events arrive.
pub struct TurnExecutor;

impl TurnExecutor {
    /// Run one turn. `committed` is the history length at the end of the
    /// previous turn.
    pub fn run_turn(
        orchestrator: &dyn Orchestrator,
        instance_id: &str,
        history: &[HistoryEvent],
        committed: usize,
    ) -> Turn {
        let ctx = OrchestrationContext::new(instance_id, history.to_vec(), committed);
        let input = ctx.input();

        let polled = {
            let mut future = orchestrator.run(ctx.clone(), input);
            let mut cx = Context::from_waker(noop_waker_ref());
            future.as_mut().poll(&mut cx)
        };

        let record = ctx.finish_turn();
        let outcome = match (record.violation, polled) {
            (Some(violation), _) => TurnOutcome::Failed(violation),
            (None, Poll::Ready(Err(err))) => TurnOutcome::Failed(err),
            (None, Poll::Ready(Ok(output))) => match record.continue_as_new {
                Some(next_input) => TurnOutcome::ContinuedAsNew(next_input),
                None => TurnOutcome::Completed(output),
            },
            (None, Poll::Pending) => TurnOutcome::Pending,
        };

        tracing::debug!(
            instance_id,
            history_len = history.len(),
            actions = record.actions.len(),
            "Turn finished: {:?}",
            outcome
        );

        Turn {
            new_events: record.new_events,
            actions: record.actions,
            outcome,
        }
    }

    /// Replay a complete history with nothing new to consume.
    ///
    /// Used to check that a recorded run reproduces the same outcome.
    pub fn replay(
        orchestrator: &dyn Orchestrator,
        instance_id: &str,
        history: &[HistoryEvent],
    ) -> TurnOutcome {
        let replayable: Vec<HistoryEvent> = history
            .iter()
            .filter(|e| {
                !matches!(
                    e,
                    HistoryEvent::ExecutionCompleted { .. }
                        | HistoryEvent::ExecutionFailed { .. }
                        | HistoryEvent::ContinuedAsNew { .. }
                )
            })
            .cloned()
            .collect();
        let committed = replayable.len();
        Self::run_turn(orchestrator, instance_id, &replayable, committed).outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FnOrchestrator;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use wfcore::{ActivityRequest, ActivityResponse};

    fn started() -> HistoryEvent {
        HistoryEvent::ExecutionStarted {
            name: "single".to_string(),
            input: json!({"n": 1}),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn single_step() -> impl Orchestrator {
        FnOrchestrator::new("single", |ctx: OrchestrationContext, input: Value| async move {
            let response = ctx
                .call_activity("step", ActivityRequest::new())
                .await
                .map_err(|f| OrchestrationError::Failed(f.to_string()))?;
            Ok::<Value, OrchestrationError>(json!({"input": input, "success": response.success}))
        })
    }

    #[test]
    fn pending_turn_emits_schedule_action() {
        let orchestrator = single_step();
        let turn = TurnExecutor::run_turn(&orchestrator, "i-1", &[started()], 0);

        assert_eq!(turn.outcome, TurnOutcome::Pending);
        assert_eq!(turn.actions.len(), 1);
        assert_eq!(turn.new_events.len(), 1);
    }

    #[test]
    fn completes_once_the_result_is_recorded() {
        let orchestrator = single_step();
        let first = TurnExecutor::run_turn(&orchestrator, "i-1", &[started()], 0);

        let mut history = vec![started()];
        history.extend(first.new_events);
        let committed = history.len();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 2).unwrap();
        history.push(HistoryEvent::ActivityCompleted {
            id: 0,
            response: ActivityResponse::completed_at(at),
            timestamp: at,
        });

        let second = TurnExecutor::run_turn(&orchestrator, "i-1", &history, committed);
        assert!(second.actions.is_empty());
        assert_eq!(
            second.outcome,
            TurnOutcome::Completed(json!({"input": {"n": 1}, "success": true}))
        );

        assert_eq!(TurnExecutor::replay(&orchestrator, "i-1", &history), second.outcome);
    }

    #[test]
    fn orchestrator_errors_fail_the_turn() {
        let orchestrator = FnOrchestrator::new("broken", |_ctx, _input| async move {
            Err::<Value, _>(OrchestrationError::Failed("bad input".to_string()))
        });
        let turn = TurnExecutor::run_turn(&orchestrator, "i-1", &[started()], 0);
        assert_eq!(
            turn.outcome,
            TurnOutcome::Failed(OrchestrationError::Failed("bad input".to_string()))
        );
    }

    #[test]
    fn continue_as_new_overrides_completion() {
        let orchestrator = FnOrchestrator::new("looping", |ctx: OrchestrationContext, _input| async move {
            ctx.continue_as_new(json!({"data": {"round": 2}}));
            Ok::<Value, OrchestrationError>(Value::Null)
        });
        let turn = TurnExecutor::run_turn(&orchestrator, "i-1", &[started()], 0);
        assert_eq!(
            turn.outcome,
            TurnOutcome::ContinuedAsNew(json!({"data": {"round": 2}}))
        );
    }
}
