//! Fan-out / fan-in over durable tasks.

use crate::{context::DurableTask, OrchestrationError, TaskFailure};
use indexmap::IndexMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Named group of tasks dispatched together.
///
/// Insertion order is the canonical task index: joined results come back in
/// this order no matter which task completed first.
pub struct FanOut<T> {
    tasks: IndexMap<String, T>,
}

impl<T: DurableTask> FanOut<T> {
    pub fn new() -> Self {
        Self {
            tasks: IndexMap::new(),
        }
    }

    /// Add a task; names must be unique within the group
    pub fn add(&mut self, name: impl Into<String>, task: T) -> Result<(), OrchestrationError> {
        let name = name.into();
        if self.tasks.contains_key(&name) {
            return Err(OrchestrationError::DuplicateTask(name));
        }
        self.tasks.insert(name, task);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }

    pub fn when_all(self) -> WhenAll<T> {
        when_all(self.tasks)
    }

    pub fn when_any(self) -> WhenAny<T> {
        when_any(self.tasks)
    }
}

impl<T: DurableTask> Default for FanOut<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for every task in the group.
///
/// Resolves with all outputs in insertion order, or with the first failure
/// as recorded in history. Successful outputs of a failed group are dropped.
pub fn when_all<T: DurableTask>(tasks: IndexMap<String, T>) -> WhenAll<T> {
    WhenAll { tasks }
}

/// Wait for the first task in the group to finish, successfully or not
pub fn when_any<T: DurableTask>(tasks: IndexMap<String, T>) -> WhenAny<T> {
    WhenAny { tasks }
}

pub struct WhenAll<T> {
    tasks: IndexMap<String, T>,
}

impl<T: DurableTask + Unpin> Future for WhenAll<T> {
    type Output = Result<IndexMap<String, T::Output>, TaskFailure>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut outputs = IndexMap::with_capacity(self.tasks.len());
        let mut positions = Vec::with_capacity(self.tasks.len());
        let mut failure: Option<(usize, &T, TaskFailure)> = None;
        let mut pending = false;

        for (name, task) in &self.tasks {
            match task.outcome() {
                Some((position, Ok(output))) => {
                    outputs.insert(name.clone(), output);
                    positions.push((position, task));
                }
                Some((position, Err(message))) => {
                    let earlier = failure.as_ref().map_or(true, |(seen, _, _)| position < *seen);
                    if earlier {
                        failure = Some((position, task, TaskFailure::new(name.clone(), message)));
                    }
                }
                None => pending = true,
            }
        }

        // Only the events the join resolves with are consumed
        if let Some((position, task, failure)) = failure {
            task.consume(position);
            return Poll::Ready(Err(failure));
        }
        if pending {
            return Poll::Pending;
        }
        for (position, task) in positions {
            task.consume(position);
        }
        Poll::Ready(Ok(outputs))
    }
}

pub struct WhenAny<T> {
    tasks: IndexMap<String, T>,
}

impl<T: DurableTask + Unpin> Future for WhenAny<T> {
    type Output = (String, Result<T::Output, TaskFailure>);

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut first: Option<(usize, &T, String, Result<T::Output, String>)> = None;

        for (name, task) in &self.tasks {
            if let Some((position, result)) = task.outcome() {
                if first.as_ref().map_or(true, |(seen, _, _, _)| position < *seen) {
                    first = Some((position, task, name.clone(), result));
                }
            }
        }

        match first {
            Some((position, task, name, result)) => {
                task.consume(position);
                let result = result.map_err(|message| TaskFailure::new(name.clone(), message));
                Poll::Ready((name, result))
            }
            None => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ActivityRequest, ActivityResponse, HistoryEvent, OrchestrationContext};
    use chrono::{DateTime, TimeZone, Utc};
    use futures::task::noop_waker_ref;
    use serde_json::json;

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, secs).unwrap()
    }

    fn scheduled(id: u64, name: &str) -> HistoryEvent {
        HistoryEvent::ActivityScheduled {
            id,
            name: name.to_string(),
            request: ActivityRequest::default(),
        }
    }

    fn completed(id: u64, secs: u32) -> HistoryEvent {
        HistoryEvent::ActivityCompleted {
            id,
            response: ActivityResponse::start(at(0)).complete(at(secs)),
            timestamp: at(secs),
        }
    }

    fn failed(id: u64, error: &str, secs: u32) -> HistoryEvent {
        HistoryEvent::ActivityFailed {
            id,
            error: error.to_string(),
            timestamp: at(secs),
        }
    }

    fn context_with(extra: Vec<HistoryEvent>, committed: usize) -> OrchestrationContext {
        let mut history = vec![
            HistoryEvent::ExecutionStarted {
                name: "test".to_string(),
                input: json!({}),
                timestamp: at(0),
            },
            scheduled(0, "provision_equipment"),
            scheduled(1, "prepare_paperwork"),
        ];
        history.extend(extra);
        OrchestrationContext::new("i-1", history, committed)
    }

    fn context(extra: Vec<HistoryEvent>) -> OrchestrationContext {
        context_with(extra, 3)
    }

    fn group(ctx: &OrchestrationContext) -> FanOut<crate::ActivityTask> {
        let mut fan_out = FanOut::new();
        fan_out
            .add("provision_equipment", ctx.call_activity("provision_equipment", ActivityRequest::new()))
            .unwrap();
        fan_out
            .add("prepare_paperwork", ctx.call_activity("prepare_paperwork", ActivityRequest::new()))
            .unwrap();
        fan_out
    }

    fn poll<F: Future + Unpin>(fut: &mut F) -> Poll<F::Output> {
        let mut cx = Context::from_waker(noop_waker_ref());
        Pin::new(fut).poll(&mut cx)
    }

    #[test]
    fn results_follow_insertion_order_not_completion_order() {
        // prepare_paperwork (id 1) completes before provision_equipment (id 0)
        let ctx = context(vec![completed(1, 1), completed(0, 2)]);
        let mut join = group(&ctx).when_all();

        match poll(&mut join) {
            Poll::Ready(Ok(results)) => {
                let names: Vec<_> = results.keys().cloned().collect();
                assert_eq!(names, vec!["provision_equipment", "prepare_paperwork"]);
            }
            _ => panic!("join should be complete"),
        }
    }

    #[test]
    fn pending_until_every_task_completes() {
        let ctx = context(vec![completed(1, 1)]);
        let mut join = group(&ctx).when_all();
        assert!(poll(&mut join).is_pending());
    }

    #[test]
    fn single_failure_fails_the_group_even_with_tasks_pending() {
        let ctx = context(vec![failed(1, "boom", 1)]);
        let mut join = group(&ctx).when_all();

        match poll(&mut join) {
            Poll::Ready(Err(failure)) => {
                assert_eq!(failure.task, "prepare_paperwork");
                assert_eq!(failure.message, "boom");
            }
            _ => panic!("join should fail"),
        }
    }

    #[test]
    fn earliest_recorded_failure_wins() {
        let ctx = context(vec![failed(1, "first", 1), failed(0, "second", 2)]);
        let mut join = group(&ctx).when_all();

        match poll(&mut join) {
            Poll::Ready(Err(failure)) => assert_eq!(failure.message, "first"),
            _ => panic!("join should fail"),
        }
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let ctx = context(vec![]);
        let mut fan_out = group(&ctx);
        let err = fan_out
            .add("prepare_paperwork", ctx.call_activity("prepare_paperwork", ActivityRequest::new()))
            .unwrap_err();
        assert_eq!(err, OrchestrationError::DuplicateTask("prepare_paperwork".to_string()));
        assert_eq!(fan_out.len(), 2);
    }

    #[test]
    fn empty_group_joins_immediately() {
        let mut join = FanOut::<crate::ActivityTask>::new().when_all();
        match poll(&mut join) {
            Poll::Ready(Ok(results)) => assert!(results.is_empty()),
            _ => panic!("empty join should be ready"),
        }
    }

    #[test]
    fn when_any_picks_earliest_in_history() {
        let ctx = context(vec![completed(1, 1), completed(0, 2)]);
        let mut race = group(&ctx).when_any();

        match poll(&mut race) {
            Poll::Ready((name, Ok(_))) => assert_eq!(name, "prepare_paperwork"),
            _ => panic!("race should be decided"),
        }
    }

    #[test]
    fn when_any_leaves_the_losing_completion_unconsumed() {
        // Both completions were seen by earlier turns; the later one must not
        // move the clock or end replay
        let ctx = context_with(vec![completed(1, 2), completed(0, 9)], 5);
        let mut race = group(&ctx).when_any();

        match poll(&mut race) {
            Poll::Ready((name, Ok(_))) => assert_eq!(name, "prepare_paperwork"),
            _ => panic!("race should be decided"),
        }
        assert_eq!(ctx.current_utc_datetime(), at(2));
        assert!(crate::ReplayAware::is_replaying(&ctx));
    }

    #[test]
    fn failed_join_consumes_only_the_deciding_failure() {
        let ctx = context_with(vec![failed(1, "boom", 1), completed(0, 7)], 4);
        let mut join = group(&ctx).when_all();

        assert!(matches!(poll(&mut join), Poll::Ready(Err(_))));
        assert_eq!(ctx.current_utc_datetime(), at(1));
        assert!(crate::ReplayAware::is_replaying(&ctx));
    }

    #[test]
    fn pending_join_does_not_advance_the_clock() {
        let ctx = context_with(vec![completed(1, 4)], 3);
        let mut join = group(&ctx).when_all();

        assert!(poll(&mut join).is_pending());
        assert_eq!(ctx.current_utc_datetime(), at(0));
    }

    #[test]
    fn successful_join_advances_to_the_latest_completion() {
        let ctx = context_with(vec![completed(1, 2), completed(0, 5)], 3);
        let mut join = group(&ctx).when_all();

        assert!(matches!(poll(&mut join), Poll::Ready(Ok(_))));
        assert_eq!(ctx.current_utc_datetime(), at(5));
        assert!(!crate::ReplayAware::is_replaying(&ctx));
    }
}
