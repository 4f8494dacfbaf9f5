//! Orchestration context and the durable task handles it hands out.
//!
//! An orchestrator is an async function that receives an
//! [`OrchestrationContext`] and is polled exactly once per turn against a
//! snapshot of the instance history. Tasks resolve only from recorded
//! history, never from live I/O, so polling the same function against the
//! same history always reaches the same state.

use crate::{
    history::{HistoryEvent, TaskId},
    ActivityRequest, ActivityResponse, OrchestrationError, TaskFailure,
};
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

/// Anything that can tell whether the orchestrator is replaying recorded history
pub trait ReplayAware {
    fn instance_id(&self) -> &str;
    fn is_replaying(&self) -> bool;
}

/// Work requested from the runtime during a turn
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    ScheduleActivity {
        id: TaskId,
        name: String,
        request: ActivityRequest,
    },
    CreateTimer {
        id: TaskId,
        fire_at: DateTime<Utc>,
    },
    WaitForEvent {
        id: TaskId,
        name: String,
    },
}

/// Side products of a turn, collected after the orchestrator future is polled
#[derive(Debug, Default)]
pub struct TurnRecord {
    /// Events the orchestrator appended (task schedules)
    pub new_events: Vec<HistoryEvent>,
    pub actions: Vec<Action>,
    pub continue_as_new: Option<Value>,
    pub violation: Option<OrchestrationError>,
}

/// A durable task whose outcome is read from history.
///
/// `outcome` only looks: it returns the history position of the completing
/// event alongside the result, so joins can order outcomes the same way on
/// every replay. The clock and the replay flag move only when a position is
/// handed to `consume`.
pub trait DurableTask {
    type Output;

    fn outcome(&self) -> Option<(usize, Result<Self::Output, String>)>;

    /// Mark the event at `position` as seen by the orchestrator
    fn consume(&self, position: usize);
}

struct ContextState {
    history: Vec<HistoryEvent>,
    /// Events recorded by earlier turns; consuming one of these is replay
    committed: usize,
    turn_start: usize,
    replaying: bool,
    current_time: DateTime<Utc>,
    next_task_id: TaskId,
    event_waits: HashMap<String, usize>,
    actions: Vec<Action>,
    continue_as_new: Option<Value>,
    violation: Option<OrchestrationError>,
}

impl ContextState {
    fn allocate(&mut self) -> TaskId {
        let id = self.next_task_id;
        self.next_task_id += 1;
        id
    }

    fn flag(&mut self, err: OrchestrationError) {
        if self.violation.is_none() {
            self.violation = Some(err);
        }
    }

    /// Record a schedule unless history already holds it for this id
    fn schedule(&mut self, id: TaskId, event: HistoryEvent, action: Action) {
        let recorded = self
            .history
            .iter()
            .find(|e| e.is_scheduling() && e.task_id() == Some(id))
            .map(HistoryEvent::describe);

        match recorded {
            Some(recorded) => {
                let requested = event.describe();
                if recorded != requested {
                    self.flag(OrchestrationError::NonDeterminism {
                        id,
                        recorded,
                        requested,
                    });
                }
            }
            None => {
                self.replaying = false;
                self.history.push(event);
                self.actions.push(action);
            }
        }
    }

    fn observe(&mut self, index: usize) {
        if index >= self.history.len() {
            return;
        }
        if index >= self.committed {
            self.replaying = false;
        }
        if let Some(ts) = self.history[index].timestamp() {
            if ts > self.current_time {
                self.current_time = ts;
            }
        }
    }

    fn activity_outcome(&self, id: TaskId) -> Option<(usize, Result<ActivityResponse, String>)> {
        self.history.iter().enumerate().find_map(|(i, e)| match e {
            HistoryEvent::ActivityCompleted { id: done, response, .. } if *done == id => {
                Some((i, Ok(response.clone())))
            }
            HistoryEvent::ActivityFailed { id: done, error, .. } if *done == id => {
                Some((i, Err(error.clone())))
            }
            _ => None,
        })
    }

    fn timer_outcome(&self, id: TaskId) -> Option<(usize, Result<DateTime<Utc>, String>)> {
        self.history.iter().enumerate().find_map(|(i, e)| match e {
            HistoryEvent::TimerFired { id: fired, fire_at } if *fired == id => Some((i, Ok(*fire_at))),
            _ => None,
        })
    }

    fn event_outcome(&self, name: &str, ordinal: usize) -> Option<(usize, Result<Value, String>)> {
        self.history
            .iter()
            .enumerate()
            .filter_map(|(i, e)| match e {
                HistoryEvent::EventRaised { name: raised, data, .. } if raised == name => {
                    Some((i, Ok(data.clone())))
                }
                _ => None,
            })
            .nth(ordinal)
    }
}

/// Handle through which an orchestrator talks to the durable runtime.
///
/// Cheap to clone; every clone shares the same turn state. Not `Send`: a
/// turn runs on a single thread.
#[derive(Clone)]
pub struct OrchestrationContext {
    instance_id: Rc<str>,
    state: Rc<RefCell<ContextState>>,
}

impl OrchestrationContext {
    /// Build the context for one turn.
    ///
    /// `committed` is the number of leading events that earlier turns have
    /// already seen; anything after it was delivered since the last turn.
    pub fn new(instance_id: impl Into<String>, history: Vec<HistoryEvent>, committed: usize) -> Self {
        let committed = committed.min(history.len());
        let current_time = history
            .iter()
            .find_map(|e| match e {
                HistoryEvent::ExecutionStarted { timestamp, .. } => Some(*timestamp),
                _ => None,
            })
            .unwrap_or_default();
        let turn_start = history.len();

        Self {
            instance_id: Rc::from(instance_id.into()),
            state: Rc::new(RefCell::new(ContextState {
                history,
                committed,
                turn_start,
                replaying: committed > 0,
                current_time,
                next_task_id: 0,
                event_waits: HashMap::new(),
                actions: Vec::new(),
                continue_as_new: None,
                violation: None,
            })),
        }
    }

    /// Input recorded when the instance started
    pub fn input(&self) -> Value {
        self.state
            .borrow()
            .history
            .iter()
            .find_map(|e| match e {
                HistoryEvent::ExecutionStarted { input, .. } => Some(input.clone()),
                _ => None,
            })
            .unwrap_or(Value::Null)
    }

    /// Deterministic replacement for the wall clock
    pub fn current_utc_datetime(&self) -> DateTime<Utc> {
        self.state.borrow().current_time
    }

    /// Schedule an activity without waiting for it
    pub fn call_activity(&self, name: impl Into<String>, request: ActivityRequest) -> ActivityTask {
        let name = name.into();
        let mut state = self.state.borrow_mut();
        let id = state.allocate();
        state.schedule(
            id,
            HistoryEvent::ActivityScheduled {
                id,
                name: name.clone(),
                request: request.clone(),
            },
            Action::ScheduleActivity {
                id,
                name: name.clone(),
                request,
            },
        );
        drop(state);

        ActivityTask {
            id,
            name,
            ctx: self.clone(),
        }
    }

    pub fn create_timer(&self, fire_at: DateTime<Utc>) -> TimerTask {
        let mut state = self.state.borrow_mut();
        let id = state.allocate();
        state.schedule(
            id,
            HistoryEvent::TimerCreated { id, fire_at },
            Action::CreateTimer { id, fire_at },
        );
        drop(state);

        TimerTask {
            id,
            ctx: self.clone(),
        }
    }

    /// Timer relative to the orchestration clock
    pub fn create_timer_after(&self, delay: Duration) -> TimerTask {
        let fire_at = self.current_utc_datetime() + delay;
        self.create_timer(fire_at)
    }

    /// Wait for the next external event with this name.
    ///
    /// The n-th wait for a name resolves with the n-th raised event of that
    /// name, whether it was raised before or after the wait.
    pub fn wait_for_external_event(&self, name: impl Into<String>) -> EventTask {
        let name = name.into();
        let mut state = self.state.borrow_mut();
        let id = state.allocate();
        let ordinal = {
            let count = state.event_waits.entry(name.clone()).or_insert(0);
            let ordinal = *count;
            *count += 1;
            ordinal
        };
        state.schedule(
            id,
            HistoryEvent::EventSubscribed {
                id,
                name: name.clone(),
            },
            Action::WaitForEvent {
                id,
                name: name.clone(),
            },
        );
        drop(state);

        EventTask {
            name,
            ordinal,
            ctx: self.clone(),
        }
    }

    /// Ask the runtime to restart this instance with fresh history and `input`
    pub fn continue_as_new(&self, input: Value) {
        self.state.borrow_mut().continue_as_new = Some(input);
    }

    fn consume(&self, position: usize) {
        self.state.borrow_mut().observe(position);
    }

    /// Drain what this turn produced
    pub fn finish_turn(&self) -> TurnRecord {
        let mut state = self.state.borrow_mut();
        let new_events = state.history[state.turn_start..].to_vec();
        TurnRecord {
            new_events,
            actions: std::mem::take(&mut state.actions),
            continue_as_new: state.continue_as_new.take(),
            violation: state.violation.take(),
        }
    }
}

impl ReplayAware for OrchestrationContext {
    fn instance_id(&self) -> &str {
        &self.instance_id
    }

    fn is_replaying(&self) -> bool {
        self.state.borrow().replaying
    }
}

/// Pending activity invocation
pub struct ActivityTask {
    id: TaskId,
    name: String,
    ctx: OrchestrationContext,
}

impl ActivityTask {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl DurableTask for ActivityTask {
    type Output = ActivityResponse;

    fn outcome(&self) -> Option<(usize, Result<ActivityResponse, String>)> {
        self.ctx.state.borrow().activity_outcome(self.id)
    }

    fn consume(&self, position: usize) {
        self.ctx.consume(position);
    }
}

impl Future for ActivityTask {
    type Output = Result<ActivityResponse, TaskFailure>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.outcome() {
            Some((position, result)) => {
                self.consume(position);
                Poll::Ready(result.map_err(|message| TaskFailure::new(self.name.clone(), message)))
            }
            None => Poll::Pending,
        }
    }
}

/// Pending durable timer; resolves with its fire time
pub struct TimerTask {
    id: TaskId,
    ctx: OrchestrationContext,
}

impl DurableTask for TimerTask {
    type Output = DateTime<Utc>;

    fn outcome(&self) -> Option<(usize, Result<DateTime<Utc>, String>)> {
        self.ctx.state.borrow().timer_outcome(self.id)
    }

    fn consume(&self, position: usize) {
        self.ctx.consume(position);
    }
}

impl Future for TimerTask {
    type Output = DateTime<Utc>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.outcome() {
            Some((position, Ok(fire_at))) => {
                self.consume(position);
                Poll::Ready(fire_at)
            }
            _ => Poll::Pending,
        }
    }
}

/// Pending external event; resolves with the event payload
pub struct EventTask {
    name: String,
    ordinal: usize,
    ctx: OrchestrationContext,
}

impl EventTask {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl DurableTask for EventTask {
    type Output = Value;

    fn outcome(&self) -> Option<(usize, Result<Value, String>)> {
        self.ctx.state.borrow().event_outcome(&self.name, self.ordinal)
    }

    fn consume(&self, position: usize) {
        self.ctx.consume(position);
    }
}

impl Future for EventTask {
    type Output = Value;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.outcome() {
            Some((position, Ok(data))) => {
                self.consume(position);
                Poll::Ready(data)
            }
            _ => Poll::Pending,
        }
    }
}
