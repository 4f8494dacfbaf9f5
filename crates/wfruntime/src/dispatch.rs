use crate::config::RuntimeConfig;
use crate::registry::ActivityRegistry;
use crate::store::Inbox;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use wfcore::{
    Action, Activity, ActivityContext, ActivityError, ActivityRequest, ActivityResponse,
    HistoryEvent, TaskId,
};

/// Executes the side effects requested by a turn and reports their outcome
/// back to the owning instance as history events.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    activities: Arc<ActivityRegistry>,
    config: RuntimeConfig,
    semaphore: Arc<Semaphore>,
    shutdown: CancellationToken,
}

impl Dispatcher {
    pub(crate) fn new(
        activities: Arc<ActivityRegistry>,
        config: RuntimeConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_parallel_activities.max(1)));
        Self {
            activities,
            config,
            semaphore,
            shutdown,
        }
    }

    pub(crate) fn dispatch(&self, instance_id: &str, action: Action, inbox: Inbox) {
        match action {
            Action::ScheduleActivity { id, name, request } => {
                let dispatcher = self.clone();
                let ctx = ActivityContext::new(instance_id, id, name);
                tokio::spawn(async move {
                    let event = tokio::select! {
                        _ = dispatcher.shutdown.cancelled() => return,
                        event = dispatcher.run_activity(ctx, request) => event,
                    };
                    if inbox.send(event).is_err() {
                        tracing::debug!("Instance gone before activity {} reported", id);
                    }
                });
            }
            Action::CreateTimer { id, fire_at } => {
                let shutdown = self.shutdown.clone();
                tokio::spawn(async move {
                    let delay = (fire_at - Utc::now()).to_std().unwrap_or_default();
                    tokio::select! {
                        _ = shutdown.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    if inbox.send(HistoryEvent::TimerFired { id, fire_at }).is_err() {
                        tracing::debug!("Instance gone before timer {} fired", id);
                    }
                });
            }
            Action::WaitForEvent { id, name } => {
                // Raised events arrive through the inbox on their own
                tracing::debug!(instance_id, "Task {} waiting for event '{}'", id, name);
            }
        }
    }

    /// Run an activity to a terminal outcome, retrying per policy
    pub(crate) async fn run_activity(&self, ctx: ActivityContext, request: ActivityRequest) -> HistoryEvent {
        let id = ctx.task_id;
        let activity = match self.activities.get(&ctx.activity_name) {
            Some(activity) => activity,
            None => {
                tracing::error!("Activity not registered: {}", ctx.activity_name);
                return failed(id, ActivityError::NotRegistered(ctx.activity_name), Utc::now());
            }
        };

        let policy = &self.config.retry_policy;
        let mut attempt = 1;
        loop {
            let result = self
                .attempt(activity.as_ref(), ctx.clone().with_attempt(attempt), request.clone())
                .await;

            match result {
                Ok(response) => {
                    tracing::info!(
                        instance_id = %ctx.instance_id,
                        "Activity {} ({}) completed on attempt {}",
                        ctx.activity_name,
                        id,
                        attempt
                    );
                    return completed(id, response);
                }
                Err(err) if err.is_retryable() && policy.allows_another(attempt) => {
                    let delay = policy.delay_for(attempt);
                    tracing::warn!(
                        instance_id = %ctx.instance_id,
                        "Activity {} failed on attempt {}: {}; retrying in {:?}",
                        ctx.activity_name,
                        attempt,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    tracing::error!(
                        instance_id = %ctx.instance_id,
                        "Activity {} failed: {}",
                        ctx.activity_name,
                        err
                    );
                    return failed(id, err, Utc::now());
                }
            }
        }
    }

    async fn attempt(
        &self,
        activity: &dyn Activity,
        ctx: ActivityContext,
        request: ActivityRequest,
    ) -> Result<ActivityResponse, ActivityError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| ActivityError::Cancelled)?;

        match self.config.activity_timeout {
            Some(limit) => match timeout(limit, activity.execute(ctx, request)).await {
                Ok(result) => result,
                Err(_) => Err(ActivityError::Timeout {
                    millis: limit.as_millis() as u64,
                }),
            },
            None => activity.execute(ctx, request).await,
        }
    }
}

fn completed(id: TaskId, response: ActivityResponse) -> HistoryEvent {
    let timestamp = response.end_time.unwrap_or_else(Utc::now);
    HistoryEvent::ActivityCompleted {
        id,
        response,
        timestamp,
    }
}

fn failed(id: TaskId, error: ActivityError, timestamp: DateTime<Utc>) -> HistoryEvent {
    HistoryEvent::ActivityFailed {
        id,
        error: error.to_string(),
        timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Fails until the given attempt, then succeeds
    struct Flaky {
        succeed_on: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Activity for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn execute(
            &self,
            ctx: ActivityContext,
            _request: ActivityRequest,
        ) -> Result<ActivityResponse, ActivityError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if ctx.attempt >= self.succeed_on {
                Ok(ActivityResponse::completed_at(Utc::now()))
            } else {
                Err(ActivityError::failed(format!("attempt {} failed", ctx.attempt)))
            }
        }
    }

    struct Slow;

    #[async_trait]
    impl Activity for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        async fn execute(
            &self,
            _ctx: ActivityContext,
            _request: ActivityRequest,
        ) -> Result<ActivityResponse, ActivityError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ActivityResponse::completed_at(Utc::now()))
        }
    }

    fn dispatcher(activity: Arc<dyn Activity>, config: RuntimeConfig) -> Dispatcher {
        let mut registry = ActivityRegistry::new();
        registry.register(activity);
        Dispatcher::new(Arc::new(registry), config, CancellationToken::new())
    }

    #[tokio::test]
    async fn retries_until_success() {
        let flaky = Arc::new(Flaky {
            succeed_on: 2,
            calls: AtomicU32::new(0),
        });
        let config = RuntimeConfig::default().with_retry_policy(RetryPolicy {
            max_attempts: 3,
            delay_ms: 1,
            backoff_multiplier: 1.0,
        });
        let dispatcher = dispatcher(flaky.clone(), config);

        let event = dispatcher
            .run_activity(ActivityContext::new("i-1", 0, "flaky"), ActivityRequest::new())
            .await;

        assert!(matches!(event, HistoryEvent::ActivityCompleted { id: 0, .. }));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn no_retry_by_default() {
        let flaky = Arc::new(Flaky {
            succeed_on: 2,
            calls: AtomicU32::new(0),
        });
        let dispatcher = dispatcher(flaky.clone(), RuntimeConfig::default());

        let event = dispatcher
            .run_activity(ActivityContext::new("i-1", 3, "flaky"), ActivityRequest::new())
            .await;

        match event {
            HistoryEvent::ActivityFailed { id, error, .. } => {
                assert_eq!(id, 3);
                assert_eq!(error, "attempt 1 failed");
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeout_is_reported_as_failure() {
        let config = RuntimeConfig::default().with_activity_timeout(Duration::from_millis(20));
        let dispatcher = dispatcher(Arc::new(Slow), config);

        let event = dispatcher
            .run_activity(ActivityContext::new("i-1", 0, "slow"), ActivityRequest::new())
            .await;

        match event {
            HistoryEvent::ActivityFailed { error, .. } => assert_eq!(error, "Timeout after 20ms"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn unknown_activity_fails_without_retry() {
        let config = RuntimeConfig::default().with_retry_policy(RetryPolicy::default());
        let dispatcher = dispatcher(Arc::new(Slow), config);

        let event = dispatcher
            .run_activity(ActivityContext::new("i-1", 1, "missing"), ActivityRequest::new())
            .await;

        match event {
            HistoryEvent::ActivityFailed { error, .. } => {
                assert_eq!(error, "Activity not registered: missing")
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
