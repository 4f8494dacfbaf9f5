use crate::config::RuntimeConfig;
use crate::dispatch::Dispatcher;
use crate::executor::{Turn, TurnExecutor, TurnOutcome};
use crate::registry::{ActivityRegistry, Orchestrator, OrchestratorRegistry};
use crate::store::{Inbox, InstanceStatus, InstanceStore, RuntimeStatus};
use crate::RuntimeError;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use wfcore::HistoryEvent;

/// Hosts orchestration instances: starts them, drives them turn by turn,
/// and delivers activity results, timers, and external events.
#[derive(Clone)]
pub struct DurableRuntime {
    inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
    activities: Arc<ActivityRegistry>,
    orchestrators: OrchestratorRegistry,
    store: InstanceStore,
    dispatcher: Dispatcher,
    shutdown: CancellationToken,
}

impl DurableRuntime {
    /// Create a runtime with default settings
    pub fn new(activities: ActivityRegistry, orchestrators: OrchestratorRegistry) -> Self {
        Self::with_config(activities, orchestrators, RuntimeConfig::default())
    }

    pub fn with_config(
        activities: ActivityRegistry,
        orchestrators: OrchestratorRegistry,
        config: RuntimeConfig,
    ) -> Self {
        let activities = Arc::new(activities);
        let shutdown = CancellationToken::new();
        let dispatcher = Dispatcher::new(activities.clone(), config, shutdown.clone());

        Self {
            inner: Arc::new(RuntimeInner {
                activities,
                orchestrators,
                store: InstanceStore::new(),
                dispatcher,
                shutdown,
            }),
        }
    }

    pub fn activities(&self) -> &ActivityRegistry {
        &self.inner.activities
    }

    pub fn orchestrators(&self) -> &OrchestratorRegistry {
        &self.inner.orchestrators
    }

    /// Schedule a new instance of `workflow`; returns its instance id.
    ///
    /// A fresh UUID is used when no id is given.
    pub async fn start_instance(
        &self,
        workflow: &str,
        instance_id: Option<String>,
        input: Value,
    ) -> Result<String, RuntimeError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(RuntimeError::ShutDown);
        }

        let orchestrator = self
            .inner
            .orchestrators
            .get(workflow)
            .ok_or_else(|| RuntimeError::UnknownWorkflow(workflow.to_string()))?;

        let instance_id = instance_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let history = vec![HistoryEvent::ExecutionStarted {
            name: workflow.to_string(),
            input: input.clone(),
            timestamp: Utc::now(),
        }];

        let (sender, receiver) = mpsc::unbounded_channel();
        self.inner
            .store
            .create(&instance_id, workflow, input, history.clone(), sender.clone())
            .await?;

        tracing::info!("Starting instance {} of workflow {}", instance_id, workflow);

        let driver = InstanceDriver {
            runtime: self.inner.clone(),
            orchestrator,
            instance_id: instance_id.clone(),
            history,
            sender,
            receiver,
        };
        tokio::spawn(driver.run());

        Ok(instance_id)
    }

    pub async fn get_instance(&self, instance_id: &str) -> Result<InstanceStatus, RuntimeError> {
        self.inner
            .store
            .status(instance_id)
            .await
            .ok_or_else(|| RuntimeError::InstanceNotFound(instance_id.to_string()))
    }

    pub async fn list_instances(&self) -> Vec<InstanceStatus> {
        self.inner.store.list().await
    }

    /// Forget a completed or failed instance
    pub async fn purge_instance(&self, instance_id: &str) -> Result<InstanceStatus, RuntimeError> {
        let status = self.inner.store.purge(instance_id).await?;
        tracing::info!("Purged instance {} ({:?})", instance_id, status.status);
        Ok(status)
    }

    /// Recorded history of the instance's current run
    pub async fn history(&self, instance_id: &str) -> Result<Vec<HistoryEvent>, RuntimeError> {
        self.inner
            .store
            .history(instance_id)
            .await
            .ok_or_else(|| RuntimeError::InstanceNotFound(instance_id.to_string()))
    }

    /// Deliver an external event to a running instance
    pub async fn raise_event(
        &self,
        instance_id: &str,
        name: &str,
        data: Value,
    ) -> Result<(), RuntimeError> {
        let mut event = HistoryEvent::EventRaised {
            name: name.to_string(),
            data,
            timestamp: Utc::now(),
        };
        let mut inbox = self.inner.store.inbox(instance_id).await?;
        // A continue-as-new closes the old inbox after publishing the new one
        while let Err(mpsc::error::SendError(undelivered)) = inbox.send(event) {
            let current = self.inner.store.inbox(instance_id).await?;
            if current.same_channel(&inbox) {
                return Err(RuntimeError::InstanceNotRunning(instance_id.to_string()));
            }
            inbox = current;
            event = undelivered;
        }

        tracing::info!("Raised event '{}' on instance {}", name, instance_id);
        Ok(())
    }

    /// Block until the instance completes or fails
    pub async fn wait_for_completion(
        &self,
        instance_id: &str,
        timeout: Duration,
    ) -> Result<InstanceStatus, RuntimeError> {
        let mut watcher = self
            .inner
            .store
            .subscribe(instance_id)
            .await
            .ok_or_else(|| RuntimeError::InstanceNotFound(instance_id.to_string()))?;

        tokio::time::timeout(timeout, async {
            loop {
                let done = watcher.borrow_and_update().is_terminal();
                if done || watcher.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .map_err(|_| RuntimeError::Timeout(instance_id.to_string()))?;

        self.get_instance(instance_id).await
    }

    /// Re-run the instance's orchestrator over its recorded history
    pub async fn replay_instance(&self, instance_id: &str) -> Result<TurnOutcome, RuntimeError> {
        let status = self.get_instance(instance_id).await?;
        let orchestrator = self
            .inner
            .orchestrators
            .get(&status.workflow)
            .ok_or_else(|| RuntimeError::UnknownWorkflow(status.workflow.clone()))?;
        let history = self.history(instance_id).await?;

        Ok(TurnExecutor::replay(orchestrator.as_ref(), instance_id, &history))
    }

    /// Stop driving instances and cancel in-flight activities and timers
    pub fn shutdown(&self) {
        tracing::info!("Shutting down runtime");
        self.inner.shutdown.cancel();
    }
}

/// Owns one instance's history and runs its turns
struct InstanceDriver {
    runtime: Arc<RuntimeInner>,
    orchestrator: Arc<dyn Orchestrator>,
    instance_id: String,
    history: Vec<HistoryEvent>,
    sender: Inbox,
    receiver: mpsc::UnboundedReceiver<HistoryEvent>,
}

impl InstanceDriver {
    async fn run(mut self) {
        let store = self.runtime.store.clone();
        let mut committed = 0;

        loop {
            let Turn {
                new_events,
                actions,
                outcome,
            } = TurnExecutor::run_turn(
                self.orchestrator.as_ref(),
                &self.instance_id,
                &self.history,
                committed,
            );
            self.history.extend(new_events);
            committed = self.history.len();

            match outcome {
                TurnOutcome::Completed(output) => {
                    self.history.push(HistoryEvent::ExecutionCompleted {
                        output: output.clone(),
                    });
                    store
                        .finish(
                            &self.instance_id,
                            RuntimeStatus::Completed,
                            Some(output),
                            None,
                            &self.history,
                        )
                        .await;
                    tracing::info!("Instance {} completed", self.instance_id);
                    return;
                }
                TurnOutcome::Failed(err) => {
                    let error = err.to_string();
                    self.history.push(HistoryEvent::ExecutionFailed {
                        error: error.clone(),
                    });
                    store
                        .finish(
                            &self.instance_id,
                            RuntimeStatus::Failed,
                            None,
                            Some(error.clone()),
                            &self.history,
                        )
                        .await;
                    tracing::error!("Instance {} failed: {}", self.instance_id, error);
                    return;
                }
                TurnOutcome::ContinuedAsNew(input) => {
                    self.continue_as_new(input).await;
                    committed = 0;
                }
                TurnOutcome::Pending => {
                    store.record_progress(&self.instance_id, &self.history).await;
                    for action in actions {
                        self.runtime
                            .dispatcher
                            .dispatch(&self.instance_id, action, self.sender.clone());
                    }

                    let event = tokio::select! {
                        _ = self.runtime.shutdown.cancelled() => {
                            tracing::info!("Instance {} suspended by shutdown", self.instance_id);
                            return;
                        }
                        event = self.receiver.recv() => event,
                    };
                    let Some(event) = event else {
                        return;
                    };
                    self.history.push(event);
                    while let Ok(event) = self.receiver.try_recv() {
                        self.history.push(event);
                    }
                }
            }
        }
    }

    /// Start a fresh run with `input`. Results of the old run's tasks are
    /// dropped with its inbox; raised events no wait consumed carry over.
    async fn continue_as_new(&mut self, input: Value) {
        let workflow = self.orchestrator.name().to_string();
        tracing::info!(
            "Instance {} continuing as new run of {}",
            self.instance_id,
            workflow
        );

        let (sender, receiver) = mpsc::unbounded_channel();
        let mut old_receiver = std::mem::replace(&mut self.receiver, receiver);
        self.sender = sender;

        let carried = unconsumed_events(&self.history);
        self.history = vec![HistoryEvent::ExecutionStarted {
            name: workflow,
            input: input.clone(),
            timestamp: Utc::now(),
        }];
        self.history.extend(carried);
        self.runtime
            .store
            .restart(&self.instance_id, input, &self.history, self.sender.clone())
            .await;

        old_receiver.close();
        while let Ok(event) = old_receiver.try_recv() {
            if matches!(event, HistoryEvent::EventRaised { .. }) {
                self.history.push(event);
            }
        }
    }
}

/// Raised events beyond the number of waits subscribed for each name.
///
/// The n-th wait for a name consumes the n-th raised event of that name, so
/// the first `waits[name]` events were delivered and the rest were not.
fn unconsumed_events(history: &[HistoryEvent]) -> Vec<HistoryEvent> {
    let mut waits: HashMap<&str, usize> = HashMap::new();
    for event in history {
        if let HistoryEvent::EventSubscribed { name, .. } = event {
            *waits.entry(name.as_str()).or_insert(0) += 1;
        }
    }

    history
        .iter()
        .filter(|event| match event {
            HistoryEvent::EventRaised { name, .. } => match waits.get_mut(name.as_str()) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    false
                }
                _ => true,
            },
            _ => false,
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raised(name: &str, n: u64) -> HistoryEvent {
        HistoryEvent::EventRaised {
            name: name.to_string(),
            data: json!(n),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn only_undelivered_events_carry_over() {
        let history = vec![
            raised("approve", 1),
            HistoryEvent::EventSubscribed {
                id: 0,
                name: "approve".to_string(),
            },
            raised("approve", 2),
            raised("reject", 3),
        ];

        let carried: Vec<Value> = unconsumed_events(&history)
            .into_iter()
            .filter_map(|e| match e {
                HistoryEvent::EventRaised { data, .. } => Some(data),
                _ => None,
            })
            .collect();
        assert_eq!(carried, vec![json!(2), json!(3)]);
    }
}
