use crate::RuntimeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, RwLock};
use wfcore::HistoryEvent;

/// Lifecycle state of an orchestration instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RuntimeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RuntimeStatus::Completed | RuntimeStatus::Failed)
    }
}

/// Externally visible snapshot of an instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceStatus {
    pub instance_id: String,
    pub workflow: String,
    pub status: RuntimeStatus,
    pub input: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub history_len: usize,
}

/// Channel into an instance driver; carries completions and raised events
pub(crate) type Inbox = mpsc::UnboundedSender<HistoryEvent>;

struct InstanceRecord {
    status: InstanceStatus,
    history: Vec<HistoryEvent>,
    inbox: Option<Inbox>,
    watch: watch::Sender<RuntimeStatus>,
}

/// In-memory instance state.
///
/// Each instance has exactly one writer: the driver task that owns its
/// history. Readers get cloned snapshots.
#[derive(Clone, Default)]
pub struct InstanceStore {
    instances: Arc<RwLock<HashMap<String, InstanceRecord>>>,
}

impl InstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn create(
        &self,
        instance_id: &str,
        workflow: &str,
        input: Value,
        history: Vec<HistoryEvent>,
        inbox: Inbox,
    ) -> Result<(), RuntimeError> {
        let mut instances = self.instances.write().await;
        if instances.contains_key(instance_id) {
            return Err(RuntimeError::InstanceExists(instance_id.to_string()));
        }

        let now = Utc::now();
        let (watch, _) = watch::channel(RuntimeStatus::Pending);
        instances.insert(
            instance_id.to_string(),
            InstanceRecord {
                status: InstanceStatus {
                    instance_id: instance_id.to_string(),
                    workflow: workflow.to_string(),
                    status: RuntimeStatus::Pending,
                    input,
                    output: None,
                    error: None,
                    created_at: now,
                    updated_at: now,
                    history_len: history.len(),
                },
                history,
                inbox: Some(inbox),
                watch,
            },
        );
        Ok(())
    }

    pub(crate) async fn record_progress(&self, instance_id: &str, history: &[HistoryEvent]) {
        let mut instances = self.instances.write().await;
        if let Some(record) = instances.get_mut(instance_id) {
            record.history = history.to_vec();
            record.status.status = RuntimeStatus::Running;
            record.status.history_len = history.len();
            record.status.updated_at = Utc::now();
            record.watch.send_replace(RuntimeStatus::Running);
        }
    }

    /// Continue-as-new: fresh history, new input, new inbox
    pub(crate) async fn restart(
        &self,
        instance_id: &str,
        input: Value,
        history: &[HistoryEvent],
        inbox: Inbox,
    ) {
        let mut instances = self.instances.write().await;
        if let Some(record) = instances.get_mut(instance_id) {
            record.history = history.to_vec();
            record.inbox = Some(inbox);
            record.status.input = input;
            record.status.history_len = history.len();
            record.status.updated_at = Utc::now();
        }
    }

    pub(crate) async fn finish(
        &self,
        instance_id: &str,
        status: RuntimeStatus,
        output: Option<Value>,
        error: Option<String>,
        history: &[HistoryEvent],
    ) {
        let mut instances = self.instances.write().await;
        if let Some(record) = instances.get_mut(instance_id) {
            record.history = history.to_vec();
            record.inbox = None;
            record.status.status = status;
            record.status.output = output;
            record.status.error = error;
            record.status.history_len = history.len();
            record.status.updated_at = Utc::now();
            record.watch.send_replace(status);
        }
    }

    pub async fn status(&self, instance_id: &str) -> Option<InstanceStatus> {
        let instances = self.instances.read().await;
        instances.get(instance_id).map(|r| r.status.clone())
    }

    pub async fn history(&self, instance_id: &str) -> Option<Vec<HistoryEvent>> {
        let instances = self.instances.read().await;
        instances.get(instance_id).map(|r| r.history.clone())
    }

    /// All instances, oldest first
    pub async fn list(&self) -> Vec<InstanceStatus> {
        let instances = self.instances.read().await;
        let mut statuses: Vec<InstanceStatus> =
            instances.values().map(|r| r.status.clone()).collect();
        statuses.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.instance_id.cmp(&b.instance_id))
        });
        statuses
    }

    pub(crate) async fn inbox(&self, instance_id: &str) -> Result<Inbox, RuntimeError> {
        let instances = self.instances.read().await;
        let record = instances
            .get(instance_id)
            .ok_or_else(|| RuntimeError::InstanceNotFound(instance_id.to_string()))?;
        record
            .inbox
            .clone()
            .ok_or_else(|| RuntimeError::InstanceNotRunning(instance_id.to_string()))
    }

    /// Drop a completed or failed instance and its history
    pub async fn purge(&self, instance_id: &str) -> Result<InstanceStatus, RuntimeError> {
        let mut instances = self.instances.write().await;
        let record = instances
            .get(instance_id)
            .ok_or_else(|| RuntimeError::InstanceNotFound(instance_id.to_string()))?;
        if !record.status.status.is_terminal() {
            return Err(RuntimeError::InstanceRunning(instance_id.to_string()));
        }
        instances
            .remove(instance_id)
            .map(|record| record.status)
            .ok_or_else(|| RuntimeError::InstanceNotFound(instance_id.to_string()))
    }

    pub(crate) async fn subscribe(&self, instance_id: &str) -> Option<watch::Receiver<RuntimeStatus>> {
        let instances = self.instances.read().await;
        instances.get(instance_id).map(|r| r.watch.subscribe())
    }
}
