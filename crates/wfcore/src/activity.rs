use crate::{history::TaskId, ActivityError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A unit of side-effecting work invoked by name from an orchestrator.
///
/// The runtime dispatches activities at least once and may retry them, so
/// implementations must be safe to re-execute.
#[async_trait]
pub trait Activity: Send + Sync {
    /// Registered name (e.g., "provision_equipment")
    fn name(&self) -> &str;

    /// Run the activity body
    async fn execute(
        &self,
        ctx: ActivityContext,
        request: ActivityRequest,
    ) -> Result<ActivityResponse, ActivityError>;

    /// Optional: human readable description for listings
    fn description(&self) -> &str {
        ""
    }
}

/// Invocation details handed to an activity by the runtime
#[derive(Debug, Clone)]
pub struct ActivityContext {
    pub instance_id: String,
    pub task_id: TaskId,
    pub activity_name: String,
    /// 1-based attempt counter; greater than 1 when the runtime retries
    pub attempt: u32,
}

impl ActivityContext {
    pub fn new(instance_id: impl Into<String>, task_id: TaskId, activity_name: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            task_id,
            activity_name: activity_name.into(),
            attempt: 1,
        }
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }
}

/// Input payload passed to an activity.
///
/// Opaque to the orchestrator. Domain fields travel in `payload`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityRequest {
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub payload: Map<String, Value>,
}

impl ActivityRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }
}

/// Outcome of a single activity invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityResponse {
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub success: bool,
    pub error: Option<String>,
}

impl ActivityResponse {
    /// Response for an invocation that has started but not finished
    pub fn start(at: DateTime<Utc>) -> Self {
        Self {
            start_time: at,
            end_time: None,
            success: false,
            error: None,
        }
    }

    pub fn complete(mut self, at: DateTime<Utc>) -> Self {
        self.end_time = Some(at);
        self.success = true;
        self.error = None;
        self
    }

    pub fn fail(mut self, at: DateTime<Utc>, error: impl Into<String>) -> Self {
        self.end_time = Some(at);
        self.success = false;
        self.error = Some(error.into());
        self
    }

    /// Response for something that finished at a known instant (events, timers)
    pub fn completed_at(at: DateTime<Utc>) -> Self {
        Self::start(at).complete(at)
    }
}

/// Kind of entry recorded in the activity history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    Activity,
    Event,
    Timer,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::Activity => "activity",
            ActivityType::Event => "event",
            ActivityType::Timer => "timer",
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn response_transitions() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 2).unwrap();

        let running = ActivityResponse::start(start);
        assert!(!running.success);
        assert!(running.end_time.is_none());

        let done = running.clone().complete(end);
        assert!(done.success);
        assert_eq!(done.end_time, Some(end));

        let failed = running.fail(end, "boom");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }

    #[test]
    fn response_uses_camel_case_wire_names() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let json = serde_json::to_value(ActivityResponse::completed_at(at)).unwrap();

        assert!(json.get("startTime").is_some());
        assert!(json.get("endTime").is_some());
        assert_eq!(json["success"], true);
        assert!(json["error"].is_null());
    }

    #[test]
    fn empty_request_serializes_to_empty_object() {
        let json = serde_json::to_value(ActivityRequest::new()).unwrap();
        assert_eq!(json, serde_json::json!({}));

        let request = ActivityRequest::new().with_field("employee", "ada");
        assert_eq!(request.payload["employee"], "ada");
    }

    #[test]
    fn activity_type_serializes_lowercase() {
        assert_eq!(serde_json::to_value(ActivityType::Timer).unwrap(), "timer");
        assert_eq!(ActivityType::Event.to_string(), "event");
    }
}
