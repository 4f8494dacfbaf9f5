use crate::{ActivityRequest, ActivityResponse, ActivityType};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Schema version written into every [`WorkflowData`] record
pub const WORKFLOW_DATA_VERSION: u32 = 1;

/// Debug audit record of one activity, event, or timer completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowActivityInfo {
    pub activity_name: String,
    pub activity_type: ActivityType,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Working state of one orchestration run.
///
/// `original` is the snapshot of the triggering input and never changes after
/// construction; all mutation goes through `data`. The activity history is
/// only written when debug mode was enabled at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowData {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Mutable state, merged from activity outputs and events
    #[serde(default)]
    pub data: Map<String, Value>,

    #[serde(default)]
    original: Map<String, Value>,

    #[serde(default = "default_success")]
    success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,

    #[serde(default)]
    activity_history: Vec<WorkflowActivityInfo>,

    #[serde(skip)]
    debug_mode: bool,
}

fn default_version() -> u32 {
    WORKFLOW_DATA_VERSION
}

fn default_success() -> bool {
    true
}

impl WorkflowData {
    pub fn new(debug_mode: bool) -> Self {
        Self {
            version: WORKFLOW_DATA_VERSION,
            data: Map::new(),
            original: Map::new(),
            success: true,
            error: None,
            activity_history: Vec::new(),
            debug_mode,
        }
    }

    /// Normalize trigger input.
    ///
    /// Input shaped like a serialized record (`data`, `original` or `success`
    /// at the top level) goes through [`from_dict`](Self::from_dict). Any
    /// other object becomes the `original` snapshot. Non-objects give an
    /// empty record.
    pub fn from_input(input: &Value, debug_mode: bool) -> Self {
        match input {
            Value::Object(map)
                if map.contains_key("data")
                    || map.contains_key("original")
                    || map.contains_key("success") =>
            {
                Self::from_dict(input, debug_mode)
            }
            Value::Object(map) => {
                let mut workflow_data = Self::new(debug_mode);
                workflow_data.original = map.clone();
                workflow_data
            }
            _ => Self::new(debug_mode),
        }
    }

    /// Rebuild from `{data, original, success}`; other keys are ignored
    pub fn from_dict(input: &Value, debug_mode: bool) -> Self {
        let mut workflow_data = Self::new(debug_mode);
        let Some(map) = input.as_object() else {
            return workflow_data;
        };

        workflow_data.success = map.get("success").and_then(Value::as_bool).unwrap_or(true);

        if let Some(Value::Object(data)) = map.get("data") {
            workflow_data.data = data.clone();
        }
        if let Some(Value::Object(original)) = map.get("original") {
            workflow_data.original = original.clone();
        }
        workflow_data
    }

    pub fn from_json(json_str: &str, debug_mode: bool) -> Result<Self, serde_json::Error> {
        if json_str.trim().is_empty() {
            return Ok(Self::new(debug_mode));
        }
        let value: Value = serde_json::from_str(json_str)?;
        Ok(Self::from_dict(&value, debug_mode))
    }

    /// `{data, original, success}`, the shape [`from_dict`](Self::from_dict) reads
    pub fn to_dict(&self) -> Value {
        json!({
            "data": self.data.clone(),
            "original": self.original.clone(),
            "success": self.success,
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn original(&self) -> &Map<String, Value> {
        &self.original
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn activity_history(&self) -> &[WorkflowActivityInfo] {
        &self.activity_history
    }

    pub fn is_debug(&self) -> bool {
        self.debug_mode
    }

    /// Record an unrecovered failure
    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.success = false;
        self.error = Some(message.into());
    }

    pub fn add_to_activity_history(
        &mut self,
        activity_name: &str,
        activity_type: ActivityType,
        response: &ActivityResponse,
    ) {
        if self.debug_mode {
            self.activity_history.push(WorkflowActivityInfo {
                activity_name: activity_name.to_string(),
                activity_type,
                start_time: response.start_time,
                end_time: response.end_time,
            });
        }
    }

    /// Record an activity completion. Does not copy any output into `data`.
    pub fn add_activity_response(&mut self, activity_name: &str, response: &ActivityResponse) {
        self.add_to_activity_history(activity_name, ActivityType::Activity, response);
    }

    /// Record an external event and merge its payload into `data`
    pub fn add_event_response(
        &mut self,
        event_name: &str,
        end_time: DateTime<Utc>,
        event_data: Option<&Map<String, Value>>,
    ) {
        let response = ActivityResponse::completed_at(end_time);
        self.add_to_activity_history(event_name, ActivityType::Event, &response);

        if let Some(event_data) = event_data {
            for (key, value) in event_data {
                self.data.insert(key.clone(), value.clone());
            }
        }
    }

    pub fn add_timer_response(&mut self, timer_name: &str, end_time: DateTime<Utc>) {
        let response = ActivityResponse::completed_at(end_time);
        self.add_to_activity_history(timer_name, ActivityType::Timer, &response);
    }

    /// Starting input for a continue-as-new cycle
    pub fn for_continue_as_new(&self) -> Value {
        json!({
            "data": self.data.clone(),
            "original": self.original.clone(),
        })
    }

    pub fn get_activity_request(&self) -> ActivityRequest {
        ActivityRequest::default()
    }

    /// Look up a bool in `data`, then `original`; non-bool values are skipped
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.data
            .get(key)
            .and_then(Value::as_bool)
            .or_else(|| self.original.get(key).and_then(Value::as_bool))
            .unwrap_or(default)
    }

    /// Typed lookup in `data`, then `original`
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let from = |map: &Map<String, Value>| {
            map.get(key)
                .and_then(|value| serde_json::from_value::<T>(value.clone()).ok())
        };
        from(&self.data).or_else(|| from(&self.original))
    }
}

impl Default for WorkflowData {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Externally visible outcome of an orchestration, derived once from
/// [`WorkflowData`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowResult {
    pub success: bool,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub activity_history: Vec<WorkflowActivityInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowResult {
    pub fn from_workflow_data(workflow_data: &WorkflowData) -> Self {
        Self {
            success: workflow_data.success,
            data: workflow_data.data.clone(),
            activity_history: workflow_data.activity_history.clone(),
            error: workflow_data.error.clone(),
        }
    }

    /// Wire form; falls back to `{success, error}` if serialization fails
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|e| self.fallback(&e))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| self.fallback(&e).to_string())
    }

    fn fallback(&self, err: &serde_json::Error) -> Value {
        json!({
            "success": self.success,
            "error": err.to_string(),
        })
    }
}

impl From<&WorkflowData> for WorkflowResult {
    fn from(workflow_data: &WorkflowData) -> Self {
        Self::from_workflow_data(workflow_data)
    }
}
