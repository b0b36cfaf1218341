//! Task run entity and its creation descriptor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{CoreError, FlowRunId, State, TaskRunId};

/// A TaskRun is one unit of work inside a flow run, as persisted in storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRun {
    /// Unique task run identifier. Never changes once assigned.
    pub id: TaskRunId,

    /// Flow run that owns this task run.
    pub flow_run_id: FlowRunId,

    /// Current execution state. Only an orchestrator writes this.
    pub state: Option<State>,

    /// When the record was built.
    pub created_at: DateTime<Utc>,

    /// Opaque descriptive fields (name, task key, inputs, tags, ...).
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl TaskRun {
    /// Build the base record for a descriptor.
    ///
    /// The requested state is dropped: a new record always starts without a
    /// state and only receives one through orchestration.
    pub fn from_descriptor(descriptor: TaskRunDescriptor) -> Self {
        let TaskRunDescriptor {
            id,
            flow_run_id,
            state: _,
            attributes,
        } = descriptor;

        Self {
            id: id.unwrap_or_else(TaskRunId::generate),
            flow_run_id,
            state: None,
            created_at: Utc::now(),
            attributes,
        }
    }

    /// Get an opaque attribute by key.
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Compare everything except the current state.
    pub fn same_record(&self, other: &TaskRun) -> bool {
        self.id == other.id
            && self.flow_run_id == other.flow_run_id
            && self.created_at == other.created_at
            && self.attributes == other.attributes
    }
}

/// Field names of [`TaskRun`] that share its JSON object with the opaque
/// attributes. An attribute may not use any of them.
pub const RESERVED_ATTRIBUTE_KEYS: [&str; 4] = ["id", "flow_run_id", "state", "created_at"];

fn check_attribute_key(key: &str) -> Result<(), CoreError> {
    if RESERVED_ATTRIBUTE_KEYS.contains(&key) {
        return Err(CoreError::InvalidInput(format!(
            "attribute key '{key}' is reserved for a task run field"
        )));
    }
    Ok(())
}

/// Caller-supplied description of a task run to create.
///
/// `id`, `flow_run_id` and `state` are interpreted; every other field lands in
/// `attributes` and is copied verbatim into the persisted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRunDescriptor {
    /// Explicit identifier. Generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<TaskRunId>,

    /// Owning flow run.
    pub flow_run_id: FlowRunId,

    /// Initial state to request from the orchestrator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<State>,

    /// Pass-through fields.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl TaskRunDescriptor {
    /// Create a descriptor for a task run in the given flow run.
    pub fn new(flow_run_id: impl Into<FlowRunId>) -> Self {
        Self {
            id: None,
            flow_run_id: flow_run_id.into(),
            state: None,
            attributes: Map::new(),
        }
    }

    /// Parse a descriptor from a JSON object.
    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        if !value.is_object() {
            return Err(CoreError::InvalidInput(
                "task run descriptor must be a JSON object".to_string(),
            ));
        }
        let descriptor: Self = serde_json::from_value(value)?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Check that no attribute shadows a task run field.
    pub fn validate(&self) -> Result<(), CoreError> {
        self.attributes
            .keys()
            .try_for_each(|key| check_attribute_key(key))
    }

    /// Builder method to set a specific ID.
    pub fn with_id(mut self, id: impl Into<TaskRunId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Builder method to request an initial state.
    pub fn with_state(mut self, state: State) -> Self {
        self.state = Some(state);
        self
    }

    /// Builder method to add a pass-through attribute.
    ///
    /// Fails for keys in [`RESERVED_ATTRIBUTE_KEYS`].
    pub fn with_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<Self, CoreError> {
        let key = key.into();
        check_attribute_key(&key)?;
        self.attributes.insert(key, value.into());
        Ok(self)
    }
}

/// One row of a task run's state history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    pub task_run_id: TaskRunId,
    pub state: State,
}

impl StateRecord {
    pub fn new(task_run_id: TaskRunId, state: State) -> Self {
        Self { task_run_id, state }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_descriptor_drops_state() {
        let descriptor = TaskRunDescriptor::new("flow-1")
            .with_state(State::pending())
            .with_attribute("name", "extract")
            .unwrap();

        let task_run = TaskRun::from_descriptor(descriptor);

        assert!(task_run.state.is_none());
        assert_eq!(task_run.flow_run_id.as_str(), "flow-1");
        assert_eq!(task_run.attribute("name"), Some(&json!("extract")));
    }

    #[test]
    fn test_from_descriptor_keeps_explicit_id() {
        let descriptor = TaskRunDescriptor::new("flow-1").with_id("run-a");
        let task_run = TaskRun::from_descriptor(descriptor);
        assert_eq!(task_run.id.as_str(), "run-a");
    }

    #[test]
    fn test_descriptor_from_value_collects_unknown_fields() {
        let descriptor = TaskRunDescriptor::from_value(json!({
            "flow_run_id": "flow-9",
            "task_key": "etl.extract",
            "dynamic_key": "0",
            "tags": ["nightly"],
        }))
        .unwrap();

        assert!(descriptor.id.is_none());
        assert!(descriptor.state.is_none());
        assert_eq!(descriptor.flow_run_id.as_str(), "flow-9");
        assert_eq!(descriptor.attributes.len(), 3);
        assert_eq!(descriptor.attributes["tags"], json!(["nightly"]));
    }

    #[test]
    fn test_descriptor_from_value_rejects_non_object() {
        let err = TaskRunDescriptor::from_value(json!([1, 2])).unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));

        let err = TaskRunDescriptor::from_value(json!({"name": "x"})).unwrap_err();
        assert!(matches!(err, CoreError::Serialization(_)));
    }

    #[test]
    fn test_with_attribute_rejects_reserved_keys() {
        for key in RESERVED_ATTRIBUTE_KEYS {
            let err = TaskRunDescriptor::new("flow-1")
                .with_id("run-1")
                .with_attribute(key, "shadow")
                .unwrap_err();
            assert!(matches!(err, CoreError::InvalidInput(msg) if msg.contains(key)));
        }
    }

    #[test]
    fn test_from_value_rejects_created_at_attribute() {
        let err = TaskRunDescriptor::from_value(json!({
            "flow_run_id": "flow-1",
            "created_at": "yesterday",
        }))
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[test]
    fn test_validate_catches_direct_map_writes() {
        let mut descriptor = TaskRunDescriptor::new("flow-1");
        descriptor
            .attributes
            .insert("flow_run_id".to_string(), json!("flow-other"));
        assert!(descriptor.validate().is_err());
    }

    #[test]
    fn test_task_run_serializes_and_reads_back() {
        let descriptor = TaskRunDescriptor::new("flow-1")
            .with_id("run-1")
            .with_attribute("name", "extract")
            .unwrap()
            .with_attribute("tags", json!(["nightly"]))
            .unwrap();
        let mut task_run = TaskRun::from_descriptor(descriptor);
        task_run.state = Some(State::running());

        let encoded = serde_json::to_string(&task_run).unwrap();
        let decoded: TaskRun = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded, task_run);
        assert_eq!(decoded.id.as_str(), "run-1");
        assert_eq!(decoded.flow_run_id.as_str(), "flow-1");
        assert_eq!(decoded.attributes.len(), 2);
    }

    #[test]
    fn test_same_record_ignores_state() {
        let task_run = TaskRun::from_descriptor(TaskRunDescriptor::new("flow-1"));
        let mut with_state = task_run.clone();
        with_state.state = Some(State::running());

        assert!(task_run.same_record(&with_state));
        assert_ne!(task_run, with_state);
    }
}
