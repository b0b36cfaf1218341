//! Execution states of a task run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::StateId;

/// Kind of execution state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StateType {
    /// Run is scheduled to start at some point.
    #[default]
    Scheduled,
    /// Run is ready but has not started.
    Pending,
    /// Run is executing.
    Running,
    /// Run finished successfully.
    Completed,
    /// Run finished with an error.
    Failed,
    /// Run was cancelled.
    Cancelled,
}

impl StateType {
    /// Returns true if no further transitions are expected.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Default display name for a state of this type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Scheduled => "Scheduled",
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for StateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A single execution state, as requested by a caller or committed by an
/// orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// Identifier of this state row.
    pub id: StateId,

    /// Kind of state.
    #[serde(rename = "type")]
    pub state_type: StateType,

    /// Human readable name.
    pub name: String,

    /// When the state was entered.
    pub timestamp: DateTime<Utc>,

    /// Optional message attached to the transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Engine-specific details.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub details: Map<String, Value>,
}

impl State {
    /// Create a new state of the given type, named after the type.
    pub fn new(state_type: StateType) -> Self {
        Self {
            id: StateId::generate(),
            state_type,
            name: state_type.display_name().to_string(),
            timestamp: Utc::now(),
            message: None,
            details: Map::new(),
        }
    }

    pub fn scheduled() -> Self {
        Self::new(StateType::Scheduled)
    }

    pub fn pending() -> Self {
        Self::new(StateType::Pending)
    }

    pub fn running() -> Self {
        Self::new(StateType::Running)
    }

    pub fn completed() -> Self {
        Self::new(StateType::Completed)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(StateType::Failed).with_message(message)
    }

    /// Builder method to override the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Builder method to attach a message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Builder method to add an engine detail.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Check if the state is terminal.
    pub fn is_terminal(&self) -> bool {
        self.state_type.is_terminal()
    }
}
