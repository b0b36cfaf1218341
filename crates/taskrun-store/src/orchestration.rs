//! State orchestration port.
//!
//! The orchestrator owns transition rules. The store only asks it to
//! establish a task run's first state and reports whatever it answers.

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use taskrun_core::{State, StateId, StateRecord, TaskRunId};

use crate::error::OrchestrationError;
use crate::session::Session;

/// Outcome status of a requested transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetStateStatus {
    /// Transition committed.
    Accept,
    /// Transition refused; the run keeps its previous state.
    Reject,
    /// Transition refused and the run should not proceed.
    Abort,
    /// Transition deferred; the caller may ask again later.
    Wait,
}

/// Result of a call to [`StateOrchestrator::orchestrate`].
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestrationResult {
    pub status: SetStateStatus,

    /// State the run is in after orchestration. On accept this is the
    /// committed state, which may differ from the one requested.
    pub state: Option<State>,

    /// Free-form explanation from the engine.
    pub details: Option<String>,
}

impl OrchestrationResult {
    pub fn accept(state: State) -> Self {
        Self {
            status: SetStateStatus::Accept,
            state: Some(state),
            details: None,
        }
    }

    pub fn reject(details: impl Into<String>) -> Self {
        Self {
            status: SetStateStatus::Reject,
            state: None,
            details: Some(details.into()),
        }
    }

    pub fn abort(details: impl Into<String>) -> Self {
        Self {
            status: SetStateStatus::Abort,
            state: None,
            details: Some(details.into()),
        }
    }

    pub fn wait(details: impl Into<String>) -> Self {
        Self {
            status: SetStateStatus::Wait,
            state: None,
            details: Some(details.into()),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.status == SetStateStatus::Accept
    }
}

/// State-orchestration engine.
#[async_trait]
pub trait StateOrchestrator: Send + Sync {
    /// Request a transition of `task_run_id` into `requested`.
    ///
    /// Runs inside the caller's session; the task run has already been
    /// flushed and is addressable by `task_run_id`.
    async fn orchestrate(
        &self,
        session: &mut dyn Session,
        task_run_id: &TaskRunId,
        requested: State,
    ) -> Result<OrchestrationResult, OrchestrationError>;
}

/// Orchestrator that accepts every requested state.
///
/// Each accepted state gets a fresh id and timestamp, is appended to the
/// run's history and becomes its current state.
#[derive(Debug, Clone, Default)]
pub struct AcceptingOrchestrator;

impl AcceptingOrchestrator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StateOrchestrator for AcceptingOrchestrator {
    async fn orchestrate(
        &self,
        session: &mut dyn Session,
        task_run_id: &TaskRunId,
        requested: State,
    ) -> Result<OrchestrationResult, OrchestrationError> {
        if session.get(task_run_id).await?.is_none() {
            return Err(OrchestrationError::TaskRunNotFound(task_run_id.clone()));
        }

        let state = State {
            id: StateId::generate(),
            timestamp: Utc::now(),
            ..requested
        };

        session
            .append_state(StateRecord::new(task_run_id.clone(), state.clone()))
            .await?;
        session.set_state(task_run_id, state.clone()).await?;

        debug!(
            task_run_id = %task_run_id,
            state = %state.state_type,
            "State accepted"
        );

        Ok(OrchestrationResult::accept(state))
    }
}
