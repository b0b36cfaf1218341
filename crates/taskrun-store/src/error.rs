//! Error taxonomy for the store and its collaborators.

use thiserror::Error;

use taskrun_core::{CoreError, TaskRun, TaskRunId};

use crate::orchestration::SetStateStatus;

/// Errors raised by a storage session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Insert rejected because the primary key is already taken.
    #[error("Duplicate task run identity: {0}")]
    DuplicateIdentity(TaskRunId),

    /// Insert rejected by any other constraint (required field, foreign key).
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Backend failure unrelated to constraints.
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Errors raised by a state orchestrator.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// The task run is not addressable in the session.
    #[error("Task run not found: {0}")]
    TaskRunNotFound(TaskRunId),

    /// Storage failed while the orchestrator was writing state.
    #[error(transparent)]
    Storage(#[from] SessionError),

    /// Engine-internal failure.
    #[error("Orchestration engine error: {0}")]
    Engine(String),
}

/// Why an initial state was not established.
#[derive(Debug, Error)]
pub enum RejectionCause {
    /// The orchestrator call itself failed.
    #[error(transparent)]
    Engine(#[from] OrchestrationError),

    /// The orchestrator answered, but did not accept the state.
    #[error("orchestrator returned {status:?}{}", suffix(.details))]
    Status {
        status: SetStateStatus,
        details: Option<String>,
    },
}

fn suffix(details: &Option<String>) -> String {
    details
        .as_deref()
        .map(|d| format!(": {d}"))
        .unwrap_or_default()
}

fn run_id(task_run: &TaskRun) -> &TaskRunId {
    &task_run.id
}

/// Errors returned by [`TaskRunStore`](crate::TaskRunStore) operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Storage failure, propagated unmodified.
    #[error(transparent)]
    Storage(#[from] SessionError),

    /// The base record was persisted, but its initial state was not
    /// accepted. `task_run` is the record as it exists in the session.
    #[error("Initial state for task run {} was rejected: {cause}", run_id(.task_run))]
    OrchestrationRejected {
        task_run: Box<TaskRun>,
        #[source]
        cause: RejectionCause,
    },

    /// The descriptor was refused before anything was written.
    #[error("Invalid task run descriptor: {0}")]
    InvalidDescriptor(#[from] CoreError),
}

impl StoreError {
    /// The persisted task run left behind by a partial create, if any.
    pub fn task_run(&self) -> Option<&TaskRun> {
        match self {
            Self::OrchestrationRejected { task_run, .. } => Some(task_run),
            Self::Storage(_) | Self::InvalidDescriptor(_) => None,
        }
    }

    /// Returns true for a primary-key collision on insert.
    pub fn is_duplicate_identity(&self) -> bool {
        matches!(self, Self::Storage(SessionError::DuplicateIdentity(_)))
    }

    /// Returns true for any storage constraint rejection, including
    /// duplicate identity.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Self::Storage(SessionError::DuplicateIdentity(_))
                | Self::Storage(SessionError::ConstraintViolation(_))
        )
    }
}
