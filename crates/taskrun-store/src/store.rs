//! Task run store.
//!
//! Creating a task run with an initial state is a two-step write: the base
//! record is inserted and flushed, then the orchestrator is asked to
//! establish the state. The two steps are not atomic. If orchestration fails
//! the record stays persisted and the failure carries it back to the caller,
//! who decides whether to keep it, call [`TaskRunStore::compensate`], or roll
//! back the enclosing session.
//!
//! Rolling back the session after an orchestrator that keeps its own books
//! has accepted a transition leaves that orchestrator with a transition for a
//! task run that no longer exists. The store cannot close that gap.

use std::sync::Arc;

use tracing::{debug, info, warn};

use taskrun_core::{FlowRunId, TaskRun, TaskRunDescriptor, TaskRunId};

use crate::config::StoreConfig;
use crate::error::{RejectionCause, StoreError};
use crate::orchestration::StateOrchestrator;
use crate::session::{Session, TaskRunFilter, TaskRunQuery};

/// Offset/limit window over a flow run's task runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    /// Falls back to [`StoreConfig::default_page_size`] when unset.
    pub limit: Option<usize>,
}

impl Page {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: Some(limit),
        }
    }
}

/// Create, read, list and delete task runs within a caller's session.
///
/// The store holds no per-call state and never commits; it is safe to share
/// across tasks.
pub struct TaskRunStore {
    orchestrator: Arc<dyn StateOrchestrator>,
    config: StoreConfig,
}

impl TaskRunStore {
    /// Create a new TaskRunStore with default configuration.
    pub fn new(orchestrator: Arc<dyn StateOrchestrator>) -> Self {
        Self::with_config(orchestrator, StoreConfig::default())
    }

    /// Create a new TaskRunStore with the given configuration.
    pub fn with_config(orchestrator: Arc<dyn StateOrchestrator>, config: StoreConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    /// Persist a new task run and, if the descriptor carries one, request its
    /// initial state.
    ///
    /// The record is flushed before the orchestrator is called so the
    /// orchestrator can address it by id. On acceptance the returned record
    /// carries the state the orchestrator committed, which may differ from
    /// the one requested.
    ///
    /// Only `Accept` counts as success. `Reject`, `Abort` and a deferred
    /// (`Wait`) initial state all come back as
    /// [`StoreError::OrchestrationRejected`], with the stateless record
    /// already persisted.
    ///
    /// Descriptors whose attributes shadow a task run field are refused with
    /// [`StoreError::InvalidDescriptor`] before anything is written.
    pub async fn create(
        &self,
        session: &mut dyn Session,
        mut descriptor: TaskRunDescriptor,
    ) -> Result<TaskRun, StoreError> {
        descriptor.validate()?;
        let requested = descriptor.state.take();
        let mut task_run = TaskRun::from_descriptor(descriptor);

        session.add(task_run.clone());
        session.flush().await?;

        info!(
            task_run_id = %task_run.id,
            flow_run_id = %task_run.flow_run_id,
            "Task run created"
        );

        let Some(requested) = requested else {
            return Ok(task_run);
        };
        let requested_type = requested.state_type;

        let result = match self
            .orchestrator
            .orchestrate(session, &task_run.id, requested)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    task_run_id = %task_run.id,
                    requested = %requested_type,
                    error = %e,
                    "Orchestration failed, task run left without a state"
                );
                return Err(StoreError::OrchestrationRejected {
                    task_run: Box::new(task_run),
                    cause: RejectionCause::Engine(e),
                });
            }
        };

        if !result.is_accepted() {
            warn!(
                task_run_id = %task_run.id,
                requested = %requested_type,
                status = ?result.status,
                details = ?result.details,
                "Initial state not accepted"
            );
            return Err(StoreError::OrchestrationRejected {
                task_run: Box::new(task_run),
                cause: RejectionCause::Status {
                    status: result.status,
                    details: result.details,
                },
            });
        }

        task_run.state = match result.state {
            Some(state) => Some(state),
            None => session
                .get(&task_run.id)
                .await?
                .and_then(|stored| stored.state),
        };

        info!(
            task_run_id = %task_run.id,
            requested = %requested_type,
            state = ?task_run.state.as_ref().map(|s| s.state_type),
            "Initial state established"
        );

        Ok(task_run)
    }

    /// Read a task run by id. Returns `None` if it does not exist.
    pub async fn read(
        &self,
        session: &mut dyn Session,
        task_run_id: &TaskRunId,
    ) -> Result<Option<TaskRun>, StoreError> {
        let task_run = session.get(task_run_id).await?;
        debug!(task_run_id = %task_run_id, found = task_run.is_some(), "Read task run");
        Ok(task_run)
    }

    /// All task runs of a flow run, ordered by id ascending.
    pub async fn list(
        &self,
        session: &mut dyn Session,
        flow_run_id: &FlowRunId,
    ) -> Result<Vec<TaskRun>, StoreError> {
        let query = TaskRunQuery::new(TaskRunFilter::by_flow_run(flow_run_id.clone()));
        let task_runs = unique_by_id(session.select(&query).await?);
        debug!(flow_run_id = %flow_run_id, count = task_runs.len(), "Listed task runs");
        Ok(task_runs)
    }

    /// One page of a flow run's task runs, in the same order as [`list`].
    ///
    /// [`list`]: TaskRunStore::list
    pub async fn list_page(
        &self,
        session: &mut dyn Session,
        flow_run_id: &FlowRunId,
        page: Page,
    ) -> Result<Vec<TaskRun>, StoreError> {
        let limit = page
            .limit
            .unwrap_or(self.config.default_page_size)
            .min(self.config.max_page_size);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let query = TaskRunQuery::new(TaskRunFilter::by_flow_run(flow_run_id.clone()))
            .with_offset(page.offset)
            .with_limit(limit);
        let task_runs = unique_by_id(session.select(&query).await?);
        debug!(
            flow_run_id = %flow_run_id,
            offset = page.offset,
            limit,
            count = task_runs.len(),
            "Listed task run page"
        );
        Ok(task_runs)
    }

    /// Number of task runs in a flow run.
    pub async fn count(
        &self,
        session: &mut dyn Session,
        flow_run_id: &FlowRunId,
    ) -> Result<usize, StoreError> {
        let filter = TaskRunFilter::by_flow_run(flow_run_id.clone());
        Ok(session.count(&filter).await?)
    }

    /// Delete a task run by id. Returns whether a row was removed.
    ///
    /// State history is left to the storage schema's cascade rules.
    pub async fn delete(
        &self,
        session: &mut dyn Session,
        task_run_id: &TaskRunId,
    ) -> Result<bool, StoreError> {
        let removed = session
            .delete(&TaskRunFilter::by_id(task_run_id.clone()))
            .await?;
        let deleted = removed > 0;
        info!(task_run_id = %task_run_id, deleted, "Delete task run");
        Ok(deleted)
    }

    /// Delete the task run left behind by a failed [`create`].
    ///
    /// Only acts on [`StoreError::OrchestrationRejected`]; any other error
    /// returns `false` without touching storage.
    ///
    /// [`create`]: TaskRunStore::create
    pub async fn compensate(
        &self,
        session: &mut dyn Session,
        error: &StoreError,
    ) -> Result<bool, StoreError> {
        let Some(task_run) = error.task_run() else {
            return Ok(false);
        };
        warn!(task_run_id = %task_run.id, "Compensating partial task run create");
        self.delete(session, &task_run.id).await
    }
}

/// Sort by id and drop repeated rows, for sessions whose queries fan out.
fn unique_by_id(mut task_runs: Vec<TaskRun>) -> Vec<TaskRun> {
    task_runs.sort_by(|a, b| a.id.cmp(&b.id));
    task_runs.dedup_by(|a, b| a.id == b.id);
    task_runs
}
