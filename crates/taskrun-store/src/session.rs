//! Storage session port.
//!
//! A session is the caller's unit of work. The store only borrows it for the
//! duration of a call: it never opens, commits or closes one.

use async_trait::async_trait;

use taskrun_core::{FlowRunId, State, StateRecord, TaskRun, TaskRunId};

use crate::error::SessionError;

/// Row predicate over the task run table. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskRunFilter {
    pub id: Option<TaskRunId>,
    pub flow_run_id: Option<FlowRunId>,
}

impl TaskRunFilter {
    /// Match a single task run by primary key.
    pub fn by_id(id: TaskRunId) -> Self {
        Self {
            id: Some(id),
            flow_run_id: None,
        }
    }

    /// Match every task run of a flow run.
    pub fn by_flow_run(flow_run_id: FlowRunId) -> Self {
        Self {
            id: None,
            flow_run_id: Some(flow_run_id),
        }
    }

    /// Evaluate the predicate against a row.
    pub fn matches(&self, task_run: &TaskRun) -> bool {
        self.id.as_ref().map_or(true, |id| *id == task_run.id)
            && self
                .flow_run_id
                .as_ref()
                .map_or(true, |f| *f == task_run.flow_run_id)
    }
}

/// Filtered select, ordered by task run id ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskRunQuery {
    pub filter: TaskRunFilter,

    /// Rows to skip after ordering.
    pub offset: usize,

    /// Maximum number of rows to return. `None` means unbounded.
    pub limit: Option<usize>,
}

impl TaskRunQuery {
    pub fn new(filter: TaskRunFilter) -> Self {
        Self {
            filter,
            offset: 0,
            limit: None,
        }
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Unit of work over task run storage.
///
/// Implementations must make every flushed row visible to later reads on the
/// same session. Rows staged with [`Session::add`] but not yet flushed need
/// not be visible.
#[async_trait]
pub trait Session: Send {
    /// Stage a new task run for insertion.
    fn add(&mut self, task_run: TaskRun);

    /// Write staged rows, enforcing primary key and other constraints.
    ///
    /// A failed flush discards the staged batch.
    async fn flush(&mut self) -> Result<(), SessionError>;

    /// Point lookup by primary key.
    async fn get(&mut self, id: &TaskRunId) -> Result<Option<TaskRun>, SessionError>;

    /// Filtered select, ordered by id ascending.
    async fn select(&mut self, query: &TaskRunQuery) -> Result<Vec<TaskRun>, SessionError>;

    /// Number of rows matching a filter.
    async fn count(&mut self, filter: &TaskRunFilter) -> Result<usize, SessionError>;

    /// Delete rows matching a filter, returning the affected row count.
    async fn delete(&mut self, filter: &TaskRunFilter) -> Result<u64, SessionError>;

    /// Replace the current state of a task run. Returns false if the run
    /// does not exist.
    async fn set_state(&mut self, id: &TaskRunId, state: State) -> Result<bool, SessionError>;

    /// Append a row to a task run's state history.
    async fn append_state(&mut self, record: StateRecord) -> Result<(), SessionError>;

    /// State history of a task run, oldest first.
    async fn state_history(&mut self, id: &TaskRunId) -> Result<Vec<StateRecord>, SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskrun_core::TaskRunDescriptor;

    #[test]
    fn test_filter_matches() {
        let task_run =
            TaskRun::from_descriptor(TaskRunDescriptor::new("flow-1").with_id("run-1"));

        assert!(TaskRunFilter::default().matches(&task_run));
        assert!(TaskRunFilter::by_id(TaskRunId::new("run-1")).matches(&task_run));
        assert!(!TaskRunFilter::by_id(TaskRunId::new("run-2")).matches(&task_run));
        assert!(TaskRunFilter::by_flow_run(FlowRunId::new("flow-1")).matches(&task_run));
        assert!(!TaskRunFilter::by_flow_run(FlowRunId::new("flow-2")).matches(&task_run));
    }
}
