//! In-memory database and session.
//!
//! The database holds committed tables behind a lock. A session starts from a
//! snapshot of those tables, applies its own flushed writes to a private copy
//! and records them in a write log. `commit` replays the log against the
//! current committed tables; `rollback` (or dropping the session) discards it.
//!
//! Isolation is snapshot-based: a session does not see writes committed after
//! it began, and concurrent state updates to the same run resolve as
//! last-committer-wins. Inserts are re-checked for primary key collisions at
//! commit time.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use taskrun_core::{FlowRunId, State, StateRecord, TaskRun, TaskRunId};

use crate::config::MemoryDbConfig;
use crate::error::SessionError;
use crate::session::{Session, TaskRunFilter, TaskRunQuery};

#[derive(Debug, Clone, Default)]
struct Tables {
    /// Task runs keyed (and therefore ordered) by id.
    task_runs: BTreeMap<TaskRunId, TaskRun>,

    /// State history rows, in insertion order.
    states: Vec<StateRecord>,

    /// Flow runs known to the foreign key check.
    flow_runs: HashSet<FlowRunId>,
}

impl Tables {
    fn check_insert(&self, task_run: &TaskRun, config: &MemoryDbConfig) -> Result<(), SessionError> {
        if task_run.flow_run_id.is_empty() {
            return Err(SessionError::ConstraintViolation(
                "task_run.flow_run_id must not be empty".to_string(),
            ));
        }
        if config.enforce_flow_run_fk && !self.flow_runs.contains(&task_run.flow_run_id) {
            return Err(SessionError::ConstraintViolation(format!(
                "task_run.flow_run_id references unknown flow run {}",
                task_run.flow_run_id
            )));
        }
        if self.task_runs.contains_key(&task_run.id) {
            return Err(SessionError::DuplicateIdentity(task_run.id.clone()));
        }
        Ok(())
    }

    fn set_state(&mut self, id: &TaskRunId, state: State) -> bool {
        match self.task_runs.get_mut(id) {
            Some(task_run) => {
                task_run.state = Some(state);
                true
            }
            None => false,
        }
    }

    fn append_state(&mut self, record: StateRecord) -> bool {
        if !self.task_runs.contains_key(&record.task_run_id) {
            return false;
        }
        self.states.push(record);
        true
    }

    /// Delete matching task runs and cascade to their state history.
    fn delete(&mut self, filter: &TaskRunFilter) -> u64 {
        let doomed: Vec<TaskRunId> = self
            .task_runs
            .values()
            .filter(|t| filter.matches(t))
            .map(|t| t.id.clone())
            .collect();

        for id in &doomed {
            self.task_runs.remove(id);
        }
        if !doomed.is_empty() {
            self.states.retain(|s| !doomed.contains(&s.task_run_id));
        }
        doomed.len() as u64
    }
}

/// A write applied to the session's private tables, replayed on commit.
#[derive(Debug, Clone)]
enum WriteOp {
    Insert(TaskRun),
    SetState(TaskRunId, State),
    AppendState(StateRecord),
    Delete(TaskRunFilter),
}

/// Shared in-memory database.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    tables: Arc<RwLock<Tables>>,
    config: MemoryDbConfig,
}

impl MemoryDatabase {
    /// Create an empty database with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty database with the given configuration.
    pub fn with_config(config: MemoryDbConfig) -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            config,
        }
    }

    /// Make a flow run known to the foreign key check. Affects sessions
    /// begun afterwards.
    pub async fn register_flow_run(&self, flow_run_id: FlowRunId) {
        self.tables.write().await.flow_runs.insert(flow_run_id);
    }

    /// Begin a new session on a snapshot of the committed tables.
    pub async fn begin(&self) -> MemorySession {
        let snapshot = self.tables.read().await.clone();
        MemorySession {
            shared: Arc::clone(&self.tables),
            config: self.config.clone(),
            working: snapshot,
            pending: Vec::new(),
            log: Vec::new(),
        }
    }

    /// Number of committed task runs.
    pub async fn task_run_count(&self) -> usize {
        self.tables.read().await.task_runs.len()
    }

    /// Committed task run by id, outside of any session.
    pub async fn committed_task_run(&self, id: &TaskRunId) -> Option<TaskRun> {
        self.tables.read().await.task_runs.get(id).cloned()
    }

    /// Number of committed state history rows for a task run.
    pub async fn committed_state_count(&self, id: &TaskRunId) -> usize {
        self.tables
            .read()
            .await
            .states
            .iter()
            .filter(|s| s.task_run_id == *id)
            .count()
    }
}

/// Session over a [`MemoryDatabase`].
#[derive(Debug)]
pub struct MemorySession {
    shared: Arc<RwLock<Tables>>,
    config: MemoryDbConfig,
    working: Tables,
    pending: Vec<TaskRun>,
    log: Vec<WriteOp>,
}

impl MemorySession {
    /// Number of rows staged but not yet flushed.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Flush, then apply every write of this session to the database.
    ///
    /// Either all writes land or none do.
    pub async fn commit(mut self) -> Result<(), SessionError> {
        self.flush().await?;

        let mut shared = self.shared.write().await;
        let mut next = shared.clone();
        for op in self.log.drain(..) {
            match op {
                WriteOp::Insert(task_run) => {
                    next.check_insert(&task_run, &self.config)?;
                    next.task_runs.insert(task_run.id.clone(), task_run);
                }
                WriteOp::SetState(id, state) => {
                    next.set_state(&id, state);
                }
                WriteOp::AppendState(record) => {
                    next.append_state(record);
                }
                WriteOp::Delete(filter) => {
                    next.delete(&filter);
                }
            }
        }
        *shared = next;

        debug!(task_runs = shared.task_runs.len(), "Session committed");
        Ok(())
    }

    /// Discard every write of this session.
    pub fn rollback(self) {
        debug!(
            writes = self.log.len(),
            pending = self.pending.len(),
            "Session rolled back"
        );
    }
}

#[async_trait]
impl Session for MemorySession {
    fn add(&mut self, task_run: TaskRun) {
        self.pending.push(task_run);
    }

    async fn flush(&mut self) -> Result<(), SessionError> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let batch = std::mem::take(&mut self.pending);
        let mut staged = self.working.clone();
        for task_run in &batch {
            staged.check_insert(task_run, &self.config)?;
            staged.task_runs.insert(task_run.id.clone(), task_run.clone());
        }

        self.working = staged;
        self.log.extend(batch.into_iter().map(WriteOp::Insert));
        Ok(())
    }

    async fn get(&mut self, id: &TaskRunId) -> Result<Option<TaskRun>, SessionError> {
        Ok(self.working.task_runs.get(id).cloned())
    }

    async fn select(&mut self, query: &TaskRunQuery) -> Result<Vec<TaskRun>, SessionError> {
        let rows = self
            .working
            .task_runs
            .values()
            .filter(|t| query.filter.matches(t))
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(rows)
    }

    async fn count(&mut self, filter: &TaskRunFilter) -> Result<usize, SessionError> {
        Ok(self
            .working
            .task_runs
            .values()
            .filter(|t| filter.matches(t))
            .count())
    }

    async fn delete(&mut self, filter: &TaskRunFilter) -> Result<u64, SessionError> {
        let removed = self.working.delete(filter);
        if removed > 0 {
            self.log.push(WriteOp::Delete(filter.clone()));
        }
        Ok(removed)
    }

    async fn set_state(&mut self, id: &TaskRunId, state: State) -> Result<bool, SessionError> {
        let updated = self.working.set_state(id, state.clone());
        if updated {
            self.log.push(WriteOp::SetState(id.clone(), state));
        }
        Ok(updated)
    }

    async fn append_state(&mut self, record: StateRecord) -> Result<(), SessionError> {
        if !self.working.append_state(record.clone()) {
            return Err(SessionError::ConstraintViolation(format!(
                "task_run_state.task_run_id references unknown task run {}",
                record.task_run_id
            )));
        }
        self.log.push(WriteOp::AppendState(record));
        Ok(())
    }

    async fn state_history(&mut self, id: &TaskRunId) -> Result<Vec<StateRecord>, SessionError> {
        Ok(self
            .working
            .states
            .iter()
            .filter(|s| s.task_run_id == *id)
            .cloned()
            .collect())
    }
}
