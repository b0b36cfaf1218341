//! TaskRun Store
//!
//! Durable lifecycle of task runs: create (with an optional initial state
//! handed to a state orchestrator), read, list by flow run, and delete.
//!
//! The store works through two ports supplied by the caller:
//! - [`Session`]: the caller's unit of work over storage
//! - [`StateOrchestrator`]: the engine that decides and commits transitions
//!
//! [`MemoryDatabase`] and [`AcceptingOrchestrator`] are in-memory
//! implementations of both ports.

pub mod config;
pub mod error;
pub mod memory;
pub mod orchestration;
pub mod session;
pub mod store;

pub use config::{MemoryDbConfig, StoreConfig};
pub use error::{OrchestrationError, RejectionCause, SessionError, StoreError};
pub use memory::{MemoryDatabase, MemorySession};
pub use orchestration::{
    AcceptingOrchestrator, OrchestrationResult, SetStateStatus, StateOrchestrator,
};
pub use session::{Session, TaskRunFilter, TaskRunQuery};
pub use store::{Page, TaskRunStore};
