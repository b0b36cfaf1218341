//! TaskRun Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Storage engines or sessions
//! - State orchestration
//! - Runtime specifics
//!
//! All types here describe task runs, their owning flow runs and their
//! execution states.

pub mod error;
pub mod ids;
pub mod state;
pub mod task_run;

// Re-export commonly used types
pub use error::CoreError;
pub use ids::{FlowRunId, StateId, TaskRunId};
pub use state::{State, StateType};
pub use task_run::{StateRecord, TaskRun, TaskRunDescriptor, RESERVED_ATTRIBUTE_KEYS};
