//! Strata Task
//!
//! Immutable task definitions. A [`Task`] declares a name, an ordered typed
//! interface, a cache policy, resource hints, and an opaque body. Tasks are
//! assembled with [`Task::builder`] instead of being registered at runtime, so
//! a definition is plain data that can be shared freely between workflows.
//!
//! The body is invoked through the [`TaskBody`] trait with an explicit
//! [`ExecutionContext`] scoped to one node attempt.

mod body;
mod context;
mod error;
mod task;

pub use body::{FnBody, TaskBody, task_fn};
pub use context::ExecutionContext;
pub use error::{DefinitionError, TaskError};
pub use task::{CachePolicy, ResourceSpec, Resources, Task, TaskBuilder, TaskInterface, Variable};
