//! Strata Store
//!
//! This crate provides the storage trait and implementations for execution
//! records. Every execution owns one record per node; records are written by
//! the engine as nodes change state and become immutable once the execution
//! reaches a terminal state.
//!
//! The [`ExecutionStore`] trait defines operations for:
//! - Creating and updating execution records
//! - Writing node records
//! - Querying execution history
//!
//! [`ExecutionClient`] is the read-only introspection API over a store.

mod client;
mod memory;
mod sqlite;
mod types;

pub use client::ExecutionClient;
pub use memory::InMemoryExecutionStore;
pub use sqlite::SqliteExecutionStore;
pub use types::{
  ExecutionFailure, ExecutionRecord, ExecutionState, NodeError, NodeErrorKind,
  NodeExecutionRecord, NodeState,
};

use async_trait::async_trait;
use strata_config::Scope;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  /// The requested record was not found.
  #[error("not found: {0}")]
  NotFound(String),

  /// The execution already exists.
  #[error("execution already exists: {0}")]
  AlreadyExists(String),

  /// The execution is terminal and can no longer change.
  #[error("execution '{0}' is terminal and cannot be modified")]
  Terminal(String),

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  /// A stored value could not be encoded or decoded.
  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

/// Storage trait for execution records.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
  /// Create a new execution, including its initial node records.
  async fn create_execution(&self, execution: &ExecutionRecord) -> Result<(), StoreError>;

  /// Update execution-level fields (state, outputs, failure, completion time).
  ///
  /// Node records are written with [`ExecutionStore::put_node`].
  async fn update_execution(&self, execution: &ExecutionRecord) -> Result<(), StoreError>;

  /// Create or replace a node record.
  async fn put_node(&self, node: &NodeExecutionRecord) -> Result<(), StoreError>;

  /// Get an execution by ID, with all of its node records.
  async fn get_execution(&self, execution_id: &str) -> Result<ExecutionRecord, StoreError>;

  /// Get one node record.
  async fn get_node(
    &self,
    execution_id: &str,
    node_id: &str,
  ) -> Result<NodeExecutionRecord, StoreError>;

  /// List node records for an execution.
  async fn list_nodes(&self, execution_id: &str) -> Result<Vec<NodeExecutionRecord>, StoreError>;

  /// List executions, newest first, optionally restricted to one scope.
  ///
  /// Node records are not loaded; `nodes` is empty on every result.
  async fn list_executions(&self, scope: Option<&Scope>)
  -> Result<Vec<ExecutionRecord>, StoreError>;
}
