use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strata_config::Scope;
use strata_literal::LiteralMap;

/// State of one node within an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum NodeState {
  Pending,
  Ready,
  Running,
  Succeeded,
  /// Outputs were served from the cache. Equivalent to `Succeeded` for
  /// downstream nodes.
  Cached,
  Failed,
  Skipped,
  Aborted,
}

impl NodeState {
  pub fn is_terminal(self) -> bool {
    matches!(
      self,
      NodeState::Succeeded
        | NodeState::Cached
        | NodeState::Failed
        | NodeState::Skipped
        | NodeState::Aborted
    )
  }

  /// Whether downstream nodes may consume this node's outputs.
  pub fn is_success(self) -> bool {
    matches!(self, NodeState::Succeeded | NodeState::Cached)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      NodeState::Pending => "PENDING",
      NodeState::Ready => "READY",
      NodeState::Running => "RUNNING",
      NodeState::Succeeded => "SUCCEEDED",
      NodeState::Cached => "CACHED",
      NodeState::Failed => "FAILED",
      NodeState::Skipped => "SKIPPED",
      NodeState::Aborted => "ABORTED",
    }
  }
}

impl fmt::Display for NodeState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// State of an execution as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ExecutionState {
  Running,
  Succeeded,
  Failed,
  Aborted,
}

impl ExecutionState {
  pub fn is_terminal(self) -> bool {
    !matches!(self, ExecutionState::Running)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      ExecutionState::Running => "RUNNING",
      ExecutionState::Succeeded => "SUCCEEDED",
      ExecutionState::Failed => "FAILED",
      ExecutionState::Aborted => "ABORTED",
    }
  }
}

impl fmt::Display for ExecutionState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Why a node did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeErrorKind {
  /// An input or output did not match the declared interface.
  Validation,
  /// The task body failed or timed out on its final attempt.
  TaskExecution,
  /// An upstream node failed; this node never ran.
  UpstreamFailure { root_cause: String },
  /// The execution was cancelled before or while this node ran.
  Cancelled,
  /// The cache key could not be derived.
  CacheKey,
}

/// Error recorded on a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeError {
  #[serde(flatten)]
  pub kind: NodeErrorKind,
  pub message: String,
}

impl NodeError {
  pub fn new(kind: NodeErrorKind, message: impl Into<String>) -> Self {
    Self {
      kind,
      message: message.into(),
    }
  }
}

impl fmt::Display for NodeError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.message)
  }
}

/// Summary of a failed execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionFailure {
  /// The first node whose own failure caused the execution to fail.
  pub root_cause_node: String,
  pub message: String,
  /// Nodes skipped because an upstream node failed.
  pub skipped_nodes: Vec<String>,
}

/// Record of one node within an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeExecutionRecord {
  pub execution_id: String,
  pub node_id: String,
  pub task_name: String,
  pub state: NodeState,
  /// Number of body invocations so far. Zero for cached and skipped nodes.
  pub attempts: u32,
  #[serde(default)]
  pub inputs: LiteralMap,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub outputs: Option<LiteralMap>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<NodeError>,
  /// Encoded cache key, when caching was enabled.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cache_key: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub started_at: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub completed_at: Option<DateTime<Utc>>,
}

impl NodeExecutionRecord {
  pub fn pending(
    execution_id: impl Into<String>,
    node_id: impl Into<String>,
    task_name: impl Into<String>,
  ) -> Self {
    Self {
      execution_id: execution_id.into(),
      node_id: node_id.into(),
      task_name: task_name.into(),
      state: NodeState::Pending,
      attempts: 0,
      inputs: LiteralMap::new(),
      outputs: None,
      error: None,
      cache_key: None,
      started_at: None,
      completed_at: None,
    }
  }
}

/// Record of one workflow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
  pub execution_id: String,
  pub workflow_name: String,
  pub workflow_version: String,
  pub scope: Scope,
  pub state: ExecutionState,
  pub inputs: LiteralMap,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub outputs: Option<LiteralMap>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub failure: Option<ExecutionFailure>,
  /// Node records by node id.
  #[serde(default)]
  pub nodes: BTreeMap<String, NodeExecutionRecord>,
  pub started_at: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub completed_at: Option<DateTime<Utc>>,
}

impl ExecutionRecord {
  pub fn is_terminal(&self) -> bool {
    self.state.is_terminal()
  }

  pub fn node(&self, node_id: &str) -> Option<&NodeExecutionRecord> {
    self.nodes.get(node_id)
  }

  /// Node ids currently in `state`.
  pub fn nodes_in(&self, state: NodeState) -> Vec<&str> {
    self
      .nodes
      .values()
      .filter(|n| n.state == state)
      .map(|n| n.node_id.as_str())
      .collect()
  }
}
