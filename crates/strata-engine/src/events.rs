//! Progress events published while an execution runs.

use serde::{Deserialize, Serialize};
use strata_store::ExecutionState;
use tokio::sync::mpsc;

/// One state transition observed by the scheduler or a node run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionEvent {
  /// The execution record was created and scheduling has begun.
  ExecutionStarted {
    execution_id: String,
    workflow_name: String,
  },

  /// All of a node's dependencies completed successfully.
  NodeReady {
    execution_id: String,
    node_id: String,
  },

  /// A node attempt started.
  NodeRunning {
    execution_id: String,
    node_id: String,
    attempt: u32,
  },

  /// A node's outputs were served from the cache.
  NodeCached {
    execution_id: String,
    node_id: String,
    cache_key: String,
  },

  /// A node completed successfully.
  NodeSucceeded {
    execution_id: String,
    node_id: String,
  },

  /// A node attempt failed. `will_retry` is false for the final failure.
  NodeFailed {
    execution_id: String,
    node_id: String,
    error: String,
    will_retry: bool,
  },

  /// A node will never run.
  NodeSkipped {
    execution_id: String,
    node_id: String,
    reason: String,
  },

  /// A running node was interrupted by cancellation.
  NodeAborted {
    execution_id: String,
    node_id: String,
  },

  /// The execution reached a terminal state.
  ExecutionFinished {
    execution_id: String,
    state: ExecutionState,
  },
}

/// Sink for [`ExecutionEvent`]s.
///
/// `notify` is called inline from the scheduler and node tasks, so it must not
/// block.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// Drops every event.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// Forwards events into an mpsc channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // receiver gone
    let _ = self.sender.send(event);
  }
}
