use strata_store::ExecutionRecord;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;

/// A handle to a launched execution.
///
/// Dropping the handle does not cancel the execution.
#[derive(Debug)]
pub struct ExecutionHandle {
  execution_id: String,
  cancel: CancellationToken,
  join: JoinHandle<ExecutionRecord>,
}

impl ExecutionHandle {
  pub(crate) fn new(
    execution_id: String,
    cancel: CancellationToken,
    join: JoinHandle<ExecutionRecord>,
  ) -> Self {
    Self {
      execution_id,
      cancel,
      join,
    }
  }

  pub fn execution_id(&self) -> &str {
    &self.execution_id
  }

  /// Stop dispatching new nodes and interrupt running ones.
  ///
  /// Nodes that already completed keep their results.
  pub fn cancel(&self) {
    self.cancel.cancel();
  }

  /// Token cancelled when the execution is cancelled.
  pub fn cancellation_token(&self) -> CancellationToken {
    self.cancel.clone()
  }

  pub fn is_finished(&self) -> bool {
    self.join.is_finished()
  }

  /// Wait for the execution to reach a terminal state.
  pub async fn wait(self) -> Result<ExecutionRecord, EngineError> {
    self.join.await.map_err(|e| EngineError::Terminated {
      execution_id: self.execution_id,
      message: e.to_string(),
    })
  }
}
