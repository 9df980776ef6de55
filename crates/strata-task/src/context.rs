use std::path::{Path, PathBuf};

use strata_config::Scope;
use tokio_util::sync::CancellationToken;

use crate::task::Resources;

/// Per-attempt context handed to a task body.
///
/// Created by the engine when a node is dispatched and dropped when the
/// attempt finishes. Bodies should write any files they produce under
/// [`ExecutionContext::working_dir`]; the directory is removed once the
/// execution completes, after blob outputs have been uploaded.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
  pub execution_id: String,
  pub node_id: String,
  pub task_name: String,
  /// 1-based attempt number.
  pub attempt: u32,
  pub scope: Scope,
  pub resources: Resources,
  working_dir: PathBuf,
  cancel: CancellationToken,
}

impl ExecutionContext {
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    execution_id: impl Into<String>,
    node_id: impl Into<String>,
    task_name: impl Into<String>,
    attempt: u32,
    scope: Scope,
    resources: Resources,
    working_dir: PathBuf,
    cancel: CancellationToken,
  ) -> Self {
    Self {
      execution_id: execution_id.into(),
      node_id: node_id.into(),
      task_name: task_name.into(),
      attempt,
      scope,
      resources,
      working_dir,
      cancel,
    }
  }

  /// Scratch directory private to this attempt.
  pub fn working_dir(&self) -> &Path {
    &self.working_dir
  }

  /// Whether the execution has been cancelled.
  ///
  /// Long-running bodies should poll this and return early.
  pub fn is_cancelled(&self) -> bool {
    self.cancel.is_cancelled()
  }

  /// Token cancelled when the execution is cancelled.
  pub fn cancellation(&self) -> &CancellationToken {
    &self.cancel
  }
}
