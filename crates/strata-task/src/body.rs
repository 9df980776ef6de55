//! Task body invocation interface.

use std::sync::Arc;

use async_trait::async_trait;
use strata_literal::LiteralMap;

use crate::context::ExecutionContext;
use crate::error::TaskError;

/// The executable part of a task.
///
/// The engine treats a body as a black box: it receives fully resolved input
/// literals and must return one literal per declared output.
#[async_trait]
pub trait TaskBody: Send + Sync {
  async fn invoke(
    &self,
    ctx: &ExecutionContext,
    inputs: LiteralMap,
  ) -> Result<LiteralMap, TaskError>;
}

/// A task body backed by a blocking closure.
///
/// The closure runs on tokio's blocking thread pool so long computations do
/// not stall the scheduler.
pub struct FnBody<F> {
  func: Arc<F>,
}

/// Wrap a closure as a [`TaskBody`].
pub fn task_fn<F>(func: F) -> FnBody<F>
where
  F: Fn(&ExecutionContext, LiteralMap) -> Result<LiteralMap, TaskError> + Send + Sync + 'static,
{
  FnBody {
    func: Arc::new(func),
  }
}

#[async_trait]
impl<F> TaskBody for FnBody<F>
where
  F: Fn(&ExecutionContext, LiteralMap) -> Result<LiteralMap, TaskError> + Send + Sync + 'static,
{
  async fn invoke(
    &self,
    ctx: &ExecutionContext,
    inputs: LiteralMap,
  ) -> Result<LiteralMap, TaskError> {
    let func = self.func.clone();
    let ctx = ctx.clone();
    tokio::task::spawn_blocking(move || func(&ctx, inputs))
      .await
      .map_err(|e| TaskError::failed(format!("task body panicked: {}", e)))?
  }
}
