//! Running a single dispatched node.
//!
//! A node run owns its resolved inputs and its record until it finishes. It
//! consults the cache, fetches blob inputs, drives the attempt loop and
//! returns the terminal record to the scheduler.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use strata_cache::{CacheKey, CachedOutputs};
use strata_literal::LiteralMap;
use strata_store::{NodeError, NodeErrorKind, NodeExecutionRecord, NodeState};
use strata_task::{ExecutionContext, TaskError};
use strata_workflow::Node;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::blobs;
use crate::engine::Services;
use crate::events::{ExecutionEvent, ExecutionNotifier};

/// How a node run ended, before it is folded into the execution record.
type RunResult = Result<(NodeState, LiteralMap), NodeError>;

pub(crate) struct NodeRun<N> {
  services: Services<N>,
  node: Node,
  record: NodeExecutionRecord,
  work_dir: PathBuf,
  cancel: CancellationToken,
}

impl<N: ExecutionNotifier> NodeRun<N> {
  /// `record.inputs` must hold the resolved inputs.
  pub fn new(
    services: Services<N>,
    node: Node,
    record: NodeExecutionRecord,
    work_dir: PathBuf,
    cancel: CancellationToken,
  ) -> Self {
    Self {
      services,
      node,
      record,
      work_dir,
      cancel,
    }
  }

  /// Run to a terminal state and return the node's final record.
  #[instrument(
    name = "node_run",
    skip(self),
    fields(
      execution_id = %self.record.execution_id,
      node_id = %self.record.node_id,
      task = %self.record.task_name,
    )
  )]
  pub async fn run(mut self) -> NodeExecutionRecord {
    let result = self.execute().await;
    self.record.completed_at = Some(Utc::now());
    match result {
      Ok((state, outputs)) => {
        self.record.state = state;
        self.record.outputs = Some(outputs);
      }
      Err(err) => {
        self.record.state = match err.kind {
          NodeErrorKind::Cancelled => NodeState::Aborted,
          _ => NodeState::Failed,
        };
        self.record.error = Some(err);
      }
    }
    self.record
  }

  async fn execute(&mut self) -> RunResult {
    let task = self.node.task.clone();
    task
      .interface()
      .validate_inputs(&self.record.inputs)
      .map_err(|e| NodeError::new(NodeErrorKind::Validation, format!("invalid inputs: {e}")))?;

    let cache_key = if task.cache_policy().enabled {
      let key = self.derive_key().await?;
      self.record.cache_key = Some(key.encoded());
      if let Some(outputs) = self.lookup(&key).await {
        return Ok((NodeState::Cached, outputs));
      }
      Some(key)
    } else {
      None
    };

    if self.cancel.is_cancelled() {
      return Err(cancelled());
    }

    let mut inputs = self.record.inputs.clone();
    if let Some(transfer) = &self.services.transfer {
      let dest = self.work_dir.join(&self.node.id).join("inputs");
      blobs::download_inputs(transfer, &mut inputs, &dest)
        .await
        .map_err(|e| {
          NodeError::new(
            NodeErrorKind::TaskExecution,
            format!("failed to fetch blob inputs: {e}"),
          )
        })?;
    }

    let outputs = self.attempt_loop(inputs).await?;
    let outputs = self.complete(outputs).await?;

    if let Some(key) = cache_key {
      let entry = CachedOutputs::new(task.name(), outputs.clone());
      if let Err(e) = self.services.cache.put(&key, &entry).await {
        warn!(
          node_id = %self.node.id,
          cache_key = %key,
          error = %e,
          "cache write failed"
        );
      }
    }

    Ok((NodeState::Succeeded, outputs))
  }

  /// Hash methods may read blob content, so derivation runs on the blocking
  /// pool.
  async fn derive_key(&self) -> Result<CacheKey, NodeError> {
    let deriver = self.services.deriver.clone();
    let task = self.node.task.clone();
    let inputs = self.record.inputs.clone();
    let scope = self.services.config.scope.clone();
    tokio::task::spawn_blocking(move || deriver.derive_key(&task, &inputs, &scope))
      .await
      .map_err(|e| NodeError::new(NodeErrorKind::CacheKey, format!("hashing panicked: {e}")))?
      .map_err(|e| NodeError::new(NodeErrorKind::CacheKey, e.to_string()))
  }

  /// Cached outputs for `key`, if any usable entry exists.
  ///
  /// Backend errors, entries that no longer match the interface and entries
  /// referencing local blobs that are gone count as misses.
  async fn lookup(&self, key: &CacheKey) -> Option<LiteralMap> {
    match self.services.cache.get(key).await {
      Ok(Some(hit)) => {
        if let Err(e) = self.node.task.interface().validate_outputs(&hit.outputs) {
          warn!(
            node_id = %self.node.id,
            cache_key = %key,
            error = %e,
            "cached outputs do not match interface, ignoring entry"
          );
          return None;
        }
        if let Some(path) = blobs::missing_local_blob(&hit.outputs).await {
          warn!(
            node_id = %self.node.id,
            cache_key = %key,
            path = %path.display(),
            "cached blob output no longer exists, ignoring entry"
          );
          return None;
        }
        info!(node_id = %self.node.id, cache_key = %key, "node_cache_hit");
        Some(hit.outputs)
      }
      Ok(None) => {
        info!(node_id = %self.node.id, cache_key = %key, "node_cache_miss");
        None
      }
      Err(e) => {
        warn!(
          node_id = %self.node.id,
          cache_key = %key,
          error = %e,
          "cache lookup failed, treating as miss"
        );
        None
      }
    }
  }

  /// Invoke the body until it succeeds, fails without retry, or the budget
  /// runs out.
  async fn attempt_loop(&mut self, inputs: LiteralMap) -> Result<LiteralMap, NodeError> {
    let config = self.services.config.clone();
    let budget = self.node.retry_budget(config.retry.max_retries);
    let timeout = self.node.attempt_timeout(config.default_timeout);

    loop {
      let attempt = self.record.attempts + 1;
      self.record.attempts = attempt;
      self.record.state = NodeState::Running;
      self.record.started_at.get_or_insert_with(Utc::now);
      self.persist().await;

      info!(node_id = %self.node.id, attempt, "node_started");
      self.services.notifier.notify(ExecutionEvent::NodeRunning {
        execution_id: self.record.execution_id.clone(),
        node_id: self.node.id.clone(),
        attempt,
      });

      let dir = self
        .work_dir
        .join(&self.node.id)
        .join(format!("attempt-{attempt}"));
      tokio::fs::create_dir_all(&dir).await.map_err(|e| {
        NodeError::new(
          NodeErrorKind::TaskExecution,
          format!("failed to create working directory: {e}"),
        )
      })?;
      let ctx = ExecutionContext::new(
        &self.record.execution_id,
        &self.node.id,
        self.node.task.name(),
        attempt,
        config.scope.clone(),
        self.node.task.resources().clone(),
        dir,
        self.cancel.clone(),
      );

      let invocation = bounded(timeout, self.node.task.invoke(&ctx, inputs.clone()));
      let result = tokio::select! {
        _ = self.cancel.cancelled() => {
          warn!(node_id = %self.node.id, attempt, "node interrupted by cancellation");
          return Err(cancelled());
        }
        result = invocation => result,
      };

      let err = match result {
        Ok(outputs) => return Ok(outputs),
        Err(err) => err,
      };

      if !err.is_retryable() || attempt > budget {
        error!(node_id = %self.node.id, attempt, error = %err, "node_failed");
        return Err(NodeError::new(NodeErrorKind::TaskExecution, err.to_string()));
      }

      // The final failure is announced by the scheduler.
      self.services.notifier.notify(ExecutionEvent::NodeFailed {
        execution_id: self.record.execution_id.clone(),
        node_id: self.node.id.clone(),
        error: err.to_string(),
        will_retry: true,
      });
      let delay = config.retry.delay_for(attempt);
      warn!(
        node_id = %self.node.id,
        attempt,
        error = %err,
        delay_ms = delay.as_millis() as u64,
        "node attempt failed, retrying"
      );
      tokio::select! {
        _ = self.cancel.cancelled() => return Err(cancelled()),
        _ = tokio::time::sleep(delay) => {}
      }
    }
  }

  /// Validate, stamp and offload the outputs of a successful attempt.
  async fn complete(&self, outputs: LiteralMap) -> Result<LiteralMap, NodeError> {
    let interface = self.node.task.interface().clone();
    interface
      .validate_outputs(&outputs)
      .map_err(|e| NodeError::new(NodeErrorKind::Validation, format!("invalid outputs: {e}")))?;

    let registry = self.services.deriver.clone();
    let mut outputs = tokio::task::spawn_blocking(move || {
      let mut outputs = outputs;
      blobs::stamp_hash_methods(&interface, registry.hash_methods(), &mut outputs)
        .map(|()| outputs)
    })
    .await
    .map_err(|e| NodeError::new(NodeErrorKind::CacheKey, format!("hashing panicked: {e}")))?
    .map_err(|message| NodeError::new(NodeErrorKind::CacheKey, message))?;

    let stored = match &self.services.transfer {
      Some(transfer) => {
        blobs::upload_outputs(
          transfer,
          &self.record.execution_id,
          &self.node.id,
          &mut outputs,
        )
        .await
      }
      None => {
        blobs::persist_outputs(
          &self.services.local_outputs,
          &self.work_dir,
          &self.record.execution_id,
          &self.node.id,
          &mut outputs,
        )
        .await
      }
    };
    stored.map_err(|e| {
      NodeError::new(
        NodeErrorKind::TaskExecution,
        format!("failed to store blob outputs: {e}"),
      )
    })?;
    Ok(outputs)
  }

  async fn persist(&self) {
    if let Err(e) = self.services.store.put_node(&self.record).await {
      warn!(node_id = %self.node.id, error = %e, "failed to record node state");
    }
  }
}

fn cancelled() -> NodeError {
  NodeError::new(NodeErrorKind::Cancelled, "execution was cancelled")
}

async fn bounded(
  timeout: Option<Duration>,
  invocation: impl Future<Output = Result<LiteralMap, TaskError>>,
) -> Result<LiteralMap, TaskError> {
  match timeout {
    Some(limit) => tokio::time::timeout(limit, invocation)
      .await
      .unwrap_or_else(|_| {
        Err(TaskError::failed(format!(
          "attempt timed out after {}ms",
          limit.as_millis()
        )))
      }),
    None => invocation.await,
  }
}
