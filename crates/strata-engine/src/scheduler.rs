//! DAG scheduling for one execution.
//!
//! The scheduler keeps a FIFO ready queue and a count of unfinished upstream
//! dependencies per node. Ready nodes are dispatched onto a `JoinSet` up to
//! `max_parallelism` at a time. A failed node marks its transitive downstream
//! nodes skipped while independent branches keep running. Cancellation stops
//! dispatch, skips everything not yet started and interrupts running nodes
//! through child tokens.

use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use strata_literal::LiteralMap;
use strata_store::{
  ExecutionFailure, ExecutionRecord, ExecutionState, NodeError, NodeErrorKind,
  NodeExecutionRecord, NodeState,
};
use strata_workflow::{Binding, Node, Workflow};
use tempfile::TempDir;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::engine::Services;
use crate::events::{ExecutionEvent, ExecutionNotifier};
use crate::node::NodeRun;

pub(crate) struct Scheduler<N> {
  services: Services<N>,
  workflow: Arc<Workflow>,
  record: ExecutionRecord,
  work_dir: TempDir,
  cancel: CancellationToken,
  /// Unfinished upstream dependencies per node.
  waiting: HashMap<String, usize>,
  ready: VecDeque<String>,
  running: JoinSet<NodeExecutionRecord>,
  max_parallelism: usize,
  cancelled: bool,
  /// First node that failed on its own, with its error message.
  root_cause: Option<(String, String)>,
}

impl<N: ExecutionNotifier + 'static> Scheduler<N> {
  pub fn new(
    services: Services<N>,
    workflow: Arc<Workflow>,
    record: ExecutionRecord,
    work_dir: TempDir,
    cancel: CancellationToken,
  ) -> Self {
    let graph = workflow.graph();
    let waiting = graph
      .topological_order()
      .iter()
      .map(|id| (id.clone(), graph.upstream(id).len()))
      .collect();
    let max_parallelism = services.config.max_parallelism.max(1);
    Self {
      services,
      workflow,
      record,
      work_dir,
      cancel,
      waiting,
      ready: VecDeque::new(),
      running: JoinSet::new(),
      max_parallelism,
      cancelled: false,
      root_cause: None,
    }
  }

  /// Drive the execution to a terminal state and return its final record.
  #[instrument(
    name = "execution_run",
    skip(self),
    fields(
      execution_id = %self.record.execution_id,
      workflow = %self.record.workflow_name,
    )
  )]
  pub async fn run(mut self) -> ExecutionRecord {
    let workflow = self.workflow.clone();
    for node_id in workflow.graph().entry_points() {
      self.mark_ready(node_id).await;
    }

    loop {
      if !self.cancelled && self.cancel.is_cancelled() {
        self.on_cancel().await;
      }

      while !self.cancelled && self.running.len() < self.max_parallelism {
        let Some(node_id) = self.ready.pop_front() else {
          break;
        };
        self.dispatch(&node_id).await;
      }

      if self.running.is_empty() {
        break;
      }

      tokio::select! {
        _ = self.cancel.cancelled(), if !self.cancelled => {}
        Some(joined) = self.running.join_next() => match joined {
          Ok(finished) => self.on_finished(finished).await,
          Err(e) => error!(error = %e, "node task ended abnormally"),
        },
      }
    }

    self.finish().await
  }

  async fn mark_ready(&mut self, node_id: &str) {
    let Some(node) = self.record.nodes.get_mut(node_id) else {
      return;
    };
    node.state = NodeState::Ready;
    let node = node.clone();
    self.persist_node(&node).await;

    debug!(node_id = %node_id, "node_ready");
    self.services.notifier.notify(ExecutionEvent::NodeReady {
      execution_id: self.record.execution_id.clone(),
      node_id: node_id.to_string(),
    });
    self.ready.push_back(node_id.to_string());
  }

  async fn dispatch(&mut self, node_id: &str) {
    let Some(node) = self.workflow.get_node(node_id).cloned() else {
      return;
    };
    let Some(mut record) = self.record.nodes.get(node_id).cloned() else {
      return;
    };

    match self.resolve_inputs(&node) {
      Ok(inputs) => record.inputs = inputs,
      Err(err) => {
        record.state = NodeState::Failed;
        record.error = Some(err);
        record.completed_at = Some(Utc::now());
        self.on_finished(record).await;
        return;
      }
    }

    let run = NodeRun::new(
      self.services.clone(),
      node,
      record.clone(),
      self.work_dir.path().to_path_buf(),
      self.cancel.child_token(),
    );
    self.running.spawn(async move {
      match AssertUnwindSafe(run.run()).catch_unwind().await {
        Ok(finished) => finished,
        Err(panic) => {
          let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
          record.state = NodeState::Failed;
          record.error = Some(NodeError::new(
            NodeErrorKind::TaskExecution,
            format!("node panicked: {message}"),
          ));
          record.completed_at = Some(Utc::now());
          record
        }
      }
    });
  }

  fn resolve_inputs(&self, node: &Node) -> Result<LiteralMap, NodeError> {
    node
      .bindings
      .iter()
      .map(|(input, binding)| {
        let value = match binding {
          Binding::Literal { value } => Some(value.clone()),
          Binding::WorkflowInput { name } => self.record.inputs.get(name).cloned(),
          Binding::NodeOutput { node_id, output } => self
            .record
            .nodes
            .get(node_id)
            .and_then(|upstream| upstream.outputs.as_ref())
            .and_then(|outputs| outputs.get(output))
            .cloned(),
        };
        value.map(|v| (input.clone(), v)).ok_or_else(|| {
          NodeError::new(
            NodeErrorKind::Validation,
            format!("input '{input}' did not resolve to a value"),
          )
        })
      })
      .collect()
  }

  async fn on_finished(&mut self, finished: NodeExecutionRecord) {
    let node_id = finished.node_id.clone();
    let state = finished.state;
    self.persist_node(&finished).await;
    self.record.nodes.insert(node_id.clone(), finished.clone());

    let execution_id = self.record.execution_id.clone();
    match state {
      NodeState::Succeeded | NodeState::Cached => {
        info!(node_id = %node_id, state = %state, attempts = finished.attempts, "node_completed");
        self.services.notifier.notify(match (state, finished.cache_key) {
          (NodeState::Cached, Some(cache_key)) => ExecutionEvent::NodeCached {
            execution_id,
            node_id: node_id.clone(),
            cache_key,
          },
          _ => ExecutionEvent::NodeSucceeded {
            execution_id,
            node_id: node_id.clone(),
          },
        });
        if !self.cancelled {
          self.release_downstream(&node_id).await;
        }
      }
      NodeState::Failed => {
        let message = finished
          .error
          .as_ref()
          .map(|e| e.message.clone())
          .unwrap_or_default();
        error!(node_id = %node_id, error = %message, "node_failed_terminal");
        self.services.notifier.notify(ExecutionEvent::NodeFailed {
          execution_id,
          node_id: node_id.clone(),
          error: message.clone(),
          will_retry: false,
        });
        if self.root_cause.is_none() {
          self.root_cause = Some((node_id.clone(), message));
        }
        self.skip_downstream(&node_id).await;
      }
      NodeState::Aborted => {
        warn!(node_id = %node_id, "node_aborted");
        self.services.notifier.notify(ExecutionEvent::NodeAborted {
          execution_id,
          node_id,
        });
      }
      _ => {}
    }
  }

  /// Count down direct downstream nodes and queue those with nothing left
  /// to wait for.
  async fn release_downstream(&mut self, node_id: &str) {
    let workflow = self.workflow.clone();
    for downstream in workflow.graph().downstream(node_id) {
      let Some(count) = self.waiting.get_mut(downstream) else {
        continue;
      };
      *count = count.saturating_sub(1);
      let pending = self
        .record
        .nodes
        .get(downstream)
        .is_some_and(|n| n.state == NodeState::Pending);
      if *count == 0 && pending {
        self.mark_ready(downstream).await;
      }
    }
  }

  async fn skip_downstream(&mut self, root_cause: &str) {
    let workflow = self.workflow.clone();
    for descendant in workflow.graph().descendants(root_cause) {
      self
        .skip(
          &descendant,
          NodeError::new(
            NodeErrorKind::UpstreamFailure {
              root_cause: root_cause.to_string(),
            },
            format!("upstream node '{root_cause}' failed"),
          ),
        )
        .await;
    }
  }

  async fn on_cancel(&mut self) {
    self.cancelled = true;
    self.ready.clear();
    warn!(
      execution_id = %self.record.execution_id,
      running = self.running.len(),
      "execution_cancelled"
    );

    let workflow = self.workflow.clone();
    for node_id in workflow.graph().topological_order() {
      self
        .skip(
          node_id,
          NodeError::new(
            NodeErrorKind::Cancelled,
            "execution was cancelled before this node started",
          ),
        )
        .await;
    }
  }

  /// Mark a node that has not started as skipped. Started nodes are left alone.
  async fn skip(&mut self, node_id: &str, reason: NodeError) {
    let Some(node) = self.record.nodes.get_mut(node_id) else {
      return;
    };
    if !matches!(node.state, NodeState::Pending | NodeState::Ready) {
      return;
    }
    node.state = NodeState::Skipped;
    node.completed_at = Some(Utc::now());
    node.error = Some(reason.clone());
    let node = node.clone();
    self.persist_node(&node).await;

    info!(node_id = %node_id, reason = %reason, "node_skipped");
    self.services.notifier.notify(ExecutionEvent::NodeSkipped {
      execution_id: self.record.execution_id.clone(),
      node_id: node_id.to_string(),
      reason: reason.message,
    });
  }

  async fn finish(mut self) -> ExecutionRecord {
    let workflow = self.workflow.clone();

    let mut state = if self.cancelled {
      ExecutionState::Aborted
    } else if self.root_cause.is_some() {
      ExecutionState::Failed
    } else {
      ExecutionState::Succeeded
    };

    if !self.cancelled {
      let stranded = workflow
        .graph()
        .topological_order()
        .iter()
        .find(|id| {
          self
            .record
            .nodes
            .get(id.as_str())
            .is_some_and(|n| !n.state.is_terminal())
        })
        .cloned();
      if let Some(node_id) = stranded {
        error!(node_id = %node_id, "node never reached a terminal state");
        state = ExecutionState::Failed;
        if self.root_cause.is_none() {
          let message = format!("node '{node_id}' never reached a terminal state");
          self.root_cause = Some((node_id, message));
        }
      }
    }

    if state == ExecutionState::Succeeded {
      match self.resolve_outputs(&workflow) {
        Ok(outputs) => self.record.outputs = Some(outputs),
        Err((node_id, message)) => {
          state = ExecutionState::Failed;
          self.root_cause = Some((node_id, message));
        }
      }
    }

    if let Some((root_cause_node, message)) = self.root_cause.take() {
      let skipped_nodes = workflow
        .graph()
        .topological_order()
        .iter()
        .filter(|id| {
          self.record.nodes.get(id.as_str()).is_some_and(|n| {
            n.state == NodeState::Skipped
              && matches!(
                n.error.as_ref().map(|e| &e.kind),
                Some(NodeErrorKind::UpstreamFailure { .. })
              )
          })
        })
        .cloned()
        .collect();
      self.record.failure = Some(ExecutionFailure {
        root_cause_node,
        message,
        skipped_nodes,
      });
    }

    self.record.state = state;
    self.record.completed_at = Some(Utc::now());
    if let Err(e) = self.services.store.update_execution(&self.record).await {
      error!(error = %e, "failed to record execution result");
    }

    match state {
      ExecutionState::Succeeded => info!(execution_id = %self.record.execution_id, "execution_completed"),
      _ => warn!(
        execution_id = %self.record.execution_id,
        state = %state,
        root_cause = ?self.record.failure.as_ref().map(|f| &f.root_cause_node),
        "execution_finished"
      ),
    }
    self.services.notifier.notify(ExecutionEvent::ExecutionFinished {
      execution_id: self.record.execution_id.clone(),
      state,
    });

    if let Err(e) = self.work_dir.close() {
      warn!(error = %e, "failed to remove working directory");
    }
    self.record
  }

  /// Workflow outputs, or the node whose output is missing.
  fn resolve_outputs(&self, workflow: &Workflow) -> Result<LiteralMap, (String, String)> {
    let mut outputs = LiteralMap::new();
    for (name, binding) in workflow.outputs() {
      let Binding::NodeOutput { node_id, output } = binding else {
        continue;
      };
      let value = self
        .record
        .nodes
        .get(node_id)
        .and_then(|n| n.outputs.as_ref())
        .and_then(|o| o.get(output))
        .cloned()
        .ok_or_else(|| {
          (
            node_id.clone(),
            format!("node '{node_id}' did not produce output '{output}'"),
          )
        })?;
      outputs.insert(name.clone(), value);
    }
    Ok(outputs)
  }

  async fn persist_node(&self, node: &NodeExecutionRecord) {
    if let Err(e) = self.services.store.put_node(node).await {
      warn!(node_id = %node.node_id, error = %e, "failed to record node state");
    }
  }
}
