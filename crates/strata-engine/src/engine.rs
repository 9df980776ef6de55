//! The execution engine.
//!
//! `Engine` validates launch inputs, creates the execution record and hands the
//! workflow to a [`Scheduler`] running on its own tokio task.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use strata_artifact::BlobTransfer;
use strata_cache::{CacheKeyDeriver, CacheStore, HashMethodRegistry};
use strata_literal::LiteralMap;
use strata_store::{
  ExecutionClient, ExecutionRecord, ExecutionState, ExecutionStore, NodeExecutionRecord,
};
use strata_task::Task;
use strata_workflow::{Binding, LaunchPlan, Node, Workflow};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::blobs::LocalOutputs;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::handle::ExecutionHandle;
use crate::options::LaunchOptions;
use crate::scheduler::Scheduler;

/// Node id used by [`Engine::execute_task`].
pub const TASK_NODE_ID: &str = "n0";

/// Everything a running execution needs from the engine.
pub(crate) struct Services<N> {
  pub config: Arc<EngineConfig>,
  pub deriver: Arc<CacheKeyDeriver>,
  pub cache: Arc<dyn CacheStore>,
  pub store: Arc<dyn ExecutionStore>,
  pub transfer: Option<Arc<BlobTransfer>>,
  pub local_outputs: Arc<LocalOutputs>,
  pub notifier: Arc<N>,
}

impl<N> Clone for Services<N> {
  fn clone(&self) -> Self {
    Self {
      config: self.config.clone(),
      deriver: self.deriver.clone(),
      cache: self.cache.clone(),
      store: self.store.clone(),
      transfer: self.transfer.clone(),
      local_outputs: self.local_outputs.clone(),
      notifier: self.notifier.clone(),
    }
  }
}

/// Runs workflows against a cache store and an execution store.
///
/// `N` receives progress events; [`Engine::new`] discards them. Clones share
/// the cache, store and notifier.
pub struct Engine<N: ExecutionNotifier = NoopNotifier> {
  services: Services<N>,
}

impl<N: ExecutionNotifier> Clone for Engine<N> {
  fn clone(&self) -> Self {
    Self {
      services: self.services.clone(),
    }
  }
}

impl Engine<NoopNotifier> {
  pub fn new(
    config: EngineConfig,
    cache: Arc<dyn CacheStore>,
    store: Arc<dyn ExecutionStore>,
  ) -> Self {
    Self::with_notifier(config, cache, store, NoopNotifier)
  }
}

impl<N: ExecutionNotifier + 'static> Engine<N> {
  /// Engine that publishes every [`ExecutionEvent`] to `notifier`.
  pub fn with_notifier(
    config: EngineConfig,
    cache: Arc<dyn CacheStore>,
    store: Arc<dyn ExecutionStore>,
    notifier: N,
  ) -> Self {
    let local_outputs = Arc::new(LocalOutputs::new(config.output_root()));
    Self {
      services: Services {
        config: Arc::new(config),
        deriver: Arc::new(CacheKeyDeriver::default()),
        cache,
        store,
        transfer: None,
        local_outputs,
        notifier: Arc::new(notifier),
      },
    }
  }

  /// Replace the hash methods available to cache key derivation.
  pub fn with_hash_methods(mut self, hash_methods: HashMethodRegistry) -> Self {
    self.services.deriver = Arc::new(CacheKeyDeriver::new(hash_methods));
    self
  }

  /// Offload blob outputs through `transfer` and fetch remote blob inputs back.
  pub fn with_blob_transfer(mut self, transfer: BlobTransfer) -> Self {
    self.services.transfer = Some(Arc::new(transfer));
    self
  }

  pub fn config(&self) -> &EngineConfig {
    &self.services.config
  }

  /// Read-only view over this engine's execution records.
  pub fn client(&self) -> ExecutionClient {
    ExecutionClient::new(self.services.store.clone())
  }

  /// Start executing `workflow` and return immediately.
  ///
  /// Inputs are validated before anything is recorded. The returned handle can
  /// cancel the execution or wait for its terminal record.
  pub async fn launch(
    &self,
    workflow: &Workflow,
    inputs: LiteralMap,
  ) -> Result<ExecutionHandle, EngineError> {
    self
      .launch_with(workflow, inputs, &LaunchOptions::default())
      .await
  }

  /// [`Engine::launch`] with an explicit execution name or name prefix.
  #[instrument(name = "execution_launch", skip(self, workflow, inputs), fields(workflow = %workflow.name()))]
  pub async fn launch_with(
    &self,
    workflow: &Workflow,
    inputs: LiteralMap,
    options: &LaunchOptions,
  ) -> Result<ExecutionHandle, EngineError> {
    workflow
      .validate_inputs(&inputs)
      .map_err(|source| EngineError::InvalidInputs {
        workflow: workflow.name().to_string(),
        source,
      })?;

    let execution_id = options.execution_id();
    if execution_id.trim().is_empty() || execution_id.contains('/') {
      return Err(EngineError::InvalidExecutionName(execution_id));
    }
    let work_dir = self.create_work_dir().await?;

    let nodes = workflow
      .nodes()
      .iter()
      .map(|node| {
        (
          node.id.clone(),
          NodeExecutionRecord::pending(&execution_id, &node.id, node.task.name()),
        )
      })
      .collect::<BTreeMap<_, _>>();

    let record = ExecutionRecord {
      execution_id: execution_id.clone(),
      workflow_name: workflow.name().to_string(),
      workflow_version: workflow.version().to_string(),
      scope: self.services.config.scope.clone(),
      state: ExecutionState::Running,
      inputs,
      outputs: None,
      failure: None,
      nodes,
      started_at: Utc::now(),
      completed_at: None,
    };
    self.services.store.create_execution(&record).await?;

    info!(
      execution_id = %execution_id,
      workflow = %workflow.name(),
      version = %workflow.version(),
      scope = %record.scope,
      nodes = workflow.nodes().len(),
      "execution_started"
    );
    self.services.notifier.notify(ExecutionEvent::ExecutionStarted {
      execution_id: execution_id.clone(),
      workflow_name: workflow.name().to_string(),
    });

    let cancel = CancellationToken::new();
    let scheduler = Scheduler::new(
      self.services.clone(),
      Arc::new(workflow.clone()),
      record,
      work_dir,
      cancel.clone(),
    );
    let join = tokio::spawn(scheduler.run());

    Ok(ExecutionHandle::new(execution_id, cancel, join))
  }

  /// Launch a plan's workflow with `inputs` merged over its defaults and
  /// under its fixed inputs.
  pub async fn launch_plan(
    &self,
    plan: &LaunchPlan,
    inputs: LiteralMap,
    options: &LaunchOptions,
  ) -> Result<ExecutionHandle, EngineError> {
    let inputs = plan.resolve_inputs(inputs)?;
    info!(plan = %plan.name(), version = %plan.version(), "launch_plan_resolved");
    self.launch_with(plan.workflow(), inputs, options).await
  }

  /// Launch `workflow` and wait for its terminal record.
  pub async fn execute(
    &self,
    workflow: &Workflow,
    inputs: LiteralMap,
  ) -> Result<ExecutionRecord, EngineError> {
    self.launch(workflow, inputs).await?.wait().await
  }

  /// Run a single task as a one-node execution.
  ///
  /// The workflow takes the task's inputs and exposes its outputs under the
  /// same names. The node id is [`TASK_NODE_ID`].
  pub async fn execute_task(
    &self,
    task: &Task,
    inputs: LiteralMap,
  ) -> Result<ExecutionRecord, EngineError> {
    let interface = task.interface();
    let mut node = Node::new(TASK_NODE_ID, task);
    let mut builder = Workflow::builder(task.name());
    for var in &interface.inputs {
      node = node.bind(&var.name, Binding::input(&var.name));
      builder = builder.input(&var.name, var.literal_type.clone());
    }
    for var in &interface.outputs {
      builder = builder.output(&var.name, Binding::output(TASK_NODE_ID, &var.name));
    }
    let workflow = builder.node(node).build()?;
    self.execute(&workflow, inputs).await
  }

  async fn create_work_dir(&self) -> Result<tempfile::TempDir, EngineError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("strata-exec-");
    let dir = match &self.services.config.work_root {
      Some(root) => {
        tokio::fs::create_dir_all(root)
          .await
          .map_err(EngineError::WorkingDir)?;
        builder.tempdir_in(root)
      }
      None => builder.tempdir(),
    };
    dir.map_err(EngineError::WorkingDir)
  }
}
