use std::sync::Arc;
use std::time::Duration;

use strata_config::Scope;

use crate::types::{ExecutionRecord, NodeExecutionRecord};
use crate::{ExecutionStore, StoreError};

/// Read-only view of executions.
///
/// Cheap to clone; every clone reads from the same store.
#[derive(Clone)]
pub struct ExecutionClient {
  store: Arc<dyn ExecutionStore>,
}

impl ExecutionClient {
  pub fn new(store: Arc<dyn ExecutionStore>) -> Self {
    Self { store }
  }

  pub async fn get_execution(&self, execution_id: &str) -> Result<ExecutionRecord, StoreError> {
    self.store.get_execution(execution_id).await
  }

  pub async fn get_node(
    &self,
    execution_id: &str,
    node_id: &str,
  ) -> Result<NodeExecutionRecord, StoreError> {
    self.store.get_node(execution_id, node_id).await
  }

  pub async fn list_executions(
    &self,
    scope: Option<&Scope>,
  ) -> Result<Vec<ExecutionRecord>, StoreError> {
    self.store.list_executions(scope).await
  }

  /// Refresh a previously fetched record in place.
  ///
  /// Terminal records never change, so syncing one does not touch the store.
  /// Calling this repeatedly is always safe.
  pub async fn sync(&self, record: &mut ExecutionRecord) -> Result<(), StoreError> {
    if record.is_terminal() {
      return Ok(());
    }
    *record = self.store.get_execution(&record.execution_id).await?;
    Ok(())
  }

  /// Poll every `interval` until the execution is terminal.
  pub async fn wait_for_terminal(
    &self,
    execution_id: &str,
    interval: Duration,
  ) -> Result<ExecutionRecord, StoreError> {
    let mut record = self.store.get_execution(execution_id).await?;
    while !record.is_terminal() {
      tokio::time::sleep(interval).await;
      self.sync(&mut record).await?;
    }
    Ok(record)
  }
}
