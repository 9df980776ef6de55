use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use strata_config::Scope;
use tokio::sync::RwLock;

use crate::types::{ExecutionRecord, NodeExecutionRecord};
use crate::{ExecutionStore, StoreError};

/// Process-local execution store. Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct InMemoryExecutionStore {
  executions: Arc<RwLock<HashMap<String, ExecutionRecord>>>,
}

impl InMemoryExecutionStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
  async fn create_execution(&self, execution: &ExecutionRecord) -> Result<(), StoreError> {
    let mut executions = self.executions.write().await;
    if executions.contains_key(&execution.execution_id) {
      return Err(StoreError::AlreadyExists(execution.execution_id.clone()));
    }
    executions.insert(execution.execution_id.clone(), execution.clone());
    Ok(())
  }

  async fn update_execution(&self, execution: &ExecutionRecord) -> Result<(), StoreError> {
    let mut executions = self.executions.write().await;
    let stored = executions
      .get_mut(&execution.execution_id)
      .ok_or_else(|| StoreError::NotFound(execution.execution_id.clone()))?;
    if stored.is_terminal() {
      return Err(StoreError::Terminal(execution.execution_id.clone()));
    }
    stored.state = execution.state;
    stored.outputs = execution.outputs.clone();
    stored.failure = execution.failure.clone();
    stored.completed_at = execution.completed_at;
    Ok(())
  }

  async fn put_node(&self, node: &NodeExecutionRecord) -> Result<(), StoreError> {
    let mut executions = self.executions.write().await;
    let stored = executions
      .get_mut(&node.execution_id)
      .ok_or_else(|| StoreError::NotFound(node.execution_id.clone()))?;
    if stored.is_terminal() {
      return Err(StoreError::Terminal(node.execution_id.clone()));
    }
    stored.nodes.insert(node.node_id.clone(), node.clone());
    Ok(())
  }

  async fn get_execution(&self, execution_id: &str) -> Result<ExecutionRecord, StoreError> {
    self
      .executions
      .read()
      .await
      .get(execution_id)
      .cloned()
      .ok_or_else(|| StoreError::NotFound(execution_id.to_string()))
  }

  async fn get_node(
    &self,
    execution_id: &str,
    node_id: &str,
  ) -> Result<NodeExecutionRecord, StoreError> {
    let executions = self.executions.read().await;
    let execution = executions
      .get(execution_id)
      .ok_or_else(|| StoreError::NotFound(execution_id.to_string()))?;
    execution
      .nodes
      .get(node_id)
      .cloned()
      .ok_or_else(|| StoreError::NotFound(format!("{}/{}", execution_id, node_id)))
  }

  async fn list_nodes(&self, execution_id: &str) -> Result<Vec<NodeExecutionRecord>, StoreError> {
    let executions = self.executions.read().await;
    let execution = executions
      .get(execution_id)
      .ok_or_else(|| StoreError::NotFound(execution_id.to_string()))?;
    Ok(execution.nodes.values().cloned().collect())
  }

  async fn list_executions(
    &self,
    scope: Option<&Scope>,
  ) -> Result<Vec<ExecutionRecord>, StoreError> {
    let executions = self.executions.read().await;
    let mut list: Vec<ExecutionRecord> = executions
      .values()
      .filter(|e| scope.is_none_or(|s| &e.scope == s))
      .map(|e| ExecutionRecord {
        nodes: Default::default(),
        ..e.clone()
      })
      .collect();
    list.sort_by(|a, b| {
      b.started_at
        .cmp(&a.started_at)
        .then_with(|| a.execution_id.cmp(&b.execution_id))
    });
    Ok(list)
  }
}
