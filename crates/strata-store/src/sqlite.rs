use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, SqlitePool};
use strata_config::Scope;
use strata_literal::LiteralMap;

use crate::types::{
  ExecutionFailure, ExecutionRecord, ExecutionState, NodeError, NodeExecutionRecord, NodeState,
};
use crate::{ExecutionStore, StoreError};

/// SQLite-based store implementation.
#[derive(Debug, Clone)]
pub struct SqliteExecutionStore {
  pool: SqlitePool,
}

#[derive(FromRow)]
struct ExecutionRow {
  execution_id: String,
  workflow_name: String,
  workflow_version: String,
  project: String,
  domain: String,
  state: ExecutionState,
  inputs: Json<LiteralMap>,
  outputs: Option<Json<LiteralMap>>,
  failure: Option<Json<ExecutionFailure>>,
  started_at: DateTime<Utc>,
  completed_at: Option<DateTime<Utc>>,
}

impl From<ExecutionRow> for ExecutionRecord {
  fn from(row: ExecutionRow) -> Self {
    ExecutionRecord {
      execution_id: row.execution_id,
      workflow_name: row.workflow_name,
      workflow_version: row.workflow_version,
      scope: Scope::new(row.project, row.domain),
      state: row.state,
      inputs: row.inputs.0,
      outputs: row.outputs.map(|j| j.0),
      failure: row.failure.map(|j| j.0),
      nodes: BTreeMap::new(),
      started_at: row.started_at,
      completed_at: row.completed_at,
    }
  }
}

#[derive(FromRow)]
struct NodeRow {
  execution_id: String,
  node_id: String,
  task_name: String,
  state: NodeState,
  attempts: i64,
  inputs: Json<LiteralMap>,
  outputs: Option<Json<LiteralMap>>,
  error: Option<Json<NodeError>>,
  cache_key: Option<String>,
  started_at: Option<DateTime<Utc>>,
  completed_at: Option<DateTime<Utc>>,
}

impl From<NodeRow> for NodeExecutionRecord {
  fn from(row: NodeRow) -> Self {
    NodeExecutionRecord {
      execution_id: row.execution_id,
      node_id: row.node_id,
      task_name: row.task_name,
      state: row.state,
      attempts: u32::try_from(row.attempts).unwrap_or(0),
      inputs: row.inputs.0,
      outputs: row.outputs.map(|j| j.0),
      error: row.error.map(|j| j.0),
      cache_key: row.cache_key,
      started_at: row.started_at,
      completed_at: row.completed_at,
    }
  }
}

const EXECUTION_COLUMNS: &str = "execution_id, workflow_name, workflow_version, project, domain, state, inputs, outputs, failure, started_at, completed_at";

const NODE_COLUMNS: &str = "execution_id, node_id, task_name, state, attempts, inputs, outputs, error, cache_key, started_at, completed_at";

impl SqliteExecutionStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Create tables if they do not exist.
  pub async fn migrate(&self) -> Result<(), StoreError> {
    sqlx::query(
      r#"
      CREATE TABLE IF NOT EXISTS executions (
        execution_id TEXT PRIMARY KEY NOT NULL,
        workflow_name TEXT NOT NULL,
        workflow_version TEXT NOT NULL,
        project TEXT NOT NULL,
        domain TEXT NOT NULL,
        state TEXT NOT NULL,
        inputs TEXT NOT NULL,
        outputs TEXT,
        failure TEXT,
        started_at TEXT NOT NULL,
        completed_at TEXT
      )
      "#,
    )
    .execute(&self.pool)
    .await?;

    sqlx::query(
      r#"
      CREATE TABLE IF NOT EXISTS node_executions (
        execution_id TEXT NOT NULL REFERENCES executions (execution_id),
        node_id TEXT NOT NULL,
        task_name TEXT NOT NULL,
        state TEXT NOT NULL,
        attempts INTEGER NOT NULL,
        inputs TEXT NOT NULL,
        outputs TEXT,
        error TEXT,
        cache_key TEXT,
        started_at TEXT,
        completed_at TEXT,
        PRIMARY KEY (execution_id, node_id)
      )
      "#,
    )
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn execution_state(&self, execution_id: &str) -> Result<ExecutionState, StoreError> {
    let state: Option<(ExecutionState,)> =
      sqlx::query_as("SELECT state FROM executions WHERE execution_id = ?")
        .bind(execution_id)
        .fetch_optional(&self.pool)
        .await?;
    state
      .map(|(s,)| s)
      .ok_or_else(|| StoreError::NotFound(execution_id.to_string()))
  }

  async fn upsert_node<'e, E>(executor: E, node: &NodeExecutionRecord) -> Result<(), StoreError>
  where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
  {
    sqlx::query(&format!(
      "INSERT OR REPLACE INTO node_executions ({NODE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(&node.execution_id)
    .bind(&node.node_id)
    .bind(&node.task_name)
    .bind(node.state)
    .bind(i64::from(node.attempts))
    .bind(Json(&node.inputs))
    .bind(node.outputs.as_ref().map(Json))
    .bind(node.error.as_ref().map(Json))
    .bind(&node.cache_key)
    .bind(node.started_at)
    .bind(node.completed_at)
    .execute(executor)
    .await?;
    Ok(())
  }
}

#[async_trait]
impl ExecutionStore for SqliteExecutionStore {
  async fn create_execution(&self, execution: &ExecutionRecord) -> Result<(), StoreError> {
    let mut tx = self.pool.begin().await?;

    let result = sqlx::query(&format!(
      "INSERT INTO executions ({EXECUTION_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(&execution.execution_id)
    .bind(&execution.workflow_name)
    .bind(&execution.workflow_version)
    .bind(&execution.scope.project)
    .bind(&execution.scope.domain)
    .bind(execution.state)
    .bind(Json(&execution.inputs))
    .bind(execution.outputs.as_ref().map(Json))
    .bind(execution.failure.as_ref().map(Json))
    .bind(execution.started_at)
    .bind(execution.completed_at)
    .execute(&mut *tx)
    .await;

    if let Err(e) = result {
      let unique = e
        .as_database_error()
        .is_some_and(|db| db.is_unique_violation());
      if unique {
        return Err(StoreError::AlreadyExists(execution.execution_id.clone()));
      }
      return Err(e.into());
    }

    for node in execution.nodes.values() {
      Self::upsert_node(&mut *tx, node).await?;
    }

    tx.commit().await?;
    Ok(())
  }

  async fn update_execution(&self, execution: &ExecutionRecord) -> Result<(), StoreError> {
    let result = sqlx::query(
      r#"
      UPDATE executions
      SET state = ?, outputs = ?, failure = ?, completed_at = ?
      WHERE execution_id = ? AND state = ?
      "#,
    )
    .bind(execution.state)
    .bind(execution.outputs.as_ref().map(Json))
    .bind(execution.failure.as_ref().map(Json))
    .bind(execution.completed_at)
    .bind(&execution.execution_id)
    .bind(ExecutionState::Running)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      // Either missing or already terminal.
      self.execution_state(&execution.execution_id).await?;
      return Err(StoreError::Terminal(execution.execution_id.clone()));
    }
    Ok(())
  }

  async fn put_node(&self, node: &NodeExecutionRecord) -> Result<(), StoreError> {
    if self.execution_state(&node.execution_id).await?.is_terminal() {
      return Err(StoreError::Terminal(node.execution_id.clone()));
    }
    Self::upsert_node(&self.pool, node).await
  }

  async fn get_execution(&self, execution_id: &str) -> Result<ExecutionRecord, StoreError> {
    let row: Option<ExecutionRow> = sqlx::query_as(&format!(
      "SELECT {EXECUTION_COLUMNS} FROM executions WHERE execution_id = ?"
    ))
    .bind(execution_id)
    .fetch_optional(&self.pool)
    .await?;

    let mut execution: ExecutionRecord = row
      .ok_or_else(|| StoreError::NotFound(execution_id.to_string()))?
      .into();
    execution.nodes = self
      .list_nodes(execution_id)
      .await?
      .into_iter()
      .map(|n| (n.node_id.clone(), n))
      .collect();
    Ok(execution)
  }

  async fn get_node(
    &self,
    execution_id: &str,
    node_id: &str,
  ) -> Result<NodeExecutionRecord, StoreError> {
    let row: Option<NodeRow> = sqlx::query_as(&format!(
      "SELECT {NODE_COLUMNS} FROM node_executions WHERE execution_id = ? AND node_id = ?"
    ))
    .bind(execution_id)
    .bind(node_id)
    .fetch_optional(&self.pool)
    .await?;

    row
      .map(Into::into)
      .ok_or_else(|| StoreError::NotFound(format!("{}/{}", execution_id, node_id)))
  }

  async fn list_nodes(&self, execution_id: &str) -> Result<Vec<NodeExecutionRecord>, StoreError> {
    self.execution_state(execution_id).await?;

    let rows: Vec<NodeRow> = sqlx::query_as(&format!(
      "SELECT {NODE_COLUMNS} FROM node_executions WHERE execution_id = ? ORDER BY node_id ASC"
    ))
    .bind(execution_id)
    .fetch_all(&self.pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
  }

  async fn list_executions(
    &self,
    scope: Option<&Scope>,
  ) -> Result<Vec<ExecutionRecord>, StoreError> {
    let rows: Vec<ExecutionRow> = match scope {
      Some(scope) => {
        sqlx::query_as(&format!(
          "SELECT {EXECUTION_COLUMNS} FROM executions WHERE project = ? AND domain = ? ORDER BY started_at DESC, execution_id ASC"
        ))
        .bind(&scope.project)
        .bind(&scope.domain)
        .fetch_all(&self.pool)
        .await?
      }
      None => {
        sqlx::query_as(&format!(
          "SELECT {EXECUTION_COLUMNS} FROM executions ORDER BY started_at DESC, execution_id ASC"
        ))
        .fetch_all(&self.pool)
        .await?
      }
    };

    Ok(rows.into_iter().map(Into::into).collect())
  }
}
