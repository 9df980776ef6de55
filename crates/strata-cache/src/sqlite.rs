use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::types::Json;
use strata_literal::LiteralMap;

use crate::error::CacheError;
use crate::key::CacheKey;
use crate::store::{CacheStore, CachedOutputs};

/// SQLite-backed cache shared between processes.
#[derive(Debug, Clone)]
pub struct SqliteCacheStore {
  pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct CacheRow {
  task_name: String,
  outputs: Json<LiteralMap>,
  created_at: DateTime<Utc>,
}

impl SqliteCacheStore {
  /// Create a new SQLite cache with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Create the cache table if it does not exist.
  pub async fn migrate(&self) -> Result<(), CacheError> {
    sqlx::query(
      r#"
      CREATE TABLE IF NOT EXISTS cache_entries (
        project TEXT NOT NULL,
        domain TEXT NOT NULL,
        cache_key TEXT NOT NULL,
        task_name TEXT NOT NULL,
        outputs TEXT NOT NULL,
        created_at TEXT NOT NULL,
        PRIMARY KEY (project, domain, cache_key)
      )
      "#,
    )
    .execute(&self.pool)
    .await?;

    Ok(())
  }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
  async fn get(&self, key: &CacheKey) -> Result<Option<CachedOutputs>, CacheError> {
    let row: Option<CacheRow> = sqlx::query_as(
      r#"
      SELECT task_name, outputs, created_at
      FROM cache_entries
      WHERE project = ? AND domain = ? AND cache_key = ?
      "#,
    )
    .bind(&key.scope.project)
    .bind(&key.scope.domain)
    .bind(key.encoded())
    .fetch_optional(&self.pool)
    .await?;

    Ok(row.map(|row| CachedOutputs {
      task_name: row.task_name,
      outputs: row.outputs.0,
      created_at: row.created_at,
    }))
  }

  async fn put(&self, key: &CacheKey, outputs: &CachedOutputs) -> Result<(), CacheError> {
    sqlx::query(
      r#"
      INSERT OR REPLACE INTO cache_entries (project, domain, cache_key, task_name, outputs, created_at)
      VALUES (?, ?, ?, ?, ?, ?)
      "#,
    )
    .bind(&key.scope.project)
    .bind(&key.scope.domain)
    .bind(key.encoded())
    .bind(&outputs.task_name)
    .bind(Json(&outputs.outputs))
    .bind(outputs.created_at)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn clear(&self) -> Result<(), CacheError> {
    sqlx::query("DELETE FROM cache_entries")
      .execute(&self.pool)
      .await?;
    Ok(())
  }
}
