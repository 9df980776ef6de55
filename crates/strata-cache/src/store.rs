use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strata_literal::LiteralMap;

use crate::error::CacheError;
use crate::key::CacheKey;

/// Outputs memoized for one cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedOutputs {
  pub task_name: String,
  pub outputs: LiteralMap,
  pub created_at: DateTime<Utc>,
}

impl CachedOutputs {
  pub fn new(task_name: impl Into<String>, outputs: LiteralMap) -> Self {
    Self {
      task_name: task_name.into(),
      outputs,
      created_at: Utc::now(),
    }
  }
}

/// Storage for memoized task outputs.
///
/// Writes for the same key are last-write-wins. Readers never observe a
/// partially written entry.
#[async_trait]
pub trait CacheStore: Send + Sync {
  /// Look up `key`. `Ok(None)` is a miss.
  async fn get(&self, key: &CacheKey) -> Result<Option<CachedOutputs>, CacheError>;

  /// Store `outputs` under `key`, replacing any existing entry.
  async fn put(&self, key: &CacheKey, outputs: &CachedOutputs) -> Result<(), CacheError>;

  /// Remove every entry.
  async fn clear(&self) -> Result<(), CacheError>;
}
