use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::CacheError;
use crate::key::CacheKey;
use crate::store::{CacheStore, CachedOutputs};

/// Process-local cache. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCacheStore {
  entries: Arc<RwLock<HashMap<String, CachedOutputs>>>,
}

impl InMemoryCacheStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn len(&self) -> usize {
    self.entries.read().await.len()
  }

  pub async fn is_empty(&self) -> bool {
    self.entries.read().await.is_empty()
  }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
  async fn get(&self, key: &CacheKey) -> Result<Option<CachedOutputs>, CacheError> {
    Ok(self.entries.read().await.get(&key.encoded()).cloned())
  }

  async fn put(&self, key: &CacheKey, outputs: &CachedOutputs) -> Result<(), CacheError> {
    self
      .entries
      .write()
      .await
      .insert(key.encoded(), outputs.clone());
    Ok(())
  }

  async fn clear(&self) -> Result<(), CacheError> {
    self.entries.write().await.clear();
    Ok(())
  }
}
