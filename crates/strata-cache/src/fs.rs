use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::error::CacheError;
use crate::key::CacheKey;
use crate::store::{CacheStore, CachedOutputs};

/// Cache backed by a local directory, one JSON file per key.
///
/// Entries are written to a temporary file and renamed into place, so a
/// reader sees either the previous entry or the new one.
#[derive(Debug, Clone)]
pub struct FsCacheStore {
  root: PathBuf,
}

impl FsCacheStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn entry_path(&self, encoded: &str) -> PathBuf {
    self.root.join(format!("{}.json", encoded))
  }
}

#[async_trait]
impl CacheStore for FsCacheStore {
  async fn get(&self, key: &CacheKey) -> Result<Option<CachedOutputs>, CacheError> {
    let encoded = key.encoded();
    let data = match fs::read(self.entry_path(&encoded)).await {
      Ok(data) => data,
      Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(e.into()),
    };

    serde_json::from_slice(&data)
      .map(Some)
      .map_err(|e| CacheError::Corrupt {
        key: encoded,
        message: e.to_string(),
      })
  }

  async fn put(&self, key: &CacheKey, outputs: &CachedOutputs) -> Result<(), CacheError> {
    fs::create_dir_all(&self.root).await?;

    let encoded = key.encoded();
    let tmp = self
      .root
      .join(format!(".{}.{}.tmp", encoded, uuid::Uuid::new_v4()));
    let data = serde_json::to_vec(outputs)?;

    fs::write(&tmp, &data).await?;
    if let Err(e) = fs::rename(&tmp, self.entry_path(&encoded)).await {
      let _ = fs::remove_file(&tmp).await;
      return Err(e.into());
    }
    Ok(())
  }

  async fn clear(&self) -> Result<(), CacheError> {
    let mut entries = match fs::read_dir(&self.root).await {
      Ok(entries) => entries,
      Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
      Err(e) => return Err(e.into()),
    };

    let mut removed = 0usize;
    while let Some(entry) = entries.next_entry().await? {
      let path = entry.path();
      let is_entry = path
        .extension()
        .is_some_and(|ext| ext == "json" || ext == "tmp");
      if is_entry && entry.file_type().await?.is_file() {
        fs::remove_file(&path).await?;
        removed += 1;
      }
    }
    debug!(root = %self.root.display(), removed, "local_cache_cleared");
    Ok(())
  }
}
