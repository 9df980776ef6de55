use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use crate::{Error, Store};

const CONTENT_TYPE: &str = "application/octet-stream";

/// Moves blob data between the local filesystem and a [`Store`].
///
/// Remote references have the form `<scheme>://<key>`. Single-file blobs map
/// to one object; directories map to every object under a key prefix.
#[derive(Clone)]
pub struct BlobTransfer {
  store: Arc<dyn Store>,
  scheme: String,
}

impl BlobTransfer {
  pub fn new(store: Arc<dyn Store>, scheme: impl Into<String>) -> Self {
    Self {
      store,
      scheme: scheme.into(),
    }
  }

  pub fn scheme(&self) -> &str {
    &self.scheme
  }

  /// Remote reference for `key`.
  pub fn reference(&self, key: &str) -> String {
    format!("{}://{}", self.scheme, key.trim_matches('/'))
  }

  /// Whether `uri` refers to this transfer's store.
  pub fn owns(&self, uri: &str) -> bool {
    self.parse_ref(uri).is_ok()
  }

  fn parse_ref<'a>(&self, reference: &'a str) -> Result<&'a str, Error> {
    let invalid = |reason: &str| Error::InvalidRef {
      reference: reference.to_string(),
      reason: reason.to_string(),
    };
    let (scheme, key) = reference
      .split_once("://")
      .ok_or_else(|| invalid("missing scheme"))?;
    if scheme != self.scheme {
      return Err(invalid(&format!("expected scheme '{}'", self.scheme)));
    }
    let key = key.trim_matches('/');
    if key.is_empty() {
      return Err(invalid("empty key"));
    }
    Ok(key)
  }

  /// Upload one local file to `key`. Returns the remote reference.
  pub async fn upload(&self, local_path: &Path, key: &str) -> Result<String, Error> {
    let file = File::open(local_path).await?;
    let stream = ReaderStream::new(file).map(|r| r.map_err(Error::Io));
    self.store.put(key, Box::pin(stream), CONTENT_TYPE).await?;
    Ok(self.reference(key))
  }

  /// Download the object at `reference` into `dest_dir`, keeping its file name.
  pub async fn download(&self, reference: &str, dest_dir: &Path) -> Result<PathBuf, Error> {
    let key = self.parse_ref(reference)?;
    let name = key.rsplit('/').next().unwrap_or(key);
    let dest = dest_dir.join(name);
    self.fetch(key, &dest).await?;
    Ok(dest)
  }

  /// Upload every file beneath `local_dir` under the `key` prefix.
  ///
  /// If any file fails, the objects already written for this directory are
  /// deleted before the error is returned.
  pub async fn upload_dir(&self, local_dir: &Path, key: &str) -> Result<String, Error> {
    let prefix = key.trim_matches('/');
    let mut uploaded = Vec::new();
    if let Err(e) = self.upload_tree(local_dir, prefix, &mut uploaded).await {
      for key in &uploaded {
        let _ = self.store.delete(key).await;
      }
      return Err(e);
    }
    Ok(self.reference(prefix))
  }

  async fn upload_tree(
    &self,
    local_dir: &Path,
    prefix: &str,
    uploaded: &mut Vec<String>,
  ) -> Result<(), Error> {
    let mut pending = vec![local_dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
      let mut entries = fs::read_dir(&dir).await?;
      while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_dir() {
          pending.push(path);
          continue;
        }
        let relative = path.strip_prefix(local_dir).unwrap_or(&path);
        let parts: Vec<String> = relative
          .components()
          .map(|c| c.as_os_str().to_string_lossy().into_owned())
          .collect();
        let key = format!("{}/{}", prefix, parts.join("/"));
        self.upload(&path, &key).await?;
        uploaded.push(key);
      }
    }
    Ok(())
  }

  /// Download every object under `reference` into a directory named after
  /// the last segment of its key, inside `dest_dir`.
  pub async fn download_dir(&self, reference: &str, dest_dir: &Path) -> Result<PathBuf, Error> {
    let prefix = self.parse_ref(reference)?;
    let name = prefix.rsplit('/').next().unwrap_or(prefix);
    let root = dest_dir.join(name);
    fs::create_dir_all(&root).await?;

    for key in self.store.list(prefix).await? {
      let Some(relative) = key
        .strip_prefix(prefix)
        .map(|rest| rest.trim_start_matches('/'))
      else {
        continue;
      };
      if relative.is_empty() {
        continue;
      }
      self.fetch(&key, &root.join(relative)).await?;
    }
    Ok(root)
  }

  async fn fetch(&self, key: &str, dest: &Path) -> Result<(), Error> {
    if let Some(parent) = dest.parent() {
      fs::create_dir_all(parent).await?;
    }
    let mut stream = self.store.get(key).await?;
    let mut file = File::create(dest).await?;
    while let Some(chunk) = stream.next().await {
      file.write_all(&chunk?).await?;
    }
    file.flush().await?;
    Ok(())
  }
}

impl std::fmt::Debug for BlobTransfer {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("BlobTransfer")
      .field("scheme", &self.scheme)
      .finish_non_exhaustive()
  }
}
