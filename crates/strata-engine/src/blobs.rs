//! Blob handling at node boundaries.
//!
//! Outputs get their declared hash method stamped and digested while the data
//! is still local, then local blobs are uploaded through the configured
//! [`BlobTransfer`]. Without a transfer, blobs written inside the execution's
//! working directory are copied to [`LocalOutputs`] so they outlive it.
//! Inputs that reference the transfer's store are fetched into the node's
//! working directory before the body runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use strata_artifact::{BlobTransfer, Error as TransferError, FsStore};
use strata_cache::HashMethodRegistry;
use strata_literal::{Blob, Literal, LiteralMap};
use strata_task::TaskInterface;

/// Stamp declared hash methods onto blob outputs and compute their digests.
///
/// Runs the hash methods, which may read file content. Call from a blocking
/// context.
pub(crate) fn stamp_hash_methods(
  interface: &TaskInterface,
  registry: &HashMethodRegistry,
  outputs: &mut LiteralMap,
) -> Result<(), String> {
  for var in &interface.outputs {
    let Some(method_name) = &var.hash_method else {
      continue;
    };
    let Some(literal) = outputs.get_mut(&var.name) else {
      continue;
    };
    let method = registry
      .get(method_name)
      .ok_or_else(|| format!("unknown hash method '{method_name}' for output '{}'", var.name))?;

    let mut failure = None;
    literal.blobs_mut(&mut |blob, multipart| {
      if failure.is_some() {
        return;
      }
      blob.hash_method = Some(method_name.clone());
      let subject = if multipart {
        Literal::MultiPartBlob(blob.clone())
      } else {
        Literal::Blob(blob.clone())
      };
      match method.hash(&subject) {
        Ok(digest) => blob.digest = Some(digest),
        Err(message) => {
          failure = Some(format!(
            "hash method '{method_name}' failed for output '{}': {message}",
            var.name
          ))
        }
      }
    });
    if let Some(message) = failure {
      return Err(message);
    }
  }
  Ok(())
}

/// Durable local directory for blob outputs when no transfer is configured.
pub(crate) struct LocalOutputs {
  root: PathBuf,
  transfer: BlobTransfer,
}

impl LocalOutputs {
  pub fn new(root: PathBuf) -> Self {
    let transfer = BlobTransfer::new(Arc::new(FsStore::new(&root)), "local");
    Self { root, transfer }
  }
}

/// Upload every local blob in `outputs` and rewrite its uri to the remote
/// reference.
///
/// Keys are `<execution>/<node>/<output>/<index>/<file name>`.
pub(crate) async fn upload_outputs(
  transfer: &BlobTransfer,
  execution_id: &str,
  node_id: &str,
  outputs: &mut LiteralMap,
) -> Result<(), TransferError> {
  let keys = OutputKeys {
    execution_id,
    node_id,
  };
  relocate(transfer, &keys, outputs, &|_| true, &|reference, _| reference).await
}

/// Copy blobs produced inside `work_dir` under `local.root` and rewrite their
/// uris to the copies. Blobs elsewhere are left untouched.
pub(crate) async fn persist_outputs(
  local: &LocalOutputs,
  work_dir: &Path,
  execution_id: &str,
  node_id: &str,
  outputs: &mut LiteralMap,
) -> Result<(), TransferError> {
  let keys = OutputKeys {
    execution_id,
    node_id,
  };
  relocate(
    &local.transfer,
    &keys,
    outputs,
    &|path| path.starts_with(work_dir),
    &|_, key| local.root.join(key).to_string_lossy().into_owned(),
  )
  .await
}

struct OutputKeys<'a> {
  execution_id: &'a str,
  node_id: &'a str,
}

/// Store the selected local blobs through `transfer` and rewrite their uris
/// with `rewrite(reference, key)`.
async fn relocate(
  transfer: &BlobTransfer,
  keys: &OutputKeys<'_>,
  outputs: &mut LiteralMap,
  select: &(dyn Fn(&Path) -> bool + Sync),
  rewrite: &(dyn Fn(String, &str) -> String + Sync),
) -> Result<(), TransferError> {
  let selected = |blob: &Blob| blob.local_path().filter(|path| select(path));
  for (name, literal) in outputs.iter_mut() {
    let mut local: Vec<(PathBuf, bool)> = Vec::new();
    literal.blobs_mut(&mut |blob, multipart| {
      if let Some(path) = selected(blob) {
        local.push((path, multipart));
      }
    });
    if local.is_empty() {
      continue;
    }

    let mut references = Vec::with_capacity(local.len());
    for (index, (path, multipart)) in local.into_iter().enumerate() {
      let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "data".to_string());
      let key = format!(
        "{}/{}/{name}/{index}/{file_name}",
        keys.execution_id, keys.node_id
      );
      let reference = if multipart {
        transfer.upload_dir(&path, &key).await?
      } else {
        transfer.upload(&path, &key).await?
      };
      references.push(rewrite(reference, &key));
    }

    let mut references = references.into_iter();
    literal.blobs_mut(&mut |blob, _| {
      if selected(blob).is_some() {
        if let Some(reference) = references.next() {
          blob.uri = reference;
        }
      }
    });
  }
  Ok(())
}

/// Fetch every blob in `inputs` owned by `transfer` into `dest_dir` and
/// rewrite its uri to the local path.
pub(crate) async fn download_inputs(
  transfer: &BlobTransfer,
  inputs: &mut LiteralMap,
  dest_dir: &Path,
) -> Result<(), TransferError> {
  for (name, literal) in inputs.iter_mut() {
    let mut remote: Vec<(String, bool)> = Vec::new();
    literal.blobs_mut(&mut |blob, multipart| {
      if transfer.owns(&blob.uri) {
        remote.push((blob.uri.clone(), multipart));
      }
    });
    if remote.is_empty() {
      continue;
    }

    let mut paths = Vec::with_capacity(remote.len());
    for (index, (reference, multipart)) in remote.into_iter().enumerate() {
      let dest = dest_dir.join(name).join(index.to_string());
      let path = if multipart {
        transfer.download_dir(&reference, &dest).await?
      } else {
        transfer.download(&reference, &dest).await?
      };
      paths.push(path);
    }

    let mut paths = paths.into_iter();
    literal.blobs_mut(&mut |blob, _| {
      if transfer.owns(&blob.uri) {
        if let Some(path) = paths.next() {
          blob.uri = path.to_string_lossy().into_owned();
        }
      }
    });
  }
  Ok(())
}

/// First local blob in `outputs` whose file or directory no longer exists.
pub(crate) async fn missing_local_blob(outputs: &LiteralMap) -> Option<PathBuf> {
  let mut paths = Vec::new();
  for literal in outputs.values() {
    let mut literal = literal.clone();
    literal.blobs_mut(&mut |blob, _| paths.extend(blob.local_path()));
  }
  for path in paths {
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
      return Some(path);
    }
  }
  None
}
