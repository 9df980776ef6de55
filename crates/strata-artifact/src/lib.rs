//! Strata Artifact
//!
//! This crate provides the blob storage trait and implementations for Strata.
//! Blob literals never carry inline data; their bytes live in a [`Store`] and
//! the literal holds a `<scheme>://<key>` reference.
//!
//! The [`Store`] trait defines the backend layer (filesystem, object store).
//! [`BlobTransfer`] sits on top of a store and moves local files and
//! directories in and out of it, translating between local paths and remote
//! references.

mod fs;
mod transfer;

pub use fs::FsStore;
pub use transfer::BlobTransfer;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

/// A boxed stream of bytes for blob data.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send>>;

/// Error type for blob storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested object was not found.
  #[error("object not found: {0}")]
  NotFound(String),

  /// The key is empty or escapes the store root.
  #[error("invalid key: {0}")]
  InvalidKey(String),

  /// The reference is not a `<scheme>://<key>` string for this store.
  #[error("invalid blob reference '{reference}': {reason}")]
  InvalidRef { reference: String, reason: String },

  /// An I/O error occurred.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Blob storage trait.
///
/// Keys are `/`-separated relative paths. A multi-part blob is stored as many
/// objects sharing a key prefix.
#[async_trait]
pub trait Store: Send + Sync {
  /// Retrieve an object by key.
  async fn get(&self, key: &str) -> Result<ByteStream, Error>;

  /// Store an object, replacing any existing one.
  ///
  /// Accepts a stream of bytes for efficient handling of large files.
  async fn put(&self, key: &str, data: ByteStream, content_type: &str) -> Result<(), Error>;

  /// Delete an object by key.
  async fn delete(&self, key: &str) -> Result<(), Error>;

  /// Keys of every object under `prefix`, sorted.
  async fn list(&self, prefix: &str) -> Result<Vec<String>, Error>;
}
