//! Hash methods for blob inputs.
//!
//! By default a blob input contributes its uri to the cache key, so the same
//! content at two locations produces two keys. A task can instead declare that
//! its blob outputs are identified by a named hash method; downstream cache
//! keys then use that method's result.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use strata_literal::Literal;

/// Computes a stable representation of a literal's content.
pub trait HashMethod: Send + Sync {
  fn hash(&self, literal: &Literal) -> Result<String, String>;
}

impl<F> HashMethod for F
where
  F: Fn(&Literal) -> Result<String, String> + Send + Sync,
{
  fn hash(&self, literal: &Literal) -> Result<String, String> {
    self(literal)
  }
}

/// SHA-256 over the content of a local blob.
///
/// Files hash their bytes. Directories hash every file beneath them, in sorted
/// order, together with each file's relative path.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentDigest;

impl ContentDigest {
  /// Name under which [`HashMethodRegistry::with_defaults`] registers this method.
  pub const NAME: &'static str = "sha256";
}

impl HashMethod for ContentDigest {
  fn hash(&self, literal: &Literal) -> Result<String, String> {
    let (blob, multipart) = match literal {
      Literal::Blob(blob) => (blob, false),
      Literal::MultiPartBlob(blob) => (blob, true),
      other => return Err(format!("cannot content-hash a {} literal", other.kind())),
    };
    let path = blob
      .local_path()
      .ok_or_else(|| format!("blob '{}' is not local", blob.uri))?;

    let mut hasher = Sha256::new();
    let result = if multipart {
      hash_dir(&path, &path, &mut hasher)
    } else {
      hash_file(&path, &mut hasher)
    };
    result.map_err(|e| format!("failed to read '{}': {}", path.display(), e))?;
    Ok(format!("{:x}", hasher.finalize()))
  }
}

fn hash_file(path: &Path, hasher: &mut Sha256) -> io::Result<()> {
  let mut file = fs::File::open(path)?;
  io::copy(&mut file, hasher)?;
  Ok(())
}

fn hash_dir(root: &Path, dir: &Path, hasher: &mut Sha256) -> io::Result<()> {
  let mut entries = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
  entries.sort_by_key(|entry| entry.file_name());

  for entry in entries {
    let path = entry.path();
    if entry.file_type()?.is_dir() {
      hash_dir(root, &path, hasher)?;
    } else {
      let relative = path.strip_prefix(root).unwrap_or(&path).to_string_lossy();
      hasher.update(relative.len().to_le_bytes());
      hasher.update(relative.as_bytes());
      let mut file_hasher = Sha256::new();
      hash_file(&path, &mut file_hasher)?;
      hasher.update(file_hasher.finalize());
    }
  }
  Ok(())
}

/// Named hash methods available to the cache key deriver.
#[derive(Clone, Default)]
pub struct HashMethodRegistry {
  methods: HashMap<String, Arc<dyn HashMethod>>,
}

impl HashMethodRegistry {
  /// An empty registry.
  pub fn new() -> Self {
    Self::default()
  }

  /// A registry containing [`ContentDigest`].
  pub fn with_defaults() -> Self {
    let mut registry = Self::new();
    registry.register(ContentDigest::NAME, ContentDigest);
    registry
  }

  /// Register `method` under `name`, replacing any previous method.
  pub fn register(&mut self, name: impl Into<String>, method: impl HashMethod + 'static) {
    self.methods.insert(name.into(), Arc::new(method));
  }

  pub fn get(&self, name: &str) -> Option<&Arc<dyn HashMethod>> {
    self.methods.get(name)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.methods.contains_key(name)
  }
}

impl fmt::Debug for HashMethodRegistry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut names: Vec<&String> = self.methods.keys().collect();
    names.sort();
    f.debug_struct("HashMethodRegistry")
      .field("methods", &names)
      .finish()
  }
}
