use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strata_config::Scope;

/// Fingerprint of one task invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
  pub scope: Scope,
  pub cache_version: String,
  pub signature_hash: String,
  pub inputs_hash: String,
}

impl CacheKey {
  /// Opaque storage identifier covering every part of the key.
  pub fn encoded(&self) -> String {
    let mut hasher = Sha256::new();
    for part in [
      &self.scope.project,
      &self.scope.domain,
      &self.cache_version,
      &self.signature_hash,
      &self.inputs_hash,
    ] {
      hasher.update(part.len().to_le_bytes());
      hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.encoded())
  }
}
