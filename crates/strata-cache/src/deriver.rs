use sha2::{Digest, Sha256};
use strata_config::Scope;
use strata_literal::{Blob, Literal, LiteralMap};
use strata_task::{Task, Variable};

use crate::error::CacheKeyError;
use crate::hash::HashMethodRegistry;
use crate::key::CacheKey;

/// Derives cache keys for task invocations.
///
/// Pure apart from registered hash methods, which may read blob content.
#[derive(Debug, Clone)]
pub struct CacheKeyDeriver {
  hash_methods: HashMethodRegistry,
}

impl CacheKeyDeriver {
  pub fn new(hash_methods: HashMethodRegistry) -> Self {
    Self { hash_methods }
  }

  pub fn hash_methods(&self) -> &HashMethodRegistry {
    &self.hash_methods
  }

  /// Fingerprint `task` invoked with `inputs` in `scope`.
  pub fn derive_key(
    &self,
    task: &Task,
    inputs: &LiteralMap,
    scope: &Scope,
  ) -> Result<CacheKey, CacheKeyError> {
    let policy = task.cache_policy();
    if !policy.enabled {
      return Err(CacheKeyError::CachingDisabled {
        task: task.name().to_string(),
      });
    }

    Ok(CacheKey {
      scope: scope.clone(),
      cache_version: policy.version.clone(),
      signature_hash: Self::signature_hash(task),
      inputs_hash: self.inputs_hash(task, inputs)?,
    })
  }

  /// Hash of the task name and its ordered, typed interface.
  ///
  /// Hash method annotations are not part of the signature.
  pub fn signature_hash(task: &Task) -> String {
    let interface = task.interface();
    let mut hasher = Sha256::new();
    update_field(&mut hasher, task.name());
    for (tag, vars) in [("in", &interface.inputs), ("out", &interface.outputs)] {
      update_field(&mut hasher, &format!("{tag}:{}", vars.len()));
      for Variable {
        name, literal_type, ..
      } in vars
      {
        update_field(&mut hasher, name);
        update_field(&mut hasher, &literal_type.to_string());
      }
    }
    format!("{:x}", hasher.finalize())
  }

  fn inputs_hash(&self, task: &Task, inputs: &LiteralMap) -> Result<String, CacheKeyError> {
    let mut hasher = Sha256::new();
    for var in &task.interface().inputs {
      let value = inputs
        .get(&var.name)
        .ok_or_else(|| CacheKeyError::MissingInput {
          task: task.name().to_string(),
          input: var.name.clone(),
        })?;
      update_field(&mut hasher, &var.name);
      update_field(&mut hasher, &self.represent(&var.name, value)?);
    }
    Ok(format!("{:x}", hasher.finalize()))
  }

  fn represent(&self, input: &str, value: &Literal) -> Result<String, CacheKeyError> {
    value.canonical_with(&mut |blob: &Blob, multipart: bool| {
      let Some(method_name) = &blob.hash_method else {
        return Ok(blob.uri.clone());
      };
      let method =
        self
          .hash_methods
          .get(method_name)
          .ok_or_else(|| CacheKeyError::UnknownHashMethod {
            input: input.to_string(),
            method: method_name.clone(),
          })?;
      if let Some(digest) = &blob.digest {
        return Ok(format!("{method_name}:{digest}"));
      }
      let literal = if multipart {
        Literal::MultiPartBlob(blob.clone())
      } else {
        Literal::Blob(blob.clone())
      };
      method
        .hash(&literal)
        .map(|digest| format!("{method_name}:{digest}"))
        .map_err(|message| CacheKeyError::HashFailed {
          input: input.to_string(),
          method: method_name.clone(),
          message,
        })
    })
  }
}

impl Default for CacheKeyDeriver {
  fn default() -> Self {
    Self::new(HashMethodRegistry::with_defaults())
  }
}

fn update_field(hasher: &mut Sha256, value: &str) {
  hasher.update(value.len().to_le_bytes());
  hasher.update(value.as_bytes());
}
