use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::enums::{CacheBackend, StoreBackend};
use crate::retry::RetryPolicy;
use crate::scope::Scope;

/// Errors produced while loading settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("failed to read settings file '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse settings: {0}")]
  Parse(#[from] serde_json::Error),

  #[error("invalid settings: {0}")]
  Invalid(String),
}

/// Engine settings.
///
/// # Example
///
/// ```json
/// {
///   "scope": { "project": "snacks", "domain": "development" },
///   "max_parallelism": 4,
///   "retry": { "max_retries": 2, "backoff": "linear", "initial_delay_ms": 500 },
///   "default_timeout_ms": 60000,
///   "cache": "local",
///   "store": "sqlite"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
  /// Root for local state. Callers fall back to `~/.strata` when unset.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub data_dir: Option<PathBuf>,
  #[serde(default)]
  pub scope: Scope,
  /// Maximum number of nodes running at once within one execution.
  #[serde(default = "default_parallelism")]
  pub max_parallelism: usize,
  /// Retry policy for tasks that do not declare their own budget.
  #[serde(default)]
  pub retry: RetryPolicy,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub default_timeout_ms: Option<u64>,
  #[serde(default = "default_cache")]
  pub cache: CacheBackend,
  #[serde(default = "default_store")]
  pub store: StoreBackend,
}

fn default_parallelism() -> usize {
  8
}

fn default_cache() -> CacheBackend {
  CacheBackend::Local
}

fn default_store() -> StoreBackend {
  StoreBackend::Sqlite
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      data_dir: None,
      scope: Scope::default(),
      max_parallelism: default_parallelism(),
      retry: RetryPolicy::default(),
      default_timeout_ms: None,
      cache: default_cache(),
      store: default_store(),
    }
  }
}

impl Settings {
  /// Parse settings from a JSON string.
  pub fn from_json(json: &str) -> Result<Self, ConfigError> {
    let settings: Settings = serde_json::from_str(json)?;
    settings.validate()?;
    Ok(settings)
  }

  /// Load settings from a JSON file.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_json(&content)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.max_parallelism == 0 {
      return Err(ConfigError::Invalid(
        "max_parallelism must be at least 1".to_string(),
      ));
    }
    if self.scope.project.is_empty() || self.scope.domain.is_empty() {
      return Err(ConfigError::Invalid(
        "scope project and domain must not be empty".to_string(),
      ));
    }
    Ok(())
  }

  /// Directory used by the local cache backend.
  pub fn local_cache_dir(&self, data_dir: &Path) -> PathBuf {
    data_dir.join("local-cache")
  }
}
