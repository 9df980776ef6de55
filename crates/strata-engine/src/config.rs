use std::path::PathBuf;
use std::time::Duration;

use strata_config::{RetryPolicy, Scope, Settings};

/// Configuration for the execution engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
  /// Partition for cache keys and execution records.
  pub scope: Scope,
  /// Maximum number of nodes running at once within one execution. Values
  /// below one are treated as one.
  pub max_parallelism: usize,
  /// Retry policy for nodes whose task and node declare no budget.
  pub retry: RetryPolicy,
  /// Attempt timeout for nodes whose task and node declare none.
  pub default_timeout: Option<Duration>,
  /// Parent directory for per-execution working directories. Defaults to the
  /// system temp directory.
  pub work_root: Option<PathBuf>,
  /// Where blob outputs written to a working directory are kept when no blob
  /// transfer is configured. Defaults to `strata-outputs` in the system temp
  /// directory.
  pub output_root: Option<PathBuf>,
}

impl EngineConfig {
  pub fn from_settings(settings: &Settings) -> Self {
    Self {
      scope: settings.scope.clone(),
      max_parallelism: settings.max_parallelism.max(1),
      retry: settings.retry,
      default_timeout: settings.default_timeout_ms.map(Duration::from_millis),
      work_root: None,
      output_root: settings.data_dir.as_ref().map(|dir| dir.join("outputs")),
    }
  }

  pub(crate) fn output_root(&self) -> PathBuf {
    self
      .output_root
      .clone()
      .unwrap_or_else(|| std::env::temp_dir().join("strata-outputs"))
  }

  pub fn with_scope(mut self, scope: Scope) -> Self {
    self.scope = scope;
    self
  }

  pub fn with_max_parallelism(mut self, max_parallelism: usize) -> Self {
    self.max_parallelism = max_parallelism.max(1);
    self
  }

  pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  pub fn with_output_root(mut self, root: impl Into<PathBuf>) -> Self {
    self.output_root = Some(root.into());
    self
  }

  pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
    self.default_timeout = Some(timeout);
    self
  }
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self::from_settings(&Settings::default())
  }
}
