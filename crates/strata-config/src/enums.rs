use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryBackoff {
  Constant,
  Linear,
  Exponential,
}

/// Which cache store backs task memoization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
  /// Process-local, lost on exit.
  Memory,
  /// One file per entry under `{data_dir}/local-cache`.
  Local,
  /// Shared SQLite database at `{data_dir}/cache.db`.
  Sqlite,
}

/// Which store holds execution records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
  Memory,
  Sqlite,
}
