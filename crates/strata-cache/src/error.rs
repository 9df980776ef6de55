/// Errors from deriving a cache key.
#[derive(Debug, thiserror::Error)]
pub enum CacheKeyError {
  #[error("caching is disabled for task '{task}'")]
  CachingDisabled { task: String },

  #[error("task '{task}' input '{input}' has no value")]
  MissingInput { task: String, input: String },

  #[error("input '{input}' names hash method '{method}', which is not registered")]
  UnknownHashMethod { input: String, method: String },

  #[error("hash method '{method}' failed for input '{input}': {message}")]
  HashFailed {
    input: String,
    method: String,
    message: String,
  },
}

/// Errors from a cache backend.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
  #[error("cache io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("cache serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("cache database error: {0}")]
  Database(#[from] sqlx::Error),

  #[error("corrupt cache entry '{key}': {message}")]
  Corrupt { key: String, message: String },
}
