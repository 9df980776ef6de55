//! Task errors.

/// Failure reported by a task body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
  /// The attempt failed; the engine may retry it.
  #[error("{0}")]
  Failed(String),

  /// The attempt failed in a way retrying cannot fix.
  #[error("non-recoverable: {0}")]
  NonRecoverable(String),
}

impl TaskError {
  pub fn failed(message: impl Into<String>) -> Self {
    TaskError::Failed(message.into())
  }

  pub fn non_recoverable(message: impl Into<String>) -> Self {
    TaskError::NonRecoverable(message.into())
  }

  pub fn is_retryable(&self) -> bool {
    matches!(self, TaskError::Failed(_))
  }
}

/// Errors that can occur while building a task definition.
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
  #[error("task name must not be empty")]
  EmptyName,

  #[error("task '{task}' declares variable '{name}' more than once")]
  DuplicateVariable { task: String, name: String },

  #[error("task '{task}' has no body")]
  MissingBody { task: String },

  #[error("task '{task}' enables caching with an empty cache version")]
  EmptyCacheVersion { task: String },

  #[error("task '{task}' output '{output}' has a hash method but is not a blob")]
  HashMethodOnNonBlob { task: String, output: String },
}
