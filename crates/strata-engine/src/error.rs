//! Engine errors.
//!
//! These are execution-level failures. A node failing is not an engine error:
//! it is recorded on the node and summarised on the execution record.

use strata_literal::TypeMismatch;
use strata_store::StoreError;
use strata_task::DefinitionError;
use strata_workflow::WorkflowError;

/// Errors that can occur while launching or awaiting an execution.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
  /// Launch inputs do not match the workflow's declared inputs.
  #[error("invalid inputs for workflow '{workflow}': {source}")]
  InvalidInputs {
    workflow: String,
    #[source]
    source: TypeMismatch,
  },

  /// A single-task execution could not be assembled.
  #[error("invalid workflow: {0}")]
  InvalidWorkflow(#[from] WorkflowError),

  /// A task definition could not be assembled.
  #[error("invalid task: {0}")]
  InvalidTask(#[from] DefinitionError),

  /// The requested execution name is not usable as an id.
  #[error("invalid execution name: '{0}'")]
  InvalidExecutionName(String),

  /// The execution record could not be created, e.g. because the execution
  /// name is already taken.
  #[error("execution store error: {0}")]
  Store(#[from] StoreError),

  /// The execution's working directory could not be created.
  #[error("failed to create working directory: {0}")]
  WorkingDir(#[source] std::io::Error),

  /// The scheduler task ended abnormally.
  #[error("execution '{execution_id}' terminated abnormally: {message}")]
  Terminated {
    execution_id: String,
    message: String,
  },
}
