use strata_literal::TypeMismatch;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
  #[error("workflow name must not be empty")]
  EmptyName,

  #[error("workflow '{0}' has no nodes")]
  NoNodes(String),

  #[error("duplicate node id: {0}")]
  DuplicateNode(String),

  #[error("duplicate workflow input: {0}")]
  DuplicateInput(String),

  #[error("node not found: {0}")]
  NodeNotFound(String),

  #[error("node '{node}' references unknown workflow input '{input}'")]
  UnknownInput { node: String, input: String },

  #[error("node '{node}' references unknown output '{output}' of node '{upstream}'")]
  UnknownOutput {
    node: String,
    upstream: String,
    output: String,
  },

  #[error("node '{node}' does not bind input '{input}'")]
  MissingBinding { node: String, input: String },

  #[error("node '{node}' binds '{input}', which task '{task}' does not declare")]
  ExtraBinding {
    node: String,
    task: String,
    input: String,
  },

  #[error("node '{node}' input '{input}' expects {expected}, but is bound to {actual}")]
  TypeMismatch {
    node: String,
    input: String,
    expected: String,
    actual: String,
  },

  #[error("node '{node}' input '{input}' is bound to an invalid literal: {source}")]
  InvalidLiteral {
    node: String,
    input: String,
    #[source]
    source: TypeMismatch,
  },

  #[error("workflow output '{output}' is bound to a literal or workflow input; bind it to a node output")]
  InvalidOutput { output: String },

  #[error("cycle detected among nodes: {}", nodes.join(", "))]
  Cycle { nodes: Vec<String> },

  #[error("launch plan '{plan}' presets '{input}', which the workflow does not declare")]
  UnknownLaunchInput { plan: String, input: String },

  #[error("launch plan '{plan}' presets an invalid value for '{input}': {source}")]
  InvalidLaunchInput {
    plan: String,
    input: String,
    #[source]
    source: TypeMismatch,
  },

  #[error("launch plan '{plan}' declares '{input}' as both a default and a fixed input")]
  ConflictingLaunchInput { plan: String, input: String },

  #[error("input '{input}' is fixed by launch plan '{plan}' and cannot be overridden")]
  FixedInputOverride { plan: String, input: String },
}
