use serde::{Deserialize, Serialize};
use strata_literal::Literal;

/// Where a node input gets its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Binding {
  /// A constant.
  Literal { value: Literal },
  /// A workflow-level input supplied at launch.
  WorkflowInput { name: String },
  /// An output of an upstream node. Creates a data edge.
  NodeOutput { node_id: String, output: String },
}

impl Binding {
  pub fn literal(value: impl Into<Literal>) -> Self {
    Binding::Literal {
      value: value.into(),
    }
  }

  pub fn input(name: impl Into<String>) -> Self {
    Binding::WorkflowInput { name: name.into() }
  }

  pub fn output(node_id: impl Into<String>, output: impl Into<String>) -> Self {
    Binding::NodeOutput {
      node_id: node_id.into(),
      output: output.into(),
    }
  }

  /// The upstream node this binding depends on, if any.
  pub fn upstream(&self) -> Option<&str> {
    match self {
      Binding::NodeOutput { node_id, .. } => Some(node_id),
      _ => None,
    }
  }
}

impl From<Literal> for Binding {
  fn from(value: Literal) -> Self {
    Binding::Literal { value }
  }
}
