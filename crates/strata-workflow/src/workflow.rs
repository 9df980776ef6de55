use std::collections::{BTreeMap, HashMap};

use strata_literal::{LiteralMap, TypeMismatch};
use strata_task::{TaskInterface, Variable};

use crate::binding::Binding;
use crate::builder::WorkflowBuilder;
use crate::graph::Graph;
use crate::node::Node;

/// A validated workflow ready for execution.
#[derive(Debug, Clone)]
pub struct Workflow {
  pub(crate) name: String,
  pub(crate) version: String,
  pub(crate) inputs: Vec<Variable>,
  pub(crate) nodes: Vec<Node>,
  pub(crate) index: HashMap<String, usize>,
  pub(crate) outputs: BTreeMap<String, Binding>,
  pub(crate) graph: Graph,
}

impl Workflow {
  pub fn builder(name: impl Into<String>) -> WorkflowBuilder {
    WorkflowBuilder::new(name)
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn version(&self) -> &str {
    &self.version
  }

  /// Declared workflow inputs.
  pub fn inputs(&self) -> &[Variable] {
    &self.inputs
  }

  /// Nodes in declaration order.
  pub fn nodes(&self) -> &[Node] {
    &self.nodes
  }

  /// Get a node by ID.
  pub fn get_node(&self, node_id: &str) -> Option<&Node> {
    self.index.get(node_id).map(|i| &self.nodes[*i])
  }

  /// Workflow outputs, each bound to a node output.
  pub fn outputs(&self) -> &BTreeMap<String, Binding> {
    &self.outputs
  }

  /// The graph structure for traversal.
  pub fn graph(&self) -> &Graph {
    &self.graph
  }

  /// Check launch inputs against the declared workflow inputs.
  pub fn validate_inputs(&self, inputs: &LiteralMap) -> Result<(), TypeMismatch> {
    let interface = TaskInterface {
      inputs: self.inputs.clone(),
      outputs: Vec::new(),
    };
    interface.validate_inputs(inputs)
  }
}
