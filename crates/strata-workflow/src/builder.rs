use std::collections::{BTreeMap, HashMap, HashSet};

use strata_literal::LiteralType;
use strata_task::Variable;

use crate::binding::Binding;
use crate::error::WorkflowError;
use crate::graph::Graph;
use crate::node::Node;
use crate::workflow::Workflow;

/// Assembles and validates a [`Workflow`].
///
/// ```ignore
/// let workflow = WorkflowBuilder::new("squares")
///   .input("n", LiteralType::Integer)
///   .node(Node::new("first", &square).bind("n", Binding::input("n")))
///   .node(Node::new("second", &square).bind("n", Binding::output("first", "o0")))
///   .output("result", Binding::output("second", "o0"))
///   .build()?;
/// ```
pub struct WorkflowBuilder {
  name: String,
  version: String,
  inputs: Vec<Variable>,
  nodes: Vec<Node>,
  outputs: BTreeMap<String, Binding>,
}

impl WorkflowBuilder {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      version: "latest".to_string(),
      inputs: Vec::new(),
      nodes: Vec::new(),
      outputs: BTreeMap::new(),
    }
  }

  pub fn version(mut self, version: impl Into<String>) -> Self {
    self.version = version.into();
    self
  }

  pub fn input(mut self, name: impl Into<String>, literal_type: LiteralType) -> Self {
    self.inputs.push(Variable::new(name, literal_type));
    self
  }

  pub fn node(mut self, node: Node) -> Self {
    self.nodes.push(node);
    self
  }

  pub fn output(mut self, name: impl Into<String>, binding: Binding) -> Self {
    self.outputs.insert(name.into(), binding);
    self
  }

  /// Validate and freeze the workflow.
  ///
  /// Checks node id uniqueness, that every task input is bound exactly once
  /// to a source of a compatible type, that all references resolve, and that
  /// data and ordering edges are acyclic.
  pub fn build(self) -> Result<Workflow, WorkflowError> {
    if self.name.trim().is_empty() {
      return Err(WorkflowError::EmptyName);
    }
    if self.nodes.is_empty() {
      return Err(WorkflowError::NoNodes(self.name));
    }

    let mut input_names = HashSet::new();
    for input in &self.inputs {
      if !input_names.insert(input.name.as_str()) {
        return Err(WorkflowError::DuplicateInput(input.name.clone()));
      }
    }

    let mut index = HashMap::new();
    for (i, node) in self.nodes.iter().enumerate() {
      if index.insert(node.id.clone(), i).is_some() {
        return Err(WorkflowError::DuplicateNode(node.id.clone()));
      }
    }

    let mut edges = Vec::new();
    for node in &self.nodes {
      check_bindings(node, &self.inputs, &self.nodes, &index)?;

      for dep in node.dependencies() {
        if !index.contains_key(dep) {
          return Err(WorkflowError::NodeNotFound(dep.to_string()));
        }
        edges.push((dep.to_string(), node.id.clone()));
      }
    }

    for (name, binding) in &self.outputs {
      let Binding::NodeOutput { node_id, output } = binding else {
        return Err(WorkflowError::InvalidOutput {
          output: name.clone(),
        });
      };
      let upstream = index
        .get(node_id)
        .map(|i| &self.nodes[*i])
        .ok_or_else(|| WorkflowError::NodeNotFound(node_id.clone()))?;
      if upstream.task.interface().output(output).is_none() {
        return Err(WorkflowError::UnknownOutput {
          node: format!("output:{name}"),
          upstream: node_id.clone(),
          output: output.clone(),
        });
      }
    }

    let node_ids: Vec<String> = self.nodes.iter().map(|n| n.id.clone()).collect();
    let graph = Graph::new(&node_ids, &edges)?;

    Ok(Workflow {
      name: self.name,
      version: self.version,
      inputs: self.inputs,
      nodes: self.nodes,
      index,
      outputs: self.outputs,
      graph,
    })
  }
}

fn check_bindings(
  node: &Node,
  workflow_inputs: &[Variable],
  nodes: &[Node],
  index: &HashMap<String, usize>,
) -> Result<(), WorkflowError> {
  let interface = node.task.interface();

  if let Some(extra) = node
    .bindings
    .keys()
    .find(|name| interface.input(name).is_none())
  {
    return Err(WorkflowError::ExtraBinding {
      node: node.id.clone(),
      task: node.task.name().to_string(),
      input: extra.clone(),
    });
  }

  for var in &interface.inputs {
    let binding = node
      .bindings
      .get(&var.name)
      .ok_or_else(|| WorkflowError::MissingBinding {
        node: node.id.clone(),
        input: var.name.clone(),
      })?;

    let produced = match binding {
      Binding::Literal { value } => {
        var
          .literal_type
          .validate_at(&var.name, value)
          .map_err(|source| WorkflowError::InvalidLiteral {
            node: node.id.clone(),
            input: var.name.clone(),
            source,
          })?;
        continue;
      }
      Binding::WorkflowInput { name } => workflow_inputs
        .iter()
        .find(|v| &v.name == name)
        .map(|v| &v.literal_type)
        .ok_or_else(|| WorkflowError::UnknownInput {
          node: node.id.clone(),
          input: name.clone(),
        })?,
      Binding::NodeOutput { node_id, output } => {
        let upstream = index
          .get(node_id)
          .map(|i| &nodes[*i])
          .ok_or_else(|| WorkflowError::NodeNotFound(node_id.clone()))?;
        upstream
          .task
          .interface()
          .output(output)
          .map(|v| &v.literal_type)
          .ok_or_else(|| WorkflowError::UnknownOutput {
            node: node.id.clone(),
            upstream: node_id.clone(),
            output: output.clone(),
          })?
      }
    };

    if !var.literal_type.is_compatible(produced) {
      return Err(WorkflowError::TypeMismatch {
        node: node.id.clone(),
        input: var.name.clone(),
        expected: var.literal_type.to_string(),
        actual: produced.to_string(),
      });
    }
  }

  Ok(())
}
