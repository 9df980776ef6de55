use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::WorkflowError;

/// Dependency edges between the nodes of a workflow.
///
/// An edge `(from, to)` means `to` cannot start until `from` has succeeded.
#[derive(Debug, Clone)]
pub struct Graph {
  /// node id -> direct dependents
  adjacency: HashMap<String, Vec<String>>,
  /// node id -> direct dependencies
  reverse_adjacency: HashMap<String, Vec<String>>,
  /// Nodes with no incoming edges, in declaration order.
  entry_points: Vec<String>,
  /// Every node, upstream before downstream.
  topological_order: Vec<String>,
}

impl Graph {
  /// Build a graph from node ids (in declaration order) and edges.
  ///
  /// Duplicate edges are collapsed. Fails with [`WorkflowError::Cycle`] if the
  /// edges do not form a DAG.
  pub fn new(node_ids: &[String], edges: &[(String, String)]) -> Result<Self, WorkflowError> {
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    let mut reverse_adjacency: HashMap<String, Vec<String>> = HashMap::new();

    for node_id in node_ids {
      adjacency.entry(node_id.clone()).or_default();
      reverse_adjacency.entry(node_id.clone()).or_default();
    }

    let mut seen = HashSet::new();
    for (from, to) in edges {
      if !seen.insert((from, to)) {
        continue;
      }
      for id in [from, to] {
        if !adjacency.contains_key(id) {
          return Err(WorkflowError::NodeNotFound(id.clone()));
        }
      }
      adjacency.entry(from.clone()).or_default().push(to.clone());
      reverse_adjacency
        .entry(to.clone())
        .or_default()
        .push(from.clone());
    }

    let entry_points: Vec<String> = node_ids
      .iter()
      .filter(|id| reverse_adjacency.get(*id).is_none_or(|v| v.is_empty()))
      .cloned()
      .collect();

    let topological_order = topological_sort(node_ids, &entry_points, &adjacency, &reverse_adjacency)?;

    Ok(Self {
      adjacency,
      reverse_adjacency,
      entry_points,
      topological_order,
    })
  }

  /// Nodes with no dependencies.
  pub fn entry_points(&self) -> &[String] {
    &self.entry_points
  }

  /// Direct dependents of `node_id`.
  pub fn downstream(&self, node_id: &str) -> &[String] {
    self
      .adjacency
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Direct dependencies of `node_id`.
  pub fn upstream(&self, node_id: &str) -> &[String] {
    self
      .reverse_adjacency
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Every node reachable from `node_id`, excluding itself, in topological order.
  pub fn descendants(&self, node_id: &str) -> Vec<String> {
    let mut reached = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::from([node_id]);
    while let Some(current) = queue.pop_front() {
      for next in self.downstream(current) {
        if reached.insert(next.as_str()) {
          queue.push_back(next);
        }
      }
    }
    self
      .topological_order
      .iter()
      .filter(|id| reached.contains(id.as_str()))
      .cloned()
      .collect()
  }

  /// All nodes, each after everything it depends on.
  pub fn topological_order(&self) -> &[String] {
    &self.topological_order
  }
}

/// Kahn's algorithm. Ties are broken by declaration order so the result is
/// deterministic.
fn topological_sort(
  node_ids: &[String],
  entry_points: &[String],
  adjacency: &HashMap<String, Vec<String>>,
  reverse_adjacency: &HashMap<String, Vec<String>>,
) -> Result<Vec<String>, WorkflowError> {
  let mut in_degree: HashMap<&str, usize> = reverse_adjacency
    .iter()
    .map(|(id, upstream)| (id.as_str(), upstream.len()))
    .collect();

  let mut queue: VecDeque<&str> = entry_points.iter().map(String::as_str).collect();
  let mut sorted: Vec<String> = Vec::with_capacity(node_ids.len());

  while let Some(node_id) = queue.pop_front() {
    sorted.push(node_id.to_owned());

    if let Some(neighbours) = adjacency.get(node_id) {
      for neighbour in neighbours {
        if let Some(degree) = in_degree.get_mut(neighbour.as_str()) {
          *degree -= 1;
          if *degree == 0 {
            queue.push_back(neighbour);
          }
        }
      }
    }
  }

  // If we didn't visit every node the graph contains a cycle.
  if sorted.len() != node_ids.len() {
    let visited: HashSet<&str> = sorted.iter().map(String::as_str).collect();
    let nodes = node_ids
      .iter()
      .filter(|id| !visited.contains(id.as_str()))
      .cloned()
      .collect();
    return Err(WorkflowError::Cycle { nodes });
  }

  Ok(sorted)
}
