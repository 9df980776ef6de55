use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use strata_task::Task;

use crate::binding::Binding;

/// An instance of a task inside a workflow.
#[derive(Debug, Clone)]
pub struct Node {
  pub id: String,
  pub task: Task,
  /// Task input name to value source.
  pub bindings: BTreeMap<String, Binding>,
  /// Explicit ordering edges. These gate readiness only and carry no data.
  pub after: BTreeSet<String>,
  /// Overrides the task's retry budget.
  pub retries: Option<u32>,
  /// Overrides the task's attempt timeout.
  pub timeout: Option<Duration>,
}

impl Node {
  pub fn new(id: impl Into<String>, task: &Task) -> Self {
    Self {
      id: id.into(),
      task: task.clone(),
      bindings: BTreeMap::new(),
      after: BTreeSet::new(),
      retries: None,
      timeout: None,
    }
  }

  pub fn bind(mut self, input: impl Into<String>, binding: impl Into<Binding>) -> Self {
    self.bindings.insert(input.into(), binding.into());
    self
  }

  /// Run only after `node_id` has completed successfully.
  pub fn after(mut self, node_id: impl Into<String>) -> Self {
    self.after.insert(node_id.into());
    self
  }

  pub fn retries(mut self, retries: u32) -> Self {
    self.retries = Some(retries);
    self
  }

  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }

  /// Nodes this node depends on, through data or ordering edges.
  pub fn dependencies(&self) -> BTreeSet<&str> {
    self
      .bindings
      .values()
      .filter_map(Binding::upstream)
      .chain(self.after.iter().map(String::as_str))
      .collect()
  }

  /// Effective retry budget: node override, then task, then `default`.
  pub fn retry_budget(&self, default: u32) -> u32 {
    self.retries.or(self.task.retries()).unwrap_or(default)
  }

  /// Effective attempt timeout: node override, then task, then `default`.
  pub fn attempt_timeout(&self, default: Option<Duration>) -> Option<Duration> {
    self.timeout.or(self.task.timeout()).or(default)
  }
}
