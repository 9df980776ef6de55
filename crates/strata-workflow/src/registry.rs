//! Registered tasks, workflows and launch plans.
//!
//! Entities are addressed by scope, name and version. A registered version is
//! immutable: registering the same identity again is an error. Fetching
//! without a version returns the most recently registered one.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use strata_config::Scope;
use strata_task::Task;
use thiserror::Error;

use crate::launch_plan::LaunchPlan;
use crate::workflow::Workflow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
  Task,
  Workflow,
  LaunchPlan,
}

impl fmt::Display for EntityKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      EntityKind::Task => "task",
      EntityKind::Workflow => "workflow",
      EntityKind::LaunchPlan => "launch plan",
    };
    f.write_str(name)
  }
}

/// Identity of a registered entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityId {
  pub scope: Scope,
  pub name: String,
  pub version: String,
}

impl fmt::Display for EntityId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}@{}", self.scope, self.name, self.version)
  }
}

#[derive(Debug, Error)]
pub enum RegistryError {
  #[error("{kind} {id} is already registered")]
  AlreadyRegistered { kind: EntityKind, id: EntityId },

  #[error("{kind} '{name}' (version {}) not found in {scope}", version.as_deref().unwrap_or("latest"))]
  NotFound {
    kind: EntityKind,
    scope: Scope,
    name: String,
    version: Option<String>,
  },
}

/// Versions of one kind of entity, in registration order per scope and name.
struct Versions<T> {
  kind: EntityKind,
  entries: HashMap<(Scope, String), Vec<(String, Arc<T>)>>,
}

impl<T> Versions<T> {
  fn new(kind: EntityKind) -> Self {
    Self {
      kind,
      entries: HashMap::new(),
    }
  }

  fn insert(&mut self, id: EntityId, value: T) -> Result<EntityId, RegistryError> {
    let versions = self
      .entries
      .entry((id.scope.clone(), id.name.clone()))
      .or_default();
    if versions.iter().any(|(version, _)| *version == id.version) {
      return Err(RegistryError::AlreadyRegistered {
        kind: self.kind,
        id,
      });
    }
    versions.push((id.version.clone(), Arc::new(value)));
    Ok(id)
  }

  fn get(&self, scope: &Scope, name: &str, version: Option<&str>) -> Result<Arc<T>, RegistryError> {
    let found = self
      .entries
      .get(&(scope.clone(), name.to_string()))
      .and_then(|versions| match version {
        Some(wanted) => versions.iter().find(|(v, _)| v == wanted),
        None => versions.last(),
      });
    found
      .map(|(_, value)| value.clone())
      .ok_or_else(|| RegistryError::NotFound {
        kind: self.kind,
        scope: scope.clone(),
        name: name.to_string(),
        version: version.map(str::to_string),
      })
  }

  fn versions(&self, scope: &Scope, name: &str) -> Vec<String> {
    self
      .entries
      .get(&(scope.clone(), name.to_string()))
      .map(|versions| versions.iter().map(|(v, _)| v.clone()).collect())
      .unwrap_or_default()
  }
}

struct Entries {
  tasks: Versions<Task>,
  workflows: Versions<Workflow>,
  launch_plans: Versions<LaunchPlan>,
}

/// In-process registry of versioned tasks, workflows and launch plans.
///
/// Shareable across threads; clones of a fetched entity are cheap `Arc`s.
pub struct Registry {
  entries: RwLock<Entries>,
}

impl Default for Registry {
  fn default() -> Self {
    Self::new()
  }
}

impl Registry {
  pub fn new() -> Self {
    Self {
      entries: RwLock::new(Entries {
        tasks: Versions::new(EntityKind::Task),
        workflows: Versions::new(EntityKind::Workflow),
        launch_plans: Versions::new(EntityKind::LaunchPlan),
      }),
    }
  }

  fn read<R>(&self, f: impl FnOnce(&Entries) -> R) -> R {
    let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
    f(&entries)
  }

  fn write<R>(&self, f: impl FnOnce(&mut Entries) -> R) -> R {
    let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
    f(&mut entries)
  }

  /// Tasks carry no version of their own, so the caller supplies one.
  pub fn register_task(
    &self,
    scope: &Scope,
    version: impl Into<String>,
    task: Task,
  ) -> Result<EntityId, RegistryError> {
    let id = EntityId {
      scope: scope.clone(),
      name: task.name().to_string(),
      version: version.into(),
    };
    self.write(|e| e.tasks.insert(id, task))
  }

  pub fn register_workflow(
    &self,
    scope: &Scope,
    workflow: Workflow,
  ) -> Result<EntityId, RegistryError> {
    let id = EntityId {
      scope: scope.clone(),
      name: workflow.name().to_string(),
      version: workflow.version().to_string(),
    };
    self.write(|e| e.workflows.insert(id, workflow))
  }

  /// Registered under the plan's name and its workflow's version.
  pub fn register_launch_plan(
    &self,
    scope: &Scope,
    plan: LaunchPlan,
  ) -> Result<EntityId, RegistryError> {
    let id = EntityId {
      scope: scope.clone(),
      name: plan.name().to_string(),
      version: plan.version().to_string(),
    };
    self.write(|e| e.launch_plans.insert(id, plan))
  }

  pub fn fetch_task(
    &self,
    scope: &Scope,
    name: &str,
    version: Option<&str>,
  ) -> Result<Arc<Task>, RegistryError> {
    self.read(|e| e.tasks.get(scope, name, version))
  }

  pub fn fetch_workflow(
    &self,
    scope: &Scope,
    name: &str,
    version: Option<&str>,
  ) -> Result<Arc<Workflow>, RegistryError> {
    self.read(|e| e.workflows.get(scope, name, version))
  }

  pub fn fetch_launch_plan(
    &self,
    scope: &Scope,
    name: &str,
    version: Option<&str>,
  ) -> Result<Arc<LaunchPlan>, RegistryError> {
    self.read(|e| e.launch_plans.get(scope, name, version))
  }

  /// Registered versions of a workflow, oldest first.
  pub fn workflow_versions(&self, scope: &Scope, name: &str) -> Vec<String> {
    self.read(|e| e.workflows.versions(scope, name))
  }

  /// Registered versions of a task, oldest first.
  pub fn task_versions(&self, scope: &Scope, name: &str) -> Vec<String> {
    self.read(|e| e.tasks.versions(scope, name))
  }
}
