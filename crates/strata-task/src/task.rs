use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strata_literal::{LiteralMap, LiteralType, TypeMismatch};

use crate::body::{FnBody, TaskBody, task_fn};
use crate::context::ExecutionContext;
use crate::error::{DefinitionError, TaskError};

/// A named, typed slot in a task interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
  pub name: String,
  pub literal_type: LiteralType,
  /// Hash method stamped onto blob values produced for this output.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub hash_method: Option<String>,
}

impl Variable {
  pub fn new(name: impl Into<String>, literal_type: LiteralType) -> Self {
    Self {
      name: name.into(),
      literal_type,
      hash_method: None,
    }
  }
}

/// Ordered inputs and outputs of a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskInterface {
  pub inputs: Vec<Variable>,
  pub outputs: Vec<Variable>,
}

impl TaskInterface {
  pub fn input(&self, name: &str) -> Option<&Variable> {
    self.inputs.iter().find(|v| v.name == name)
  }

  pub fn output(&self, name: &str) -> Option<&Variable> {
    self.outputs.iter().find(|v| v.name == name)
  }

  /// Check that `inputs` has exactly the declared inputs with matching types.
  pub fn validate_inputs(&self, inputs: &LiteralMap) -> Result<(), TypeMismatch> {
    validate_map(&self.inputs, inputs)
  }

  /// Check that `outputs` has exactly the declared outputs with matching types.
  pub fn validate_outputs(&self, outputs: &LiteralMap) -> Result<(), TypeMismatch> {
    validate_map(&self.outputs, outputs)
  }
}

fn validate_map(vars: &[Variable], values: &LiteralMap) -> Result<(), TypeMismatch> {
  for var in vars {
    match values.get(&var.name) {
      Some(value) => var.literal_type.validate_at(&var.name, value)?,
      None => {
        return Err(TypeMismatch::new(
          &var.name,
          var.literal_type.to_string(),
          "missing",
        ));
      }
    }
  }
  if let Some(extra) = values.keys().find(|k| !vars.iter().any(|v| &v.name == *k)) {
    return Err(TypeMismatch::new(extra, "nothing", "unexpected value"));
  }
  Ok(())
}

/// Whether results of a task may be memoized, and under which version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
  pub enabled: bool,
  pub version: String,
}

/// A set of resource quantities, e.g. `cpu: "2"`, `memory: "4Gi"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cpu: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub memory: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub gpu: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ephemeral_storage: Option<String>,
}

/// Resource hints for a task. Passed through to task bodies, never enforced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
  #[serde(default)]
  pub requests: ResourceSpec,
  #[serde(default)]
  pub limits: ResourceSpec,
}

/// An immutable task definition.
#[derive(Clone)]
pub struct Task {
  name: String,
  interface: TaskInterface,
  cache: CachePolicy,
  resources: Resources,
  retries: Option<u32>,
  timeout: Option<Duration>,
  body: Arc<dyn TaskBody>,
}

impl Task {
  pub fn builder(name: impl Into<String>) -> TaskBuilder {
    TaskBuilder::new(name)
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn interface(&self) -> &TaskInterface {
    &self.interface
  }

  pub fn cache_policy(&self) -> &CachePolicy {
    &self.cache
  }

  pub fn resources(&self) -> &Resources {
    &self.resources
  }

  /// Per-task retry budget, overriding the engine default.
  pub fn retries(&self) -> Option<u32> {
    self.retries
  }

  /// Per-task attempt timeout, overriding the engine default.
  pub fn timeout(&self) -> Option<Duration> {
    self.timeout
  }

  pub fn body(&self) -> &Arc<dyn TaskBody> {
    &self.body
  }

  /// Run the body once.
  pub async fn invoke(
    &self,
    ctx: &ExecutionContext,
    inputs: LiteralMap,
  ) -> Result<LiteralMap, TaskError> {
    self.body.invoke(ctx, inputs).await
  }
}

impl fmt::Debug for Task {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Task")
      .field("name", &self.name)
      .field("interface", &self.interface)
      .field("cache", &self.cache)
      .field("resources", &self.resources)
      .field("retries", &self.retries)
      .field("timeout", &self.timeout)
      .finish_non_exhaustive()
  }
}

/// Builder for [`Task`].
///
/// ```ignore
/// let square = Task::builder("square")
///   .input("n", LiteralType::Integer)
///   .output("o0", LiteralType::Integer)
///   .cache("1.0")
///   .body_fn(|_, inputs| { /* ... */ })
///   .build()?;
/// ```
pub struct TaskBuilder {
  name: String,
  interface: TaskInterface,
  cache: CachePolicy,
  resources: Resources,
  retries: Option<u32>,
  timeout: Option<Duration>,
  body: Option<Arc<dyn TaskBody>>,
}

impl TaskBuilder {
  fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      interface: TaskInterface::default(),
      cache: CachePolicy::default(),
      resources: Resources::default(),
      retries: None,
      timeout: None,
      body: None,
    }
  }

  pub fn input(mut self, name: impl Into<String>, literal_type: LiteralType) -> Self {
    self.interface.inputs.push(Variable::new(name, literal_type));
    self
  }

  pub fn output(mut self, name: impl Into<String>, literal_type: LiteralType) -> Self {
    self.interface.outputs.push(Variable::new(name, literal_type));
    self
  }

  /// Declare a blob output whose values are identified by a registered hash
  /// method rather than by their uri when used as downstream cache inputs.
  pub fn output_with_hash(
    mut self,
    name: impl Into<String>,
    literal_type: LiteralType,
    hash_method: impl Into<String>,
  ) -> Self {
    let mut var = Variable::new(name, literal_type);
    var.hash_method = Some(hash_method.into());
    self.interface.outputs.push(var);
    self
  }

  /// Enable caching under `version`.
  pub fn cache(mut self, version: impl Into<String>) -> Self {
    self.cache = CachePolicy {
      enabled: true,
      version: version.into(),
    };
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

  pub fn requests(mut self, requests: ResourceSpec) -> Self {
    self.resources.requests = requests;
    self
  }

  pub fn limits(mut self, limits: ResourceSpec) -> Self {
    self.resources.limits = limits;
    self
  }

  pub fn body(mut self, body: impl TaskBody + 'static) -> Self {
    self.body = Some(Arc::new(body));
    self
  }

  /// Use a blocking closure as the body. See [`task_fn`].
  pub fn body_fn<F>(self, func: F) -> Self
  where
    F: Fn(&ExecutionContext, LiteralMap) -> Result<LiteralMap, TaskError> + Send + Sync + 'static,
  {
    let body: FnBody<F> = task_fn(func);
    self.body(body)
  }

  pub fn build(self) -> Result<Task, DefinitionError> {
    if self.name.trim().is_empty() {
      return Err(DefinitionError::EmptyName);
    }

    for vars in [&self.interface.inputs, &self.interface.outputs] {
      let mut seen = HashSet::new();
      for var in vars {
        if !seen.insert(var.name.as_str()) {
          return Err(DefinitionError::DuplicateVariable {
            task: self.name.clone(),
            name: var.name.clone(),
          });
        }
      }
    }

    for var in &self.interface.outputs {
      let is_blob = matches!(
        var.literal_type,
        LiteralType::Blob(_) | LiteralType::MultiPartBlob(_)
      );
      if var.hash_method.is_some() && !is_blob {
        return Err(DefinitionError::HashMethodOnNonBlob {
          task: self.name.clone(),
          output: var.name.clone(),
        });
      }
    }

    if self.cache.enabled && self.cache.version.trim().is_empty() {
      return Err(DefinitionError::EmptyCacheVersion { task: self.name });
    }

    let Some(body) = self.body else {
      return Err(DefinitionError::MissingBody { task: self.name });
    };

    Ok(Task {
      name: self.name,
      interface: self.interface,
      cache: self.cache,
      resources: self.resources,
      retries: self.retries,
      timeout: self.timeout,
      body,
    })
  }
}

#[cfg(test)]
mod tests {
  use strata_literal::{BlobType, Literal};

  use super::*;

  fn noop(_: &ExecutionContext, _: LiteralMap) -> Result<LiteralMap, TaskError> {
    Ok(LiteralMap::new())
  }

  #[test]
  fn test_build_task() {
    let task = Task::builder("square")
      .input("n", LiteralType::Integer)
      .output("o0", LiteralType::Integer)
      .cache("1.0")
      .retries(2)
      .body_fn(noop)
      .build()
      .unwrap();

    assert_eq!(task.name(), "square");
    assert_eq!(task.interface().inputs.len(), 1);
    assert!(task.cache_policy().enabled);
    assert_eq!(task.cache_policy().version, "1.0");
    assert_eq!(task.retries(), Some(2));
    assert_eq!(task.timeout(), None);
  }

  #[test]
  fn test_duplicate_input_is_rejected() {
    let err = Task::builder("t")
      .input("a", LiteralType::Integer)
      .input("a", LiteralType::String)
      .body_fn(noop)
      .build()
      .unwrap_err();
    assert!(matches!(err, DefinitionError::DuplicateVariable { name, .. } if name == "a"));
  }

  #[test]
  fn test_same_name_input_and_output_is_allowed() {
    let task = Task::builder("t")
      .input("a", LiteralType::Integer)
      .output("a", LiteralType::Integer)
      .body_fn(noop)
      .build();
    assert!(task.is_ok());
  }

  #[test]
  fn test_missing_body_is_rejected() {
    let err = Task::builder("t").build().unwrap_err();
    assert!(matches!(err, DefinitionError::MissingBody { .. }));
  }

  #[test]
  fn test_empty_cache_version_is_rejected() {
    let err = Task::builder("t").cache("").body_fn(noop).build().unwrap_err();
    assert!(matches!(err, DefinitionError::EmptyCacheVersion { .. }));
  }

  #[test]
  fn test_hash_method_requires_blob_output() {
    let err = Task::builder("t")
      .output_with_hash("o0", LiteralType::Integer, "content")
      .body_fn(noop)
      .build()
      .unwrap_err();
    assert!(matches!(err, DefinitionError::HashMethodOnNonBlob { .. }));

    let task = Task::builder("t")
      .output_with_hash("df", LiteralType::Blob(BlobType::format("csv")), "content")
      .body_fn(noop)
      .build()
      .unwrap();
    assert_eq!(
      task.interface().output("df").unwrap().hash_method.as_deref(),
      Some("content")
    );
  }

  #[test]
  fn test_validate_inputs() {
    let interface = TaskInterface {
      inputs: vec![Variable::new("n", LiteralType::Integer)],
      outputs: vec![],
    };

    let ok = LiteralMap::from([("n".to_string(), Literal::integer(1))]);
    assert!(interface.validate_inputs(&ok).is_ok());

    let wrong = LiteralMap::from([("n".to_string(), Literal::string("1"))]);
    let err = interface.validate_inputs(&wrong).unwrap_err();
    assert_eq!(err.path, "n");

    let missing = LiteralMap::new();
    assert_eq!(interface.validate_inputs(&missing).unwrap_err().actual, "missing");

    let extra = LiteralMap::from([
      ("n".to_string(), Literal::integer(1)),
      ("m".to_string(), Literal::integer(2)),
    ]);
    assert_eq!(interface.validate_inputs(&extra).unwrap_err().path, "m");
  }
}
