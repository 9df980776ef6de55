use std::sync::Arc;

use strata_literal::{Literal, LiteralMap};

use crate::error::WorkflowError;
use crate::workflow::Workflow;

/// A named way to launch a workflow with preset inputs.
///
/// Default inputs apply when the caller does not supply a value. Fixed inputs
/// always apply and may not be supplied by the caller.
#[derive(Debug, Clone)]
pub struct LaunchPlan {
  name: String,
  workflow: Arc<Workflow>,
  default_inputs: LiteralMap,
  fixed_inputs: LiteralMap,
}

impl LaunchPlan {
  pub fn builder(name: impl Into<String>, workflow: &Workflow) -> LaunchPlanBuilder {
    LaunchPlanBuilder {
      name: name.into(),
      workflow: Arc::new(workflow.clone()),
      default_inputs: LiteralMap::new(),
      fixed_inputs: LiteralMap::new(),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Version of the underlying workflow.
  pub fn version(&self) -> &str {
    self.workflow.version()
  }

  pub fn workflow(&self) -> &Workflow {
    &self.workflow
  }

  pub fn default_inputs(&self) -> &LiteralMap {
    &self.default_inputs
  }

  pub fn fixed_inputs(&self) -> &LiteralMap {
    &self.fixed_inputs
  }

  /// Merge caller inputs over the defaults, then apply the fixed inputs.
  ///
  /// The result is not checked against the workflow interface; launching it
  /// does that.
  pub fn resolve_inputs(&self, inputs: LiteralMap) -> Result<LiteralMap, WorkflowError> {
    if let Some(input) = inputs.keys().find(|k| self.fixed_inputs.contains_key(*k)) {
      return Err(WorkflowError::FixedInputOverride {
        plan: self.name.clone(),
        input: input.clone(),
      });
    }
    let mut merged = self.default_inputs.clone();
    merged.extend(inputs);
    merged.extend(self.fixed_inputs.clone());
    Ok(merged)
  }
}

pub struct LaunchPlanBuilder {
  name: String,
  workflow: Arc<Workflow>,
  default_inputs: LiteralMap,
  fixed_inputs: LiteralMap,
}

impl LaunchPlanBuilder {
  pub fn default_input(mut self, name: impl Into<String>, value: impl Into<Literal>) -> Self {
    self.default_inputs.insert(name.into(), value.into());
    self
  }

  pub fn fixed_input(mut self, name: impl Into<String>, value: impl Into<Literal>) -> Self {
    self.fixed_inputs.insert(name.into(), value.into());
    self
  }

  /// Check every preset against the workflow's declared inputs.
  pub fn build(self) -> Result<LaunchPlan, WorkflowError> {
    if self.name.is_empty() {
      return Err(WorkflowError::EmptyName);
    }
    for (name, value) in self.default_inputs.iter().chain(&self.fixed_inputs) {
      let declared = self
        .workflow
        .inputs()
        .iter()
        .find(|var| &var.name == name)
        .ok_or_else(|| WorkflowError::UnknownLaunchInput {
          plan: self.name.clone(),
          input: name.clone(),
        })?;
      declared
        .literal_type
        .validate_at(name, value)
        .map_err(|source| WorkflowError::InvalidLaunchInput {
          plan: self.name.clone(),
          input: name.clone(),
          source,
        })?;
    }
    if let Some(input) = self
      .default_inputs
      .keys()
      .find(|k| self.fixed_inputs.contains_key(*k))
    {
      return Err(WorkflowError::ConflictingLaunchInput {
        plan: self.name.clone(),
        input: input.clone(),
      });
    }

    Ok(LaunchPlan {
      name: self.name,
      workflow: self.workflow,
      default_inputs: self.default_inputs,
      fixed_inputs: self.fixed_inputs,
    })
  }
}

#[cfg(test)]
mod tests {
  use strata_literal::LiteralType;
  use strata_task::{ExecutionContext, Task, TaskError};

  use super::*;
  use crate::{Binding, Node};

  fn noop(_: &ExecutionContext, _: LiteralMap) -> Result<LiteralMap, TaskError> {
    Ok(LiteralMap::new())
  }

  fn normal_df() -> Workflow {
    let task = Task::builder("generate")
      .input("n", LiteralType::Integer)
      .input("mean", LiteralType::Float)
      .body_fn(noop)
      .build()
      .unwrap();
    Workflow::builder("normal_df")
      .version("v1")
      .input("n", LiteralType::Integer)
      .input("mean", LiteralType::Float)
      .node(
        Node::new("gen", &task)
          .bind("n", Binding::input("n"))
          .bind("mean", Binding::input("mean")),
      )
      .build()
      .unwrap()
  }

  #[test]
  fn test_defaults_yield_to_caller_and_fixed_inputs_win() {
    let plan = LaunchPlan::builder("normal_df_lp", &normal_df())
      .default_input("n", 10i64)
      .fixed_input("mean", 0.5)
      .build()
      .unwrap();
    assert_eq!(plan.version(), "v1");

    let inputs = plan.resolve_inputs(LiteralMap::new()).unwrap();
    assert_eq!(inputs["n"], Literal::integer(10));
    assert_eq!(inputs["mean"], Literal::float(0.5));

    let inputs = plan
      .resolve_inputs(LiteralMap::from([("n".to_string(), Literal::integer(200))]))
      .unwrap();
    assert_eq!(inputs["n"], Literal::integer(200));

    let err = plan
      .resolve_inputs(LiteralMap::from([("mean".to_string(), Literal::float(1.0))]))
      .unwrap_err();
    assert!(matches!(err, WorkflowError::FixedInputOverride { input, .. } if input == "mean"));
  }

  #[test]
  fn test_presets_are_checked_against_the_workflow() {
    let workflow = normal_df();

    let err = LaunchPlan::builder("lp", &workflow)
      .default_input("sigma", 1.0)
      .build()
      .unwrap_err();
    assert!(matches!(err, WorkflowError::UnknownLaunchInput { input, .. } if input == "sigma"));

    let err = LaunchPlan::builder("lp", &workflow)
      .default_input("n", "ten")
      .build()
      .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidLaunchInput { input, .. } if input == "n"));

    let err = LaunchPlan::builder("lp", &workflow)
      .default_input("n", 1i64)
      .fixed_input("n", 2i64)
      .build()
      .unwrap_err();
    assert!(matches!(err, WorkflowError::ConflictingLaunchInput { input, .. } if input == "n"));
  }
}
