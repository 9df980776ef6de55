//! Strata Workflow
//!
//! This crate provides the validated workflow representation for Strata.
//! A [`Workflow`] is produced by [`WorkflowBuilder::build`] and is ready for
//! execution:
//!
//! - Every node input is bound to a literal, a workflow input, or an upstream
//!   node output of a compatible type
//! - Data edges and explicit ordering edges form an acyclic graph
//! - Entry points and a topological order are precomputed
//!
//! Workflows are immutable once built; executing one never mutates it.
//! A [`LaunchPlan`] names a workflow together with default and fixed inputs,
//! and a [`Registry`] holds versioned tasks, workflows and launch plans per
//! scope.

mod binding;
mod builder;
mod error;
mod graph;
mod launch_plan;
mod node;
mod registry;
mod workflow;

pub use binding::Binding;
pub use builder::WorkflowBuilder;
pub use error::WorkflowError;
pub use graph::Graph;
pub use launch_plan::{LaunchPlan, LaunchPlanBuilder};
pub use node::Node;
pub use registry::{EntityId, EntityKind, Registry, RegistryError};
pub use workflow::Workflow;
