use std::fmt;

use serde::{Deserialize, Serialize};

/// A {project, domain} partition.
///
/// Both values are opaque strings supplied by deployment tooling. They are only
/// used to partition cache keys and execution records; a cache entry written in
/// one scope is never visible from another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Scope {
  pub project: String,
  pub domain: String,
}

impl Scope {
  pub fn new(project: impl Into<String>, domain: impl Into<String>) -> Self {
    Self {
      project: project.into(),
      domain: domain.into(),
    }
  }
}

impl Default for Scope {
  fn default() -> Self {
    Self::new("default", "development")
  }
}

impl fmt::Display for Scope {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.project, self.domain)
  }
}
