/// Per-launch settings.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
  /// Use this exact execution id. Launching fails if it is already taken.
  pub execution_name: Option<String>,
  /// Prefix for a generated execution id, `<prefix>-<random>`. Ignored when
  /// `execution_name` is set.
  pub name_prefix: Option<String>,
}

impl LaunchOptions {
  pub fn named(name: impl Into<String>) -> Self {
    Self {
      execution_name: Some(name.into()),
      name_prefix: None,
    }
  }

  pub fn prefixed(prefix: impl Into<String>) -> Self {
    Self {
      execution_name: None,
      name_prefix: Some(prefix.into()),
    }
  }

  pub(crate) fn execution_id(&self) -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    match (&self.execution_name, &self.name_prefix) {
      (Some(name), _) => name.clone(),
      (None, Some(prefix)) => {
        let suffix: String = random.chars().take(12).collect();
        format!("{prefix}-{suffix}")
      }
      (None, None) => random,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_execution_ids() {
    assert_eq!(LaunchOptions::named("lp-execution").execution_id(), "lp-execution");

    let a = LaunchOptions::prefixed("snacks").execution_id();
    let b = LaunchOptions::prefixed("snacks").execution_id();
    assert!(a.starts_with("snacks-"));
    assert_eq!(a.len(), "snacks-".len() + 12);
    assert_ne!(a, b);

    assert_eq!(LaunchOptions::default().execution_id().len(), 32);
  }
}
