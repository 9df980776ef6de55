/// A literal did not conform to its declared type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("type mismatch at '{path}': expected {expected}, got {actual}")]
pub struct TypeMismatch {
  /// Location inside the value, e.g. `n`, `items[2]`, `point.x`.
  pub path: String,
  pub expected: String,
  pub actual: String,
}

impl TypeMismatch {
  pub fn new(
    path: &str,
    expected: impl Into<String>,
    actual: impl Into<String>,
  ) -> Self {
    Self {
      path: path.to_string(),
      expected: expected.into(),
      actual: actual.into(),
    }
  }
}
