use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::enums::RetryBackoff;

/// Upper bound on any single backoff delay.
const MAX_DELAY_MS: u64 = 5 * 60 * 1000;

/// How a failed task attempt is retried.
///
/// `max_retries` counts retries, not attempts: a budget of 2 allows up to three
/// attempts in total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
  #[serde(default)]
  pub max_retries: u32,
  #[serde(default = "default_backoff")]
  pub backoff: RetryBackoff,
  #[serde(default)]
  pub initial_delay_ms: u64,
}

fn default_backoff() -> RetryBackoff {
  RetryBackoff::Exponential
}

impl RetryPolicy {
  /// A policy that never retries.
  pub fn none() -> Self {
    Self {
      max_retries: 0,
      backoff: RetryBackoff::Constant,
      initial_delay_ms: 0,
    }
  }

  /// Same backoff, different retry budget.
  pub fn with_max_retries(self, max_retries: u32) -> Self {
    Self {
      max_retries,
      ..self
    }
  }

  /// Delay to wait before retry number `retry` (1-based).
  pub fn delay_for(&self, retry: u32) -> Duration {
    let base = self.initial_delay_ms;
    let retry = retry.max(1);
    let ms = match self.backoff {
      RetryBackoff::Constant => base,
      RetryBackoff::Linear => base.saturating_mul(u64::from(retry)),
      RetryBackoff::Exponential => {
        let factor = 1u64.checked_shl(retry - 1).unwrap_or(u64::MAX);
        base.saturating_mul(factor)
      }
    };
    Duration::from_millis(ms.min(MAX_DELAY_MS))
  }
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self::none()
  }
}
