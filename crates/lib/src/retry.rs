//! Bounded retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Errors that know whether retrying could help.
pub trait Transient {
  fn is_transient(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Total attempts, including the first one.
  pub max_attempts: u32,
  /// Delay before the second attempt; doubled after every failure.
  pub initial_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 5,
      initial_delay: Duration::from_secs(1),
    }
  }
}

impl RetryPolicy {
  /// A policy that never waits, for tests.
  pub fn immediate(max_attempts: u32) -> Self {
    Self {
      max_attempts,
      initial_delay: Duration::ZERO,
    }
  }

  fn delay(&self, attempt: u32) -> Duration {
    self.initial_delay.saturating_mul(1u32 << (attempt - 1).min(16))
  }
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// attempts are exhausted. The last error is returned.
pub async fn retry<T, E, F, Fut>(policy: RetryPolicy, what: &str, mut op: F) -> Result<T, E>
where
  E: Transient + std::fmt::Display,
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, E>>,
{
  let mut attempt = 1;
  loop {
    match op().await {
      Ok(value) => return Ok(value),
      Err(e) if e.is_transient() && attempt < policy.max_attempts => {
        let delay = policy.delay(attempt);
        warn!(
          operation = what,
          attempt,
          max_attempts = policy.max_attempts,
          delay_ms = delay.as_millis() as u64,
          error = %e,
          "transient failure, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
      }
      Err(e) => return Err(e),
    }
  }
}

/// Blocking counterpart of [`retry`] for the synchronous build path.
pub fn retry_blocking<T, E, F>(policy: RetryPolicy, what: &str, mut op: F) -> Result<T, E>
where
  E: Transient + std::fmt::Display,
  F: FnMut() -> Result<T, E>,
{
  let mut attempt = 1;
  loop {
    match op() {
      Ok(value) => return Ok(value),
      Err(e) if e.is_transient() && attempt < policy.max_attempts => {
        let delay = policy.delay(attempt);
        warn!(
          operation = what,
          attempt,
          max_attempts = policy.max_attempts,
          error = %e,
          "transient failure, retrying"
        );
        std::thread::sleep(delay);
        attempt += 1;
      }
      Err(e) => return Err(e),
    }
  }
}
