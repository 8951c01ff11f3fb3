//! # Retry policy: exponential backoff between failed attempts.
//!
//! [`RetryPolicy`] controls how many times a failed execution is retried and
//! how the delay grows. The delay for attempt `n` (zero-based: the first
//! retry uses `n = 0`) is `initial_delay × factor^n`; once `n` reaches
//! [`RetryPolicy::max_attempts`] there are no more retries.
//!
//! This is a pure computation with no side effects or internal state. Tasks
//! without a retry policy never retry: the scheduler treats an absent policy
//! as "no delay available".
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use cronloom::RetryPolicy;
//!
//! let policy = RetryPolicy {
//!     max_attempts: 3,
//!     initial_delay: Duration::from_millis(100),
//!     factor: 2.0,
//! };
//!
//! assert_eq!(policy.next_delay(0), Some(Duration::from_millis(100)));
//! assert_eq!(policy.next_delay(1), Some(Duration::from_millis(200)));
//! assert_eq!(policy.next_delay(2), Some(Duration::from_millis(400)));
//! assert_eq!(policy.next_delay(3), None);
//! ```

use std::time::Duration;

/// Exponential-backoff retry policy for a task.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries per occurrence.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub factor: f64,
}

impl RetryPolicy {
    /// Computes the delay before the retry with the given zero-based attempt
    /// counter, or `None` when the policy is exhausted.
    ///
    /// Non-finite or negative products (pathological `factor` values, huge
    /// attempt counters) saturate to a day rather than panicking.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let clamped_exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.factor.powi(clamped_exp);
        if !secs.is_finite() || secs < 0.0 {
            return Some(Duration::from_secs(86_400));
        }
        Some(Duration::try_from_secs_f64(secs).unwrap_or(Duration::from_secs(86_400)))
    }
}
