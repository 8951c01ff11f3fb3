//! Retry policy for failed task executions.
//!
//! - [`RetryPolicy`]: exponential-backoff parameters and the pure delay
//!   computation applied between failed attempts of the same occurrence.

mod retry;

pub use retry::RetryPolicy;
