//! Timer strategies: pluggable "run this callback after N milliseconds" drivers.
//!
//! The scheduler never sleeps itself; it asks a [`TimerStrategy`] to fire a
//! callback after a delay and keeps the returned [`TimerHandle`] so the wakeup
//! can be cancelled. Two interchangeable implementations are provided:
//!
//! - [`TokioTimer`] (direct): `tokio::time::sleep` on the current runtime.
//! - [`ThreadTimer`] (worker): delay tracking delegated to a dedicated OS
//!   thread, so wakeups stay accurate even when the runtime is stalled.
//!
//! [`Driver`] names the flavor and is the unit of per-task driver selection.

mod direct;
mod driver;
mod strategy;
mod worker;

pub use direct::TokioTimer;
pub use driver::Driver;
pub use strategy::{TimerCallback, TimerHandle, TimerStrategy};
pub use worker::ThreadTimer;
