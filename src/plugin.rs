//! # Plugin hook run at scheduler construction.
//!
//! A [`SchedulerPlugin`] gets one `init` call with the freshly built
//! scheduler, typically to register event listeners or snapshot subscribers.
//! Plugin failures (errors or panics) are logged and skipped; they never
//! prevent the scheduler from coming up.

use crate::core::Scheduler;

/// Boxed error type plugins may return from `init`.
pub type PluginError = Box<dyn std::error::Error + Send + Sync>;

/// Construction-time extension point.
pub trait SchedulerPlugin: Send + Sync {
    /// Stable plugin name used in log output.
    fn name(&self) -> &str;

    /// Called once, after the scheduler is constructed and before `new`
    /// returns.
    fn init(&self, scheduler: &Scheduler) -> Result<(), PluginError>;
}
