//! # Driver: named timer-strategy flavor used for per-task selection.
//!
//! Resolution order when scheduling a task: task-level driver preference →
//! scheduler-level default → baseline default ([`Driver::Worker`]). Strategy
//! instances are built lazily and cached per (task, driver) pair so repeated
//! scheduling of the same task reuses the same underlying worker thread.

use std::fmt;
use std::sync::Arc;

use super::{ThreadTimer, TimerStrategy, TokioTimer};

/// Timer-strategy flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Driver {
    /// Direct: fire on the runtime that scheduled the task.
    Direct,
    /// Auxiliary-thread-backed (default): delay tracking on a dedicated
    /// timing thread, accurate under primary-context throttling.
    #[default]
    Worker,
}

impl Driver {
    /// Builds a fresh strategy instance of this flavor.
    pub(crate) fn build(self) -> Arc<dyn TimerStrategy> {
        match self {
            Driver::Direct => Arc::new(TokioTimer::new()),
            Driver::Worker => Arc::new(ThreadTimer::new()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Driver::Direct => "direct",
            Driver::Worker => "worker",
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
