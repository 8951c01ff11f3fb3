//! # Scheduler configuration.
//!
//! [`SchedulerConfig`] carries the scheduler-wide defaults consulted when a
//! task does not override them: history depth, timezone, timer driver, event
//! bus capacity, and the plugin set initialized at construction.

use std::sync::Arc;

use chrono::FixedOffset;

use crate::plugin::SchedulerPlugin;
use crate::timers::Driver;

/// Default bound on each task's execution history.
pub const DEFAULT_MAX_HISTORY: usize = 50;

/// Default event bus ring-buffer capacity.
pub const DEFAULT_BUS_CAPACITY: usize = 256;

/// Scheduler-wide defaults and construction-time hooks.
#[derive(Clone)]
pub struct SchedulerConfig {
    /// Emit verbose scheduling decisions at debug level.
    pub debug: bool,
    /// Per-task execution history bound (newest-first, oldest evicted).
    pub max_history: usize,
    /// Default fixed UTC offset for cron evaluation; `None` means the local
    /// offset at evaluation time.
    pub timezone: Option<FixedOffset>,
    /// Default timer driver for tasks without a per-task preference.
    pub driver: Driver,
    /// Event bus ring-buffer capacity (clamped to at least 1).
    pub bus_capacity: usize,
    /// Plugins initialized once, at scheduler construction.
    pub plugins: Vec<Arc<dyn SchedulerPlugin>>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debug: false,
            max_history: DEFAULT_MAX_HISTORY,
            timezone: None,
            driver: Driver::default(),
            bus_capacity: DEFAULT_BUS_CAPACITY,
            plugins: Vec::new(),
        }
    }
}

impl std::fmt::Debug for SchedulerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerConfig")
            .field("debug", &self.debug)
            .field("max_history", &self.max_history)
            .field("timezone", &self.timezone)
            .field("driver", &self.driver)
            .field("bus_capacity", &self.bus_capacity)
            .field(
                "plugins",
                &self.plugins.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
