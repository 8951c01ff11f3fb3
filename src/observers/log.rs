//! # Simple logging observer for debugging and demos.
//!
//! [`LogObserver`] is a [`SchedulerPlugin`] that drains the scheduler's event
//! stream into `tracing`.
//!
//! ## Output shape
//! ```text
//! INFO task_registered task=sync-orders namespace=billing schedule="*/5 * * * *"
//! INFO task_completed task=sync-orders duration_ms=142
//! WARN task_failed task=sync-orders duration_ms=98 error="db down"
//! ```
//!
//! ## Example
//! ```no_run
//! # use std::sync::Arc;
//! # use cronloom::{LogObserver, Scheduler, SchedulerConfig};
//! # async fn demo() {
//! let scheduler = Scheduler::new(SchedulerConfig {
//!     plugins: vec![Arc::new(LogObserver)],
//!     ..Default::default()
//! });
//! # }
//! ```

use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::core::Scheduler;
use crate::events::SchedulerEvent;
use crate::plugin::{PluginError, SchedulerPlugin};

/// Drains scheduler events into `tracing`.
///
/// Enabled via the `logging` feature. Intended for development and demos;
/// implement a custom event consumer for structured metrics collection.
pub struct LogObserver;

impl SchedulerPlugin for LogObserver {
    fn name(&self) -> &str {
        "log-observer"
    }

    fn init(&self, scheduler: &Scheduler) -> Result<(), PluginError> {
        let mut events = scheduler.events();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => log_event(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "log observer lagged behind the event bus");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        Ok(())
    }
}

fn log_event(event: &SchedulerEvent) {
    let kind = event.kind().as_str();
    match event {
        SchedulerEvent::TaskRegistered { task } => {
            info!(kind, task = %task.id, namespace = %task.namespace, schedule = %task.schedule);
        }
        SchedulerEvent::TaskStarted { task } => {
            info!(kind, task = %task.id, attempt = task.execution_count);
        }
        SchedulerEvent::TaskCompleted { task, duration } => {
            info!(kind, task = %task.id, duration_ms = duration.as_millis() as u64);
        }
        SchedulerEvent::TaskFailed {
            task,
            duration,
            error,
        } => {
            warn!(kind, task = %task.id, duration_ms = duration.as_millis() as u64, error = %error);
        }
        SchedulerEvent::TaskStopped { task } => {
            info!(kind, task = %task.id);
        }
        SchedulerEvent::TaskUpdated { task } => {
            info!(kind, task = %task.id, status = %task.status);
        }
        SchedulerEvent::TaskRemoved { task_id } => {
            info!(kind, task = %task_id);
        }
        SchedulerEvent::SchedulerStarted { running, scope }
        | SchedulerEvent::SchedulerStopped { running, scope } => {
            info!(kind, running, scope = scope.as_deref().unwrap_or("*"));
        }
    }
}
