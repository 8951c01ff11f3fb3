//! # Lifecycle events emitted by the scheduler.
//!
//! [`SchedulerEvent`] is a closed tagged union: every event kind carries a
//! concretely typed payload (task events carry a [`TaskSnapshot`], scheduler
//! events carry `{running, scope}`). [`EventKind`] is the payload-free
//! discriminant used as the key of the synchronous subscription table.
//!
//! ## Emission points
//! ```text
//! TaskRegistered    create_task
//! TaskStarted       start_task, every execution start (scheduled/retry/trigger)
//! TaskCompleted     successful attempt
//! TaskFailed        failed attempt (error + duration)
//! TaskStopped       stop_task
//! TaskUpdated       bulk start/stop status flips, scheduling errors
//! TaskRemoved       remove_task
//! SchedulerStarted  start (global or namespace-scoped)
//! SchedulerStopped  stop (global or namespace-scoped)
//! ```

use std::time::Duration;

use crate::tasks::TaskSnapshot;

/// Payload-free event discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    TaskRegistered,
    TaskStarted,
    TaskCompleted,
    TaskFailed,
    TaskStopped,
    TaskUpdated,
    TaskRemoved,
    SchedulerStarted,
    SchedulerStopped,
}

impl EventKind {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::TaskRegistered => "task_registered",
            EventKind::TaskStarted => "task_started",
            EventKind::TaskCompleted => "task_completed",
            EventKind::TaskFailed => "task_failed",
            EventKind::TaskStopped => "task_stopped",
            EventKind::TaskUpdated => "task_updated",
            EventKind::TaskRemoved => "task_removed",
            EventKind::SchedulerStarted => "scheduler_started",
            EventKind::SchedulerStopped => "scheduler_stopped",
        }
    }
}

/// A scheduler lifecycle event with its typed payload.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// Task registered via `create_task`.
    TaskRegistered { task: TaskSnapshot },
    /// Execution attempt started (also emitted by `start_task`).
    TaskStarted { task: TaskSnapshot },
    /// Attempt finished successfully.
    TaskCompleted { task: TaskSnapshot, duration: Duration },
    /// Attempt failed.
    TaskFailed {
        task: TaskSnapshot,
        duration: Duration,
        error: String,
    },
    /// Task explicitly stopped.
    TaskStopped { task: TaskSnapshot },
    /// Task state changed outside the paths above.
    TaskUpdated { task: TaskSnapshot },
    /// Task removed from the registry.
    TaskRemoved { task_id: String },
    /// Scheduler (or one namespace) started.
    SchedulerStarted { running: bool, scope: Option<String> },
    /// Scheduler (or one namespace) stopped.
    SchedulerStopped { running: bool, scope: Option<String> },
}

impl SchedulerEvent {
    /// The discriminant of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            SchedulerEvent::TaskRegistered { .. } => EventKind::TaskRegistered,
            SchedulerEvent::TaskStarted { .. } => EventKind::TaskStarted,
            SchedulerEvent::TaskCompleted { .. } => EventKind::TaskCompleted,
            SchedulerEvent::TaskFailed { .. } => EventKind::TaskFailed,
            SchedulerEvent::TaskStopped { .. } => EventKind::TaskStopped,
            SchedulerEvent::TaskUpdated { .. } => EventKind::TaskUpdated,
            SchedulerEvent::TaskRemoved { .. } => EventKind::TaskRemoved,
            SchedulerEvent::SchedulerStarted { .. } => EventKind::SchedulerStarted,
            SchedulerEvent::SchedulerStopped { .. } => EventKind::SchedulerStopped,
        }
    }

    /// The id of the task this event concerns, if any.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            SchedulerEvent::TaskRegistered { task }
            | SchedulerEvent::TaskStarted { task }
            | SchedulerEvent::TaskCompleted { task, .. }
            | SchedulerEvent::TaskFailed { task, .. }
            | SchedulerEvent::TaskStopped { task }
            | SchedulerEvent::TaskUpdated { task } => Some(&task.id),
            SchedulerEvent::TaskRemoved { task_id } => Some(task_id),
            SchedulerEvent::SchedulerStarted { .. } | SchedulerEvent::SchedulerStopped { .. } => {
                None
            }
        }
    }
}
