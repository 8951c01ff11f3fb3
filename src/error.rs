//! Error types used by the cronloom scheduler and task handlers.
//!
//! This module defines three error enums:
//!
//! - [`SchedulerError`] — errors raised synchronously by scheduler operations
//!   (invalid definitions, registry conflicts, unknown task ids).
//! - [`ScheduleError`] — schedule-string parsing and next-occurrence failures.
//! - [`TaskError`] — errors raised by individual handler executions.
//!
//! Nothing here is fatal to the process: handler failures are contained to the
//! offending task's state and history, and scheduling-computation failures move
//! the task to `Error` status without propagating to the caller.

use thiserror::Error;

/// Errors raised by scheduler operations.
///
/// All variants are raised synchronously at the call site and never leave the
/// registry in a partially mutated state.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// Task id was empty or whitespace-only.
    #[error("task id must be a non-empty string")]
    InvalidTaskId,

    /// A task with this id is already registered.
    #[error("task {0:?} already exists")]
    DuplicateTask(String),

    /// Operation referenced an unknown task id.
    ///
    /// Only returned by operations where an unknown id is a programmer error
    /// (e.g. [`start_task`](crate::Scheduler::start_task)); triggering or
    /// stopping a since-removed task is treated as a benign race and is a
    /// no-op instead.
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// The schedule string failed to parse.
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

impl SchedulerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            SchedulerError::InvalidTaskId => "invalid_task_id",
            SchedulerError::DuplicateTask(_) => "duplicate_task",
            SchedulerError::TaskNotFound(_) => "task_not_found",
            SchedulerError::Schedule(_) => "invalid_schedule",
        }
    }
}

/// Errors produced by schedule parsing and next-occurrence computation.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// The string is neither a valid interval (`"10s"`, `"5m"`, `"2h"`, `"1d"`)
    /// nor a valid 5/6-field cron expression.
    ///
    /// Both parse strategies are attempted in order (interval first); their
    /// individual diagnostics collapse into this single unified error.
    #[error("invalid schedule format: {input:?} (expected a cron expression or an interval like \"10s\")")]
    InvalidFormat {
        /// The offending schedule string.
        input: String,
    },

    /// The forward scan for the next cron occurrence was exhausted
    /// (roughly four years of candidates) without a match.
    #[error("cannot compute next occurrence for cron expression {expr:?}")]
    NextOccurrence {
        /// The cron expression whose search was exhausted.
        expr: String,
    },
}

/// Errors produced by task handler execution.
///
/// Recorded in the task's execution history and surfaced via the `TaskFailed`
/// event and the optional per-task error callback; never propagated up to
/// crash the scheduler.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum TaskError {
    /// Handler returned an error for this attempt.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Handler panicked; the panic was caught and converted.
    #[error("handler panicked: {error}")]
    Panic {
        /// Panic payload rendered as a message.
        error: String,
    },
}

impl TaskError {
    /// Creates a [`TaskError::Fail`] from any displayable error.
    pub fn fail(error: impl Into<String>) -> Self {
        TaskError::Fail {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Fail { .. } => "task_failed",
            TaskError::Panic { .. } => "task_panicked",
        }
    }

    /// The failure message as stored in execution history.
    pub fn message(&self) -> &str {
        match self {
            TaskError::Fail { error } | TaskError::Panic { error } => error,
        }
    }
}
