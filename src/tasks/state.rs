//! # Observable task state: status, execution records, snapshots.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::timers::Driver;

/// Lifecycle status of a task.
///
/// ```text
/// Stopped → Idle ⇄ Running → (Idle | Error) → Idle
/// ```
///
/// `Stopped` is both the initial state of every newly created task and the
/// terminal state reached via explicit stop calls; failures never move a task
/// to `Stopped` on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Scheduled and waiting for its next occurrence.
    Idle,
    /// Handler currently executing.
    Running,
    /// Not scheduled; requires an explicit start.
    Stopped,
    /// Last attempt failed (waiting on a retry or the next occurrence).
    Error,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Idle => "idle",
            TaskStatus::Running => "running",
            TaskStatus::Stopped => "stopped",
            TaskStatus::Error => "error",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logged outcome of a task attempt (scheduled, retry, or trigger).
///
/// Appended on every attempt, including failed retries; owned exclusively by
/// its task's bounded, newest-first history.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    /// Attempt start time.
    pub timestamp: DateTime<Utc>,
    /// Wall-clock handler duration.
    pub duration: Duration,
    /// Whether the handler completed without error.
    pub success: bool,
    /// Failure message for unsuccessful attempts.
    pub error: Option<String>,
}

/// Read-only projection of one task, as exposed to observers.
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    pub id: String,
    pub status: TaskStatus,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub execution_count: u64,
    /// Raw schedule string as registered.
    pub schedule: String,
    pub tags: Vec<String>,
    pub namespace: String,
    /// Effective timer driver for this task.
    pub driver: Driver,
    /// Most recent failure message while the task is in `Error` status.
    pub error: Option<String>,
}
