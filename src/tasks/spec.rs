//! # Task specification: identity, schedule string, handler, and options.
//!
//! A [`TaskSpec`] is what callers hand to
//! [`Scheduler::create_task`](crate::Scheduler::create_task). Identity and
//! schedule are validated at registration (fail-fast: an invalid spec never
//! results in a registered task).
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use cronloom::{Driver, HandlerFn, RetryPolicy, TaskSpec};
//!
//! let spec = TaskSpec::new(
//!     "sync-orders",
//!     "*/5 * * * *",
//!     HandlerFn::arc(|| async { Ok(()) }),
//! )
//! .in_namespace("billing")
//! .with_retry(RetryPolicy {
//!     max_attempts: 3,
//!     initial_delay: Duration::from_millis(200),
//!     factor: 2.0,
//! })
//! .with_driver(Driver::Direct)
//! .with_tags(["billing", "critical"]);
//! ```

use std::sync::Arc;

use chrono::FixedOffset;

use crate::error::TaskError;
use crate::policies::RetryPolicy;
use crate::tasks::handler::HandlerRef;
use crate::timers::Driver;

/// Default namespace for tasks that do not choose one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Callback invoked after a failed attempt, with the error and the task id.
///
/// Runs after the failure is recorded and the `TaskFailed` event emitted; its
/// own panics are caught and logged, never crashing the scheduler.
pub type ErrorCallback = Arc<dyn Fn(&TaskError, &str) + Send + Sync>;

/// Per-task options consulted by the scheduler.
#[derive(Clone, Default)]
pub struct TaskOptions {
    /// Retry policy for failed attempts (`None` = never retry).
    pub retry: Option<RetryPolicy>,
    /// Fixed UTC offset for cron evaluation (falls back to the scheduler
    /// default, then the local offset).
    pub timezone: Option<FixedOffset>,
    /// Timer driver preference (falls back to the scheduler default).
    pub driver: Option<Driver>,
    /// Trigger one out-of-band execution when the task is first scheduled.
    pub run_immediately: bool,
    /// Callback invoked after each failed attempt.
    pub on_error: Option<ErrorCallback>,
}

impl std::fmt::Debug for TaskOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskOptions")
            .field("retry", &self.retry)
            .field("timezone", &self.timezone)
            .field("driver", &self.driver)
            .field("run_immediately", &self.run_immediately)
            .field("on_error", &self.on_error.as_ref().map(|_| "..."))
            .finish()
    }
}

/// Definition of a schedulable task.
#[derive(Clone)]
pub struct TaskSpec {
    pub(crate) id: String,
    pub(crate) schedule: String,
    pub(crate) handler: HandlerRef,
    pub(crate) namespace: String,
    pub(crate) tags: Vec<String>,
    pub(crate) options: TaskOptions,
}

impl TaskSpec {
    /// Creates a spec in the default namespace with default options.
    pub fn new(
        id: impl Into<String>,
        schedule: impl Into<String>,
        handler: HandlerRef,
    ) -> Self {
        Self {
            id: id.into(),
            schedule: schedule.into(),
            handler,
            namespace: DEFAULT_NAMESPACE.to_string(),
            tags: Vec::new(),
            options: TaskOptions::default(),
        }
    }

    /// Places the task in a namespace for bulk start/stop/query operations.
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Sets the retry policy for failed attempts.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.options.retry = Some(retry);
        self
    }

    /// Sets the fixed UTC offset used for cron evaluation.
    pub fn with_timezone(mut self, offset: FixedOffset) -> Self {
        self.options.timezone = Some(offset);
        self
    }

    /// Sets the timer driver preference.
    pub fn with_driver(mut self, driver: Driver) -> Self {
        self.options.driver = Some(driver);
        self
    }

    /// Triggers one out-of-band execution when the task is first scheduled.
    pub fn run_immediately(mut self) -> Self {
        self.options.run_immediately = true;
        self
    }

    /// Sets a callback invoked after each failed attempt.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskError, &str) + Send + Sync + 'static,
    {
        self.options.on_error = Some(Arc::new(f));
        self
    }

    /// Attaches informational tags (carried through to snapshots).
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn schedule(&self) -> &str {
        &self.schedule
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl std::fmt::Debug for TaskSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSpec")
            .field("id", &self.id)
            .field("schedule", &self.schedule)
            .field("namespace", &self.namespace)
            .field("tags", &self.tags)
            .field("options", &self.options)
            .finish()
    }
}
