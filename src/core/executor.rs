//! # Single-attempt execution with panic isolation.
//!
//! [`run_attempt`] drives one handler invocation to completion and converts
//! both error returns and panics into a [`TaskError`], so one misbehaving
//! handler can never take the scheduler down.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tracing::warn;

use crate::error::TaskError;
use crate::tasks::{ErrorCallback, ExecutionRecord, HandlerRef};

/// Outcome of one handler attempt.
pub(crate) struct AttemptOutcome {
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) duration: Duration,
    pub(crate) result: Result<(), TaskError>,
}

impl AttemptOutcome {
    pub(crate) fn record(&self) -> ExecutionRecord {
        ExecutionRecord {
            timestamp: self.started_at,
            duration: self.duration,
            success: self.result.is_ok(),
            error: self.result.as_ref().err().map(|e| e.message().to_string()),
        }
    }
}

/// Runs the handler once, catching panics.
pub(crate) async fn run_attempt(handler: &HandlerRef) -> AttemptOutcome {
    let started_at = Utc::now();
    let start = Instant::now();
    let result = match AssertUnwindSafe(handler.run()).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(TaskError::Panic {
            error: panic_message(panic),
        }),
    };
    AttemptOutcome {
        started_at,
        duration: start.elapsed(),
        result,
    }
}

/// Invokes a per-task error callback, swallowing (and logging) its panics.
pub(crate) fn invoke_error_callback(callback: &ErrorCallback, error: &TaskError, task_id: &str) {
    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| callback(error, task_id)));
    if let Err(panic) = outcome {
        warn!(
            task = task_id,
            panic = %panic_message(panic),
            "error callback panicked"
        );
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
