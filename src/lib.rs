//! # cronloom
//!
//! **Cronloom** is an in-process task scheduler for Rust.
//!
//! It runs registered async tasks on cron expressions or fixed intervals,
//! retries failures with exponential backoff, and exposes the lifecycle of
//! every task through snapshots and events. The crate is designed as a
//! building block for services that need recurring work without an external
//! job queue.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │   TaskSpec   │   │   TaskSpec   │   │   TaskSpec   │
//!     │ "*/5 * * * *"│   │    "30s"     │   │ "0 0 * * *"  │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Scheduler (orchestrator)                                         │
//! │  - TaskRegistry (records by id, namespace index)                  │
//! │  - pending timers (one per task, token-guarded)                   │
//! │  - strategy cache (per task × driver)                             │
//! │  - Bus (broadcast events) + on()/subscribe() tables               │
//! └──────┬──────────────────────┬─────────────────────────┬──────────┘
//!        ▼                      ▼                         ▼
//!   ┌───────────┐         ┌───────────┐             ┌───────────┐
//!   │ TokioTimer│         │ThreadTimer│             │ThreadTimer│
//!   │ (direct)  │         │ (worker)  │             │ (worker)  │
//!   └─────┬─────┘         └─────┬─────┘             └─────┬─────┘
//!         │ Fire{task,attempt,token}                      │
//!         ▼                     ▼                         ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  fire inbox (mpsc) ──► claim under lock ──► spawn execution       │
//! │     stale token?  drop      Running?  reschedule                  │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                       ┌────────────────────────┐
//!                       │   handler.run().await  │
//!                       │  (panics are caught)   │
//!                       └───┬────────────────┬───┘
//!                           ▼                ▼
//!                     success:           failure:
//!                     Idle, schedule     Error, retry backoff
//!                     next occurrence    (or next occurrence)
//! ```
//!
//! ### Task lifecycle
//! ```text
//! create_task ──► Stopped
//!     start / start_task ──► Idle (next occurrence armed)
//!         timer fires ──► Running
//!             ├─ Ok  ──► Idle, next occurrence armed
//!             └─ Err ──► Error
//!                  ├─ retry budget left ──► backoff delay, attempt + 1
//!                  └─ exhausted / no policy ──► next regular occurrence
//!     stop / stop_task ──► Stopped (pending timer cancelled)
//!     trigger_task ──► one out-of-band attempt, previous status restored
//! ```
//!
//! ## Features
//! | Area              | Description                                                         | Key types / traits                    |
//! |-------------------|---------------------------------------------------------------------|---------------------------------------|
//! | **Schedules**     | 5/6-field cron and `"10s"`-style intervals, fixed-offset timezones. | [`ParsedSchedule`], [`CronExpr`]      |
//! | **Retries**       | Exponential backoff between failed attempts of one occurrence.      | [`RetryPolicy`]                       |
//! | **Timers**        | Pluggable delay drivers, selectable per task.                       | [`TimerStrategy`], [`Driver`]         |
//! | **Tasks**         | Async handlers with namespaces, tags, and per-task options.         | [`TaskSpec`], [`TaskHandler`], [`HandlerFn`] |
//! | **Introspection** | Snapshots, bounded execution history, status machine.               | [`TaskSnapshot`], [`TaskStatus`]      |
//! | **Events**        | Broadcast stream plus synchronous per-kind handlers.                | [`SchedulerEvent`], [`EventKind`]     |
//! | **Errors**        | Typed errors for operations, schedules, and handler attempts.       | [`SchedulerError`], [`TaskError`]     |
//! | **Configuration** | Scheduler-wide defaults and construction-time plugins.              | [`SchedulerConfig`], [`SchedulerPlugin`] |
//!
//! ## Optional features
//! - `logging`: exports [`LogObserver`], a plugin draining events into
//!   `tracing` _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use cronloom::{HandlerFn, RetryPolicy, Scheduler, SchedulerConfig, TaskSpec};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let scheduler = Scheduler::new(SchedulerConfig::default());
//!
//!     let spec = TaskSpec::new(
//!         "heartbeat",
//!         "30s",
//!         HandlerFn::arc(|| async {
//!             println!("still alive");
//!             Ok(())
//!         }),
//!     )
//!     .with_retry(RetryPolicy {
//!         max_attempts: 3,
//!         initial_delay: Duration::from_millis(200),
//!         factor: 2.0,
//!     });
//!
//!     scheduler.create_task(spec).await?;
//!     scheduler.start(None).await;
//!
//!     // ... the task now runs every 30 seconds ...
//!
//!     scheduler.stop(None).await;
//!     Ok(())
//! }
//! ```

mod config;
mod core;
mod error;
mod events;
#[cfg(feature = "logging")]
mod observers;
mod plugin;
mod policies;
pub mod schedule;
mod tasks;
mod timers;

pub use config::{SchedulerConfig, DEFAULT_BUS_CAPACITY, DEFAULT_MAX_HISTORY};
pub use core::{ListenerId, Scheduler};
pub use error::{ScheduleError, SchedulerError, TaskError};
pub use events::{Bus, EventKind, SchedulerEvent};
pub use plugin::{PluginError, SchedulerPlugin};
pub use policies::RetryPolicy;
pub use schedule::{CronExpr, ParsedSchedule};
pub use tasks::{
    ErrorCallback, ExecutionRecord, HandlerFn, HandlerRef, TaskHandler, TaskOptions, TaskSnapshot,
    TaskSpec, TaskStatus, DEFAULT_NAMESPACE,
};
pub use timers::{Driver, ThreadTimer, TimerCallback, TimerHandle, TimerStrategy, TokioTimer};

#[cfg(feature = "logging")]
pub use observers::LogObserver;
