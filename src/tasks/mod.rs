//! Task definitions: handler abstraction, status/state types, and the
//! [`TaskSpec`] callers hand to
//! [`Scheduler::create_task`](crate::Scheduler::create_task).
//!
//! - [`TaskHandler`] / [`HandlerFn`]: the async, zero-argument unit of work.
//! - [`TaskSpec`] / [`TaskOptions`]: identity, schedule string, and options.
//! - [`TaskStatus`], [`ExecutionRecord`], [`TaskSnapshot`]: observable state.

mod handler;
mod spec;
mod state;

pub use handler::{HandlerFn, HandlerRef, TaskHandler};
pub use spec::{ErrorCallback, TaskOptions, TaskSpec, DEFAULT_NAMESPACE};
pub use state::{ExecutionRecord, TaskSnapshot, TaskStatus};
