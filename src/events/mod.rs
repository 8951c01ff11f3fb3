//! Scheduler events: a closed set of typed lifecycle notifications and the
//! broadcast bus that distributes them.
//!
//! - [`SchedulerEvent`] / [`EventKind`]: tagged union of everything the
//!   scheduler announces, each variant with a concretely typed payload.
//! - [`Bus`]: thin wrapper over `tokio::sync::broadcast` for async observers.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{EventKind, SchedulerEvent};
