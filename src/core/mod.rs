//! Scheduler core: the registry of task records, the single-attempt executor,
//! and the orchestrating [`Scheduler`].

mod executor;
mod registry;
mod scheduler;

pub use scheduler::{ListenerId, Scheduler};
