//! Built-in event observers (feature-gated).

mod log;

pub use log::LogObserver;
