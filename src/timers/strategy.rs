//! # Timer strategy abstraction.
//!
//! A [`TimerStrategy`] schedules a one-shot callback after a delay and returns
//! a cancellable [`TimerHandle`]. Implementations must guarantee:
//!
//! - a cancelled handle's callback **never** fires;
//! - firing happens at-or-after the requested delay (no early fire);
//! - each `schedule` call produces a handle unique among the currently
//!   pending handles of that strategy instance.

use std::time::Duration;

/// One-shot callback invoked when a timer fires.
///
/// Callbacks should be cheap (typically: push a message into a channel);
/// heavy work belongs in the receiver.
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Opaque handle identifying a pending timer within one strategy instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

impl TimerHandle {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    /// Numeric id, unique among pending handles of the issuing instance.
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Abstraction over "run this callback after `delay`, return a cancellable
/// handle".
pub trait TimerStrategy: Send + Sync + 'static {
    /// Schedules `callback` to fire once, at-or-after `delay` from now.
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle;

    /// Cancels a pending timer.
    ///
    /// After this returns the handle's callback will not be invoked, even if
    /// the underlying wakeup is already in flight. Cancelling an unknown or
    /// already-fired handle is a no-op.
    fn cancel(&self, handle: TimerHandle);
}
