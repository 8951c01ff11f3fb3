//! # Event bus for broadcasting scheduler events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] providing
//! non-blocking publishing from the scheduler to any number of async
//! observers.
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks or awaits.
//! - **Bounded capacity**: a single ring buffer stores recent events; slow
//!   receivers observe `RecvError::Lagged(n)` and skip the `n` oldest items.
//! - **No persistence**: events are dropped when no receiver is subscribed.
//! - **Not load-bearing**: internal scheduler correctness never depends on an
//!   event being observed.

use tokio::sync::broadcast;

use super::event::SchedulerEvent;

/// Broadcast channel for scheduler events.
///
/// Cheap to clone (internally an `Arc`-backed sender); each
/// [`subscribe`](Bus::subscribe) call creates an independent receiver that
/// only observes events sent after it subscribed.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<SchedulerEvent>,
}

impl Bus {
    /// Creates a new bus with the given ring-buffer capacity (min 1, clamped).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all active receivers.
    ///
    /// Returns immediately; the event is dropped if nobody is subscribed.
    pub fn publish(&self, event: SchedulerEvent) {
        let _ = self.tx.send(event);
    }

    /// Creates a receiver observing subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.tx.subscribe()
    }
}
