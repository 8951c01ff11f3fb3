//! # Direct timer: `tokio::time::sleep` on the current runtime.
//!
//! One spawned task per pending timer; cancellation races are settled by the
//! pending map — whichever side removes the entry first wins, so a cancelled
//! handle's callback never fires.
//!
//! Must be constructed and used inside a tokio runtime.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::strategy::{TimerCallback, TimerHandle, TimerStrategy};

/// Timer strategy backed by the tokio runtime's own timer wheel.
///
/// Callbacks fire on the runtime that scheduled them. Accurate as long as the
/// runtime itself is not stalled; use [`ThreadTimer`](super::ThreadTimer)
/// when wakeups must survive a throttled or busy primary context.
pub struct TokioTimer {
    pending: Arc<Mutex<HashMap<u64, CancellationToken>>>,
    next_id: AtomicU64,
}

impl TokioTimer {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of currently pending timers.
    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for TokioTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerStrategy for TokioTimer {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, token.clone());

        let pending = Arc::clone(&self.pending);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    // The entry acts as the single-fire token: if cancel got
                    // there first, the callback is dropped unfired.
                    let live = pending
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .remove(&id)
                        .is_some();
                    if live {
                        callback();
                    }
                }
                _ = token.cancelled() => {}
            }
        });

        TimerHandle::new(id)
    }

    fn cancel(&self, handle: TimerHandle) {
        let token = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle.id());
        if let Some(token) = token {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let timer = TokioTimer::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        timer.schedule(
            Duration::from_millis(250),
            Box::new(move || {
                let _ = tx.send(tokio::time::Instant::now());
            }),
        );

        let start = tokio::time::Instant::now();
        let fired_at = rx.recv().await.expect("timer fired");
        assert!(fired_at - start >= Duration::from_millis(250));
        assert_eq!(timer.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_handle_never_fires() {
        let timer = TokioTimer::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = timer.schedule(
            Duration::from_millis(100),
            Box::new(move || {
                let _ = tx.send(());
            }),
        );
        timer.cancel(handle);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(timer.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handles_unique_among_pending() {
        let timer = TokioTimer::new();
        let a = timer.schedule(Duration::from_secs(60), Box::new(|| {}));
        let b = timer.schedule(Duration::from_secs(60), Box::new(|| {}));
        assert_ne!(a, b);
        assert_eq!(timer.pending_count(), 2);
        timer.cancel(a);
        timer.cancel(b);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_unknown_handle_is_noop() {
        let timer = TokioTimer::new();
        timer.cancel(TimerHandle::new(9999));
    }
}
