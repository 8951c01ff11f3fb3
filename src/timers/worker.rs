//! # Worker timer: delay tracking on a dedicated OS thread.
//!
//! The auxiliary thread owns a deadline heap and does nothing but measure
//! elapsed time, so wakeups stay accurate when the primary runtime is
//! throttled or busy. The thread never touches scheduler state and never
//! invokes a callback itself: it only signals "fire" back to the runtime.
//!
//! ## Architecture
//! ```text
//! schedule(delay, cb) ──► callbacks[id] = cb ──► cmd channel ──► worker thread
//!                                                                 (deadline heap,
//!                                                                  recv_timeout)
//! runtime dispatcher ◄─────────── fire channel ◄───────────────── deadline due
//!     └─► callbacks.remove(id) → cb()
//!
//! cancel(handle) ──► callbacks.remove(id)   (primary side, immediate)
//!                └─► cmd channel: Cancel    (worker side, best effort)
//! ```
//!
//! ## Rules
//! - Cancellation discards the callback association immediately: a fire
//!   signal still in flight finds no callback and is dropped.
//! - If the worker thread cannot be spawned, the timer degrades to a logged
//!   no-op stub instead of panicking: handles are issued but never fire.
//! - Dropping the timer closes the command channel; the worker thread and
//!   the runtime dispatcher exit on their own.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::warn;

use super::strategy::{TimerCallback, TimerHandle, TimerStrategy};

enum WorkerCmd {
    Schedule { id: u64, delay: Duration },
    Cancel { id: u64 },
}

type CallbackMap = Arc<Mutex<HashMap<u64, TimerCallback>>>;

/// Timer strategy backed by a dedicated timing thread.
///
/// Must be constructed inside a tokio runtime (the fire dispatcher runs on
/// it); the timing itself happens off-runtime.
pub struct ThreadTimer {
    /// `None` when the worker thread could not be spawned (degraded mode).
    cmd_tx: Option<std_mpsc::Sender<WorkerCmd>>,
    callbacks: CallbackMap,
    next_id: AtomicU64,
}

impl ThreadTimer {
    pub fn new() -> Self {
        let callbacks: CallbackMap = Arc::new(Mutex::new(HashMap::new()));
        let (cmd_tx, cmd_rx) = std_mpsc::channel::<WorkerCmd>();
        let (fire_tx, mut fire_rx) = mpsc::unbounded_channel::<u64>();

        let spawned = std::thread::Builder::new()
            .name("cronloom-timer".to_string())
            .spawn(move || worker_loop(cmd_rx, fire_tx));

        let cmd_tx = match spawned {
            Ok(_join) => Some(cmd_tx),
            Err(err) => {
                warn!(error = %err, "timer worker thread unavailable; timers degrade to no-ops");
                None
            }
        };

        // Dispatcher: receives fire signals and invokes callbacks on the
        // runtime. Exits when the worker thread drops its fire sender.
        let dispatch_callbacks = Arc::clone(&callbacks);
        tokio::spawn(async move {
            while let Some(id) = fire_rx.recv().await {
                let cb = dispatch_callbacks
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&id);
                if let Some(cb) = cb {
                    cb();
                }
            }
        });

        Self {
            cmd_tx,
            callbacks,
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of currently pending timers.
    pub fn pending_count(&self) -> usize {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for ThreadTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerStrategy for ThreadTimer {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let Some(cmd_tx) = &self.cmd_tx else {
            // Degraded mode: issue a handle that will never fire.
            return TimerHandle::new(id);
        };

        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, callback);

        if cmd_tx.send(WorkerCmd::Schedule { id, delay }).is_err() {
            warn!(timer_id = id, "timer worker thread gone; dropping timer");
            self.callbacks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
        }
        TimerHandle::new(id)
    }

    fn cancel(&self, handle: TimerHandle) {
        // Discard the callback association first: an in-flight fire signal
        // for this id becomes a no-op even before the worker sees the cancel.
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle.id());
        if let Some(cmd_tx) = &self.cmd_tx {
            let _ = cmd_tx.send(WorkerCmd::Cancel { id: handle.id() });
        }
    }
}

/// Deadline loop running on the auxiliary thread.
fn worker_loop(cmd_rx: std_mpsc::Receiver<WorkerCmd>, fire_tx: mpsc::UnboundedSender<u64>) {
    let mut deadlines: BinaryHeap<Reverse<(Instant, u64)>> = BinaryHeap::new();
    let mut cancelled: HashSet<u64> = HashSet::new();

    loop {
        // Wait for the next command or the next deadline, whichever is first.
        let received = match deadlines.peek() {
            Some(Reverse((at, _))) => {
                let timeout = at.saturating_duration_since(Instant::now());
                match cmd_rx.recv_timeout(timeout) {
                    Ok(cmd) => Some(cmd),
                    Err(std_mpsc::RecvTimeoutError::Timeout) => None,
                    Err(std_mpsc::RecvTimeoutError::Disconnected) => return,
                }
            }
            None => match cmd_rx.recv() {
                Ok(cmd) => Some(cmd),
                Err(_) => return,
            },
        };

        match received {
            Some(WorkerCmd::Schedule { id, delay }) => {
                deadlines.push(Reverse((Instant::now() + delay, id)));
            }
            Some(WorkerCmd::Cancel { id }) => {
                // Only remember the id while its deadline is still queued.
                if deadlines.iter().any(|Reverse((_, qid))| *qid == id) {
                    cancelled.insert(id);
                }
            }
            None => {}
        }

        let now = Instant::now();
        while let Some(Reverse((at, id))) = deadlines.peek().copied() {
            if at > now {
                break;
            }
            deadlines.pop();
            if !cancelled.remove(&id) && fire_tx.send(id).is_err() {
                return;
            }
        }
    }
}
