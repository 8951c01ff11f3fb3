//! # Scheduler: the orchestrator tying registry, timers, and events together.
//!
//! ```text
//!                    ┌────────────────────────────┐
//!  create_task ────► │  State (single async lock) │
//!  start/stop  ────► │   registry / timers /      │ ──► Bus + listeners
//!  trigger     ────► │   strategy cache           │
//!                    └──────────▲─────────────────┘
//!                               │ Fire { task, attempt, token }
//!                    ┌──────────┴─────────────────┐
//!                    │  fire inbox (mpsc) ◄── timer callbacks
//!                    └────────────────────────────┘
//! ```
//!
//! ## Rules
//! - **Single lock**: every task mutation happens under one `Mutex<State>`;
//!   the lock is never held across a handler await.
//! - **Fires are messages**: timer callbacks only push a [`Fire`] into the
//!   inbox; a background loop claims each fire under the lock and spawns the
//!   execution, so handlers for different tasks interleave freely.
//! - **Single-flight timers**: at most one pending timer per task. Each
//!   pending timer carries a token; a fire whose token no longer matches the
//!   pending entry is stale and is dropped.
//! - **Events after the lock**: events and snapshot notifications dispatch
//!   only after the state lock is released.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, warn};

use crate::config::SchedulerConfig;
use crate::core::executor::{self, AttemptOutcome};
use crate::core::registry::{TaskRecord, TaskRegistry};
use crate::error::{SchedulerError, TaskError};
use crate::events::{Bus, EventKind, SchedulerEvent};
use crate::schedule::{self, NextRunOptions};
use crate::tasks::{ErrorCallback, ExecutionRecord, TaskSnapshot, TaskSpec, TaskStatus};
use crate::timers::{Driver, TimerHandle, TimerStrategy};

/// Identifies one registered event handler or snapshot listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type EventHandler = Arc<dyn Fn(&SchedulerEvent) + Send + Sync>;
type SnapshotListener = Arc<dyn Fn(&[TaskSnapshot]) + Send + Sync>;

/// Timer fire delivered to the scheduler inbox.
struct Fire {
    task_id: String,
    attempt: u32,
    token: u64,
}

/// The currently pending timer for one task.
struct PendingTimer {
    token: u64,
    handle: TimerHandle,
    strategy: Arc<dyn TimerStrategy>,
}

/// Everything guarded by the scheduler lock.
struct State {
    registry: TaskRegistry,
    timers: HashMap<String, PendingTimer>,
    strategies: HashMap<(String, Driver), Arc<dyn TimerStrategy>>,
    running: bool,
}

struct Inner {
    config: SchedulerConfig,
    state: Mutex<State>,
    bus: Bus,
    on_table: RwLock<HashMap<EventKind, Vec<(u64, EventHandler)>>>,
    snapshot_listeners: RwLock<Vec<(u64, SnapshotListener)>>,
    next_listener_id: AtomicU64,
    next_token: AtomicU64,
    fire_tx: mpsc::UnboundedSender<Fire>,
}

/// In-process task scheduler.
///
/// Cheap to clone; all clones share one state. Must be constructed inside a
/// tokio runtime (construction spawns the fire-processing loop).
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Builds a scheduler and initializes its plugins.
    ///
    /// Plugin errors and panics are logged and skipped; they never prevent
    /// construction.
    pub fn new(config: SchedulerConfig) -> Self {
        let (fire_tx, mut fire_rx) = mpsc::unbounded_channel::<Fire>();
        let bus = Bus::new(config.bus_capacity);
        let inner = Arc::new(Inner {
            config,
            state: Mutex::new(State {
                registry: TaskRegistry::new(),
                timers: HashMap::new(),
                strategies: HashMap::new(),
                running: false,
            }),
            bus,
            on_table: RwLock::new(HashMap::new()),
            snapshot_listeners: RwLock::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
            next_token: AtomicU64::new(1),
            fire_tx,
        });

        // The loop holds only a weak reference so dropping the last external
        // handle tears the scheduler down.
        let weak: Weak<Inner> = Arc::downgrade(&inner);
        tokio::spawn(async move {
            while let Some(fire) = fire_rx.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                let scheduler = Scheduler { inner };
                tokio::spawn(async move {
                    scheduler.on_fire(fire).await;
                });
            }
        });

        let scheduler = Self { inner };
        for plugin in scheduler.inner.config.plugins.clone() {
            let name = plugin.name().to_string();
            debug!(plugin = %name, "initializing plugin");
            match std::panic::catch_unwind(AssertUnwindSafe(|| plugin.init(&scheduler))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(plugin = %name, error = %err, "plugin initialization failed")
                }
                Err(_) => warn!(plugin = %name, "plugin initialization panicked"),
            }
        }
        scheduler
    }

    // ------------------------------------------------------------------
    // Task lifecycle
    // ------------------------------------------------------------------

    /// Registers a task.
    ///
    /// Validation is fail-fast: an empty id, an unparsable schedule, or a
    /// duplicate id leaves the registry untouched. The task starts `Stopped`;
    /// when the scheduler is already running it is promoted to `Idle` and
    /// scheduled immediately.
    pub async fn create_task(&self, spec: TaskSpec) -> Result<(), SchedulerError> {
        if spec.id.trim().is_empty() {
            return Err(SchedulerError::InvalidTaskId);
        }
        let parsed = schedule::parse(&spec.schedule)?;
        let id = spec.id.clone();

        let mut events = Vec::new();
        let run_now = {
            let mut state = self.inner.state.lock().await;
            state.registry.add(TaskRecord::new(spec, parsed))?;
            let mut run_now = false;
            if state.running {
                if let Some(record) = state.registry.get_mut(&id) {
                    record.status = TaskStatus::Idle;
                    run_now = record.options.run_immediately;
                }
                self.schedule_locked(&mut state, &id, &mut events);
            }
            if let Some(record) = state.registry.get(&id) {
                events.insert(
                    0,
                    SchedulerEvent::TaskRegistered {
                        task: self.snapshot_of(record),
                    },
                );
            }
            run_now
        };
        self.dispatch(events).await;

        if run_now {
            let scheduler = self.clone();
            tokio::spawn(async move {
                scheduler.trigger_task(&id).await;
            });
        }
        Ok(())
    }

    /// Starts the scheduler, or only the tasks of one namespace.
    ///
    /// A global start on an already-running scheduler is a no-op; scoped
    /// starts always re-evaluate their namespace. Stopped tasks are promoted
    /// to `Idle` and scheduled; tasks with `run_immediately` also get one
    /// out-of-band trigger.
    pub async fn start(&self, scope: Option<&str>) {
        let mut events = Vec::new();
        let mut run_now = Vec::new();
        {
            let mut state = self.inner.state.lock().await;
            if scope.is_none() && state.running {
                return;
            }
            let ids = state.registry.ids_in_scope(scope);
            for id in ids {
                let mut should_schedule = false;
                if let Some(record) = state.registry.get_mut(&id) {
                    if record.status == TaskStatus::Stopped {
                        record.status = TaskStatus::Idle;
                        events.push(SchedulerEvent::TaskUpdated {
                            task: self.snapshot_of(record),
                        });
                    }
                    if record.status != TaskStatus::Running {
                        should_schedule = true;
                        if record.options.run_immediately {
                            run_now.push(id.clone());
                        }
                    }
                }
                if should_schedule {
                    self.schedule_locked(&mut state, &id, &mut events);
                }
            }
            if scope.is_none() {
                state.running = true;
            }
            events.push(SchedulerEvent::SchedulerStarted {
                running: state.running,
                scope: scope.map(String::from),
            });
        }
        self.dispatch(events).await;

        for id in run_now {
            let scheduler = self.clone();
            tokio::spawn(async move {
                scheduler.trigger_task(&id).await;
            });
        }
    }

    /// Stops the scheduler, or only the tasks of one namespace.
    ///
    /// Cancels pending timers and moves affected tasks to `Stopped`. A task
    /// whose handler is mid-flight finishes its attempt but stays `Stopped`
    /// afterwards and is not rescheduled. A global stop on an already-stopped
    /// scheduler is a no-op.
    pub async fn stop(&self, scope: Option<&str>) {
        let mut events = Vec::new();
        {
            let mut state = self.inner.state.lock().await;
            if scope.is_none() && !state.running {
                return;
            }
            let ids = state.registry.ids_in_scope(scope);
            for id in ids {
                if let Some(pending) = state.timers.remove(&id) {
                    pending.strategy.cancel(pending.handle);
                }
                if let Some(record) = state.registry.get_mut(&id) {
                    if record.status != TaskStatus::Stopped {
                        record.status = TaskStatus::Stopped;
                        record.next_run = None;
                        events.push(SchedulerEvent::TaskUpdated {
                            task: self.snapshot_of(record),
                        });
                    }
                }
            }
            if scope.is_none() {
                state.running = false;
            }
            events.push(SchedulerEvent::SchedulerStopped {
                running: state.running,
                scope: scope.map(String::from),
            });
        }
        self.dispatch(events).await;
    }

    /// Starts one task, scheduling its next occurrence.
    ///
    /// Unlike the bulk operations this errors on an unknown id (starting a
    /// task that was never registered is a programmer error). A task that is
    /// currently `Running` is left alone. Works even while the scheduler
    /// itself is stopped.
    pub async fn start_task(&self, id: &str) -> Result<(), SchedulerError> {
        let mut events = Vec::new();
        {
            let mut state = self.inner.state.lock().await;
            match state.registry.get_mut(id) {
                None => return Err(SchedulerError::TaskNotFound(id.to_string())),
                Some(record) => {
                    if record.status == TaskStatus::Running {
                        return Ok(());
                    }
                    record.status = TaskStatus::Idle;
                }
            }
            self.schedule_locked(&mut state, id, &mut events);
            if let Some(record) = state.registry.get(id) {
                events.insert(
                    0,
                    SchedulerEvent::TaskStarted {
                        task: self.snapshot_of(record),
                    },
                );
            }
        }
        self.dispatch(events).await;
        Ok(())
    }

    /// Stops one task, cancelling its pending timer. Unknown ids are a no-op.
    pub async fn stop_task(&self, id: &str) {
        let mut events = Vec::new();
        {
            let mut state = self.inner.state.lock().await;
            if let Some(pending) = state.timers.remove(id) {
                pending.strategy.cancel(pending.handle);
            }
            if let Some(record) = state.registry.get_mut(id) {
                record.status = TaskStatus::Stopped;
                record.next_run = None;
                events.push(SchedulerEvent::TaskStopped {
                    task: self.snapshot_of(record),
                });
            }
        }
        self.dispatch(events).await;
    }

    /// Runs one out-of-band attempt immediately.
    ///
    /// Does not consume or reschedule the task's pending timer, never
    /// retries, and restores the task's previous status when the attempt
    /// finishes. A task already `Running` — or an unknown id — is a no-op.
    pub async fn trigger_task(&self, id: &str) {
        self.execute(id, 0, true).await;
    }

    /// Stops and removes a task, dropping its cached timer strategies.
    ///
    /// Returns whether the task existed.
    pub async fn remove_task(&self, id: &str) -> bool {
        let mut events = Vec::new();
        let removed = {
            let mut state = self.inner.state.lock().await;
            if let Some(pending) = state.timers.remove(id) {
                pending.strategy.cancel(pending.handle);
            }
            match state.registry.remove(id) {
                Some(mut record) => {
                    record.status = TaskStatus::Stopped;
                    record.next_run = None;
                    events.push(SchedulerEvent::TaskStopped {
                        task: self.snapshot_of(&record),
                    });
                    events.push(SchedulerEvent::TaskRemoved {
                        task_id: id.to_string(),
                    });
                    state.strategies.retain(|(task, _), _| task != id);
                    true
                }
                None => false,
            }
        };
        self.dispatch(events).await;
        removed
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Snapshot of one task.
    pub async fn task(&self, id: &str) -> Option<TaskSnapshot> {
        let state = self.inner.state.lock().await;
        state.registry.get(id).map(|r| self.snapshot_of(r))
    }

    /// Snapshots of all tasks, optionally restricted to one namespace.
    pub async fn tasks(&self, namespace: Option<&str>) -> Vec<TaskSnapshot> {
        let state = self.inner.state.lock().await;
        state
            .registry
            .records_in_scope(namespace)
            .into_iter()
            .map(|r| self.snapshot_of(r))
            .collect()
    }

    /// Execution history of one task, newest first.
    pub async fn history(&self, id: &str) -> Vec<ExecutionRecord> {
        let state = self.inner.state.lock().await;
        state
            .registry
            .get(id)
            .map(|r| r.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether a global start is in effect.
    pub async fn is_running(&self) -> bool {
        self.inner.state.lock().await.running
    }

    /// Effective timer driver for a task (scheduler default for unknown ids).
    pub async fn task_driver(&self, id: &str) -> Driver {
        let state = self.inner.state.lock().await;
        state
            .registry
            .get(id)
            .and_then(|r| r.options.driver)
            .unwrap_or(self.inner.config.driver)
    }

    /// The scheduler-wide default timer driver.
    pub fn default_driver(&self) -> Driver {
        self.inner.config.driver
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    /// Registers a synchronous handler for one event kind.
    ///
    /// Handlers run on the scheduler's execution path; keep them cheap. For
    /// async consumption use [`events`](Scheduler::events). A handler may
    /// re-enter the subscription API (e.g. a one-shot handler removing
    /// itself via [`off`](Scheduler::off)).
    pub fn on<F>(&self, kind: EventKind, handler: F) -> ListenerId
    where
        F: Fn(&SchedulerEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        let mut table = self
            .inner
            .on_table
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        table.entry(kind).or_default().push((id, Arc::new(handler)));
        ListenerId(id)
    }

    /// Removes a handler registered with [`on`](Scheduler::on).
    pub fn off(&self, id: ListenerId) {
        let mut table = self
            .inner
            .on_table
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for handlers in table.values_mut() {
            handlers.retain(|(hid, _)| *hid != id.0);
        }
    }

    /// Registers a listener receiving the full snapshot set after every state
    /// change.
    ///
    /// Like [`on`](Scheduler::on) handlers, a listener may re-enter the
    /// subscription API from inside its callback.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&[TaskSnapshot]) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .snapshot_listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        ListenerId(id)
    }

    /// Removes a listener registered with [`subscribe`](Scheduler::subscribe).
    pub fn unsubscribe(&self, id: ListenerId) {
        self.inner
            .snapshot_listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(lid, _)| *lid != id.0);
    }

    /// Async event stream (see [`Bus`] for lag semantics).
    pub fn events(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.inner.bus.subscribe()
    }

    // ------------------------------------------------------------------
    // Execution path
    // ------------------------------------------------------------------

    async fn on_fire(&self, fire: Fire) {
        {
            let mut state = self.inner.state.lock().await;
            let current = state
                .timers
                .get(&fire.task_id)
                .map_or(false, |pending| pending.token == fire.token);
            if !current {
                // Stale: the timer was cancelled or replaced after this fire
                // was already in flight.
                return;
            }
            state.timers.remove(&fire.task_id);
        }
        self.execute(&fire.task_id, fire.attempt, false).await;
    }

    /// Runs one attempt of a task: scheduled/retry (`trigger == false`) or
    /// out-of-band (`trigger == true`).
    async fn execute(&self, id: &str, attempt: u32, trigger: bool) {
        // Phase 1: claim the task and flip it to Running.
        let mut events = Vec::new();
        let claimed = {
            let mut state = self.inner.state.lock().await;
            let claimed = match state.registry.get_mut(id) {
                None => None,
                Some(record) => match (trigger, record.status) {
                    (_, TaskStatus::Running) => None,
                    (false, TaskStatus::Stopped) => None,
                    (_, status) => {
                        record.status = TaskStatus::Running;
                        record.last_run = Some(Utc::now());
                        record.execution_count += 1;
                        Some((record.handler.clone(), status))
                    }
                },
            };
            if claimed.is_some() {
                if let Some(record) = state.registry.get(id) {
                    events.push(SchedulerEvent::TaskStarted {
                        task: self.snapshot_of(record),
                    });
                }
            } else if !trigger {
                // A scheduled fire collided with an in-flight trigger: skip
                // this occurrence but keep the task on its schedule.
                let mid_trigger = state
                    .registry
                    .get(id)
                    .map_or(false, |record| record.status == TaskStatus::Running);
                if mid_trigger {
                    self.schedule_locked(&mut state, id, &mut events);
                }
            }
            claimed
        };
        let Some((handler, prev_status)) = claimed else {
            self.dispatch(events).await;
            return;
        };
        self.dispatch(events).await;

        // Handler runs without the lock; panics are contained.
        let outcome = executor::run_attempt(&handler).await;

        // Phase 2: record the outcome and decide what happens next.
        let (events, error_callback) = self.settle(id, attempt, trigger, prev_status, outcome).await;
        self.dispatch(events).await;
        if let Some((callback, error)) = error_callback {
            executor::invoke_error_callback(&callback, &error, id);
        }
    }

    async fn settle(
        &self,
        id: &str,
        attempt: u32,
        trigger: bool,
        prev_status: TaskStatus,
        outcome: AttemptOutcome,
    ) -> (Vec<SchedulerEvent>, Option<(ErrorCallback, TaskError)>) {
        let mut events = Vec::new();
        let mut error_callback = None;

        let mut state = self.inner.state.lock().await;
        // Stopped mid-flight (or removed): park without rescheduling.
        let (stopped, failure) = match state.registry.get_mut(id) {
            None => return (events, None),
            Some(record) => {
                record.push_record(outcome.record(), self.inner.config.max_history);
                let stopped = record.status == TaskStatus::Stopped;
                let failure = match &outcome.result {
                    Ok(()) => None,
                    Err(error) => {
                        if let Some(callback) = record.options.on_error.clone() {
                            error_callback = Some((callback, error.clone()));
                        }
                        Some(error.clone())
                    }
                };
                if !stopped {
                    record.status = match (&failure, trigger) {
                        (None, true) | (Some(_), true) => prev_status,
                        (None, false) => TaskStatus::Idle,
                        (Some(_), false) => TaskStatus::Error,
                    };
                }
                (stopped, failure)
            }
        };

        let duration = outcome.duration;
        match failure {
            None => {
                if !trigger && !stopped {
                    self.schedule_locked(&mut state, id, &mut events);
                }
                if let Some(record) = state.registry.get(id) {
                    events.insert(
                        0,
                        SchedulerEvent::TaskCompleted {
                            task: self.snapshot_of(record),
                            duration,
                        },
                    );
                }
            }
            Some(error) => {
                if !trigger && !stopped {
                    let retry_delay = state
                        .registry
                        .get(id)
                        .and_then(|r| r.options.retry.as_ref())
                        .and_then(|policy| policy.next_delay(attempt));
                    match retry_delay {
                        Some(delay) => {
                            if self.inner.config.debug {
                                debug!(
                                    task = id,
                                    attempt = attempt + 1,
                                    delay_ms = delay.as_millis() as u64,
                                    "scheduling retry"
                                );
                            }
                            self.schedule_fire_locked(&mut state, id, delay, attempt + 1);
                        }
                        // Retries exhausted (or no policy): fall back to the
                        // next regular occurrence.
                        None => self.schedule_locked(&mut state, id, &mut events),
                    }
                }
                if let Some(record) = state.registry.get(id) {
                    events.insert(
                        0,
                        SchedulerEvent::TaskFailed {
                            task: self.snapshot_of(record),
                            duration,
                            error: error.message().to_string(),
                        },
                    );
                }
            }
        }
        drop(state);
        (events, error_callback)
    }

    // ------------------------------------------------------------------
    // Scheduling (all under the state lock)
    // ------------------------------------------------------------------

    /// Schedules the next regular occurrence of a task, replacing any pending
    /// timer. A failed next-occurrence computation moves the task to `Error`.
    fn schedule_locked(&self, state: &mut State, id: &str, events: &mut Vec<SchedulerEvent>) {
        let Some(record) = state.registry.get(id) else { return };
        let parsed = record.parsed.clone();
        let opts = NextRunOptions {
            timezone: record.options.timezone.or(self.inner.config.timezone),
            last_run: record.last_run,
        };

        let now = Utc::now();
        match schedule::next_run(&parsed, now, opts) {
            Ok(next) => {
                let delay = (next - now).to_std().unwrap_or(Duration::ZERO);
                if self.inner.config.debug {
                    debug!(task = id, next = %next, delay_ms = delay.as_millis() as u64, "scheduling task");
                }
                self.schedule_fire_locked(state, id, delay, 0);
                if let Some(record) = state.registry.get_mut(id) {
                    record.next_run = Some(next);
                }
            }
            Err(error) => {
                warn!(task = id, error = %error, "failed to compute next occurrence");
                if let Some(pending) = state.timers.remove(id) {
                    pending.strategy.cancel(pending.handle);
                }
                if let Some(record) = state.registry.get_mut(id) {
                    record.status = TaskStatus::Error;
                    record.next_run = None;
                    events.push(SchedulerEvent::TaskUpdated {
                        task: self.snapshot_of(record),
                    });
                }
            }
        }
    }

    /// Installs the pending timer for a task: cancels the previous one,
    /// issues a fresh token, and arms the strategy with a callback that posts
    /// a [`Fire`] into the inbox.
    fn schedule_fire_locked(&self, state: &mut State, id: &str, delay: Duration, attempt: u32) {
        if let Some(pending) = state.timers.remove(id) {
            pending.strategy.cancel(pending.handle);
        }
        let Some(record) = state.registry.get(id) else { return };
        let driver = record.options.driver.unwrap_or(self.inner.config.driver);
        let strategy = state
            .strategies
            .entry((id.to_string(), driver))
            .or_insert_with(|| driver.build())
            .clone();

        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        let fire_tx = self.inner.fire_tx.clone();
        let task_id = id.to_string();
        let handle = strategy.schedule(
            delay,
            Box::new(move || {
                let _ = fire_tx.send(Fire {
                    task_id,
                    attempt,
                    token,
                });
            }),
        );
        state.timers.insert(
            id.to_string(),
            PendingTimer {
                token,
                handle,
                strategy,
            },
        );
    }

    // ------------------------------------------------------------------
    // Event dispatch
    // ------------------------------------------------------------------

    fn snapshot_of(&self, record: &TaskRecord) -> TaskSnapshot {
        record.snapshot(record.options.driver.unwrap_or(self.inner.config.driver))
    }

    /// Emits events and notifies snapshot listeners. Must be called with the
    /// state lock released.
    async fn dispatch(&self, events: Vec<SchedulerEvent>) {
        if events.is_empty() {
            return;
        }
        for event in events {
            self.inner.bus.publish(event.clone());
            // Clone the matching handlers out before invoking: a handler may
            // call `on`/`off` from inside its callback, which needs the write
            // lock on the same thread.
            let handlers: Vec<EventHandler> = {
                let table = self
                    .inner
                    .on_table
                    .read()
                    .unwrap_or_else(PoisonError::into_inner);
                table
                    .get(&event.kind())
                    .map(|entries| entries.iter().map(|(_, h)| Arc::clone(h)).collect())
                    .unwrap_or_default()
            };
            for handler in handlers {
                handler(&event);
            }
        }
        let snapshots = self.tasks(None).await;
        // Same re-entrancy rule for snapshot listeners and `unsubscribe`.
        let listeners: Vec<SnapshotListener> = {
            let guard = self
                .inner
                .snapshot_listeners
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            guard.iter().map(|(_, l)| Arc::clone(l)).collect()
        };
        for listener in listeners {
            listener(&snapshots);
        }
    }

    #[cfg(test)]
    pub(crate) async fn has_pending_timer(&self, id: &str) -> bool {
        self.inner.state.lock().await.timers.contains_key(id)
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    use super::*;
    use crate::policies::RetryPolicy;
    use crate::tasks::HandlerFn;
    use tokio::time::Instant;

    fn direct_config() -> SchedulerConfig {
        SchedulerConfig {
            driver: Driver::Direct,
            ..Default::default()
        }
    }

    fn ok_spec(id: &str, schedule: &str) -> TaskSpec {
        TaskSpec::new(id, schedule, HandlerFn::arc(|| async { Ok(()) }))
    }

    fn failing_spec(id: &str, schedule: &str) -> TaskSpec {
        TaskSpec::new(
            id,
            schedule,
            HandlerFn::arc(|| async { Err(TaskError::fail("boom")) }),
        )
    }

    async fn wait_for(events: &mut broadcast::Receiver<SchedulerEvent>, kind: EventKind) {
        loop {
            match events.recv().await {
                Ok(event) if event.kind() == kind => return,
                Ok(_) => {}
                Err(err) => panic!("event stream closed: {err}"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_created_task_is_stopped_until_started() {
        let scheduler = Scheduler::new(direct_config());
        scheduler.create_task(ok_spec("t", "5s")).await.unwrap();
        let snap = scheduler.task("t").await.unwrap();
        assert_eq!(snap.status, TaskStatus::Stopped);
        assert_eq!(snap.execution_count, 0);
        assert!(snap.next_run.is_none());
        assert!(!scheduler.has_pending_timer("t").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_validation_is_fail_fast() {
        let scheduler = Scheduler::new(direct_config());
        assert!(matches!(
            scheduler.create_task(ok_spec("  ", "5s")).await,
            Err(SchedulerError::InvalidTaskId)
        ));
        assert!(matches!(
            scheduler.create_task(ok_spec("t", "not a schedule")).await,
            Err(SchedulerError::Schedule(_))
        ));
        assert!(scheduler.tasks(None).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_id_preserves_original() {
        let scheduler = Scheduler::new(direct_config());
        scheduler.create_task(ok_spec("t", "5s")).await.unwrap();
        let err = scheduler
            .create_task(ok_spec("t", "10s").in_namespace("other"))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::DuplicateTask(_)));
        let snap = scheduler.task("t").await.unwrap();
        assert_eq!(snap.schedule, "5s");
        assert_eq!(snap.namespace, "default");
        assert_eq!(scheduler.tasks(None).await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_first_fire_one_period_after_start() {
        let scheduler = Scheduler::new(direct_config());
        let fired: Arc<StdMutex<Vec<Instant>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = fired.clone();
        let spec = TaskSpec::new(
            "tick",
            "5s",
            HandlerFn::arc(move || {
                let sink = sink.clone();
                async move {
                    sink.lock().unwrap().push(Instant::now());
                    Ok(())
                }
            }),
        );
        scheduler.create_task(spec).await.unwrap();
        let mut events = scheduler.events();
        let t0 = Instant::now();
        scheduler.start(None).await;

        assert_eq!(
            scheduler.task("tick").await.unwrap().status,
            TaskStatus::Idle
        );
        wait_for(&mut events, EventKind::TaskCompleted).await;

        let times = fired.lock().unwrap().clone();
        assert_eq!(times.len(), 1);
        assert_eq!(times[0] - t0, Duration::from_secs(5));

        let snap = scheduler.task("tick").await.unwrap();
        assert_eq!(snap.execution_count, 1);
        assert_eq!(snap.status, TaskStatus::Idle);
        assert!(snap.next_run.is_some());
        assert!(scheduler.has_pending_timer("tick").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_backoff_timings() {
        let scheduler = Scheduler::new(direct_config());
        let fired: Arc<StdMutex<Vec<Instant>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = fired.clone();
        let spec = TaskSpec::new(
            "flaky",
            "1s",
            HandlerFn::arc(move || {
                let sink = sink.clone();
                async move {
                    sink.lock().unwrap().push(Instant::now());
                    Err(TaskError::fail("down"))
                }
            }),
        )
        .with_retry(RetryPolicy {
            max_attempts: 2,
            initial_delay: Duration::from_millis(100),
            factor: 2.0,
        });
        scheduler.create_task(spec).await.unwrap();
        let mut events = scheduler.events();
        let t0 = Instant::now();
        scheduler.start(None).await;

        for _ in 0..3 {
            wait_for(&mut events, EventKind::TaskFailed).await;
        }

        let times = fired.lock().unwrap().clone();
        assert_eq!(times.len(), 3);
        assert_eq!(times[0] - t0, Duration::from_secs(1));
        assert_eq!(times[1] - t0, Duration::from_millis(1_100));
        assert_eq!(times[2] - t0, Duration::from_millis(1_300));

        let snap = scheduler.task("flaky").await.unwrap();
        assert_eq!(snap.status, TaskStatus::Error);
        assert_eq!(snap.execution_count, 3);
        assert_eq!(snap.error.as_deref(), Some("down"));
        // retries exhausted: the regular cadence continues
        assert!(scheduler.has_pending_timer("flaky").await);

        let history = scheduler.history("flaky").await;
        assert_eq!(history.len(), 3);
        assert!(history.iter().all(|r| !r.success));
        assert!(history[0].timestamp >= history[2].timestamp);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_runs_once_and_restores_status() {
        let scheduler = Scheduler::new(direct_config());
        scheduler.create_task(ok_spec("t", "1h")).await.unwrap();

        scheduler.trigger_task("t").await;

        let snap = scheduler.task("t").await.unwrap();
        assert_eq!(snap.execution_count, 1);
        assert_eq!(snap.status, TaskStatus::Stopped);
        // a trigger never arms a timer
        assert!(!scheduler.has_pending_timer("t").await);
        assert_eq!(scheduler.history("t").await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_failure_does_not_retry() {
        let scheduler = Scheduler::new(direct_config());
        let spec = failing_spec("t", "1h").with_retry(RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(10),
            factor: 2.0,
        });
        scheduler.create_task(spec).await.unwrap();

        scheduler.trigger_task("t").await;

        let snap = scheduler.task("t").await.unwrap();
        assert_eq!(snap.execution_count, 1);
        assert_eq!(snap.status, TaskStatus::Stopped);
        assert!(!scheduler.has_pending_timer("t").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_unknown_task_is_noop() {
        let scheduler = Scheduler::new(direct_config());
        scheduler.trigger_task("ghost").await;
        scheduler.stop_task("ghost").await;
        assert!(!scheduler.remove_task("ghost").await);
        assert!(matches!(
            scheduler.start_task("ghost").await,
            Err(SchedulerError::TaskNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_task_cancels_pending_timer() {
        let scheduler = Scheduler::new(direct_config());
        scheduler.create_task(ok_spec("t", "5s")).await.unwrap();
        scheduler.start(None).await;
        assert!(scheduler.has_pending_timer("t").await);

        scheduler.stop_task("t").await;
        let snap = scheduler.task("t").await.unwrap();
        assert_eq!(snap.status, TaskStatus::Stopped);
        assert!(snap.next_run.is_none());
        assert!(!scheduler.has_pending_timer("t").await);

        // the cancelled occurrence never lands
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(scheduler.task("t").await.unwrap().execution_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_stop_parks_everything() {
        let scheduler = Scheduler::new(direct_config());
        scheduler.create_task(ok_spec("a", "5s")).await.unwrap();
        scheduler.create_task(ok_spec("b", "7s")).await.unwrap();
        scheduler.start(None).await;
        assert!(scheduler.is_running().await);

        scheduler.stop(None).await;
        assert!(!scheduler.is_running().await);
        for snap in scheduler.tasks(None).await {
            assert_eq!(snap.status, TaskStatus::Stopped);
        }
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(scheduler
            .tasks(None)
            .await
            .iter()
            .all(|s| s.execution_count == 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_namespace_scoped_start_and_stop() {
        let scheduler = Scheduler::new(direct_config());
        scheduler
            .create_task(ok_spec("j1", "5s").in_namespace("jobs"))
            .await
            .unwrap();
        scheduler
            .create_task(ok_spec("j2", "5s").in_namespace("jobs"))
            .await
            .unwrap();
        scheduler.create_task(ok_spec("d1", "5s")).await.unwrap();

        scheduler.start(Some("jobs")).await;
        // scoped start does not flip the global flag
        assert!(!scheduler.is_running().await);
        assert_eq!(scheduler.tasks(Some("jobs")).await.len(), 2);
        for snap in scheduler.tasks(Some("jobs")).await {
            assert_eq!(snap.status, TaskStatus::Idle);
        }
        assert_eq!(
            scheduler.task("d1").await.unwrap().status,
            TaskStatus::Stopped
        );

        scheduler.stop(Some("jobs")).await;
        for snap in scheduler.tasks(Some("jobs")).await {
            assert_eq!(snap.status, TaskStatus::Stopped);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_start_is_idempotent() {
        let scheduler = Scheduler::new(direct_config());
        scheduler.create_task(ok_spec("t", "5s")).await.unwrap();
        let started = Arc::new(AtomicUsize::new(0));
        let counter = started.clone();
        scheduler.on(EventKind::SchedulerStarted, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        scheduler.start(None).await;
        scheduler.start(None).await;
        scheduler.start(None).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert!(scheduler.has_pending_timer("t").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_start_task_keeps_single_pending_timer() {
        let scheduler = Scheduler::new(direct_config());
        scheduler.create_task(ok_spec("t", "5s")).await.unwrap();
        for _ in 0..3 {
            scheduler.start_task("t").await.unwrap();
        }
        let mut events = scheduler.events();
        wait_for(&mut events, EventKind::TaskCompleted).await;
        // older timers were replaced, not stacked
        assert_eq!(scheduler.task("t").await.unwrap().execution_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_while_running_schedules_immediately() {
        let scheduler = Scheduler::new(direct_config());
        scheduler.start(None).await;
        scheduler.create_task(ok_spec("late", "5s")).await.unwrap();
        let snap = scheduler.task("late").await.unwrap();
        assert_eq!(snap.status, TaskStatus::Idle);
        assert!(snap.next_run.is_some());
        assert!(scheduler.has_pending_timer("late").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_immediately_triggers_on_start() {
        let scheduler = Scheduler::new(direct_config());
        let fired: Arc<StdMutex<Vec<Instant>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = fired.clone();
        let spec = TaskSpec::new(
            "eager",
            "1h",
            HandlerFn::arc(move || {
                let sink = sink.clone();
                async move {
                    sink.lock().unwrap().push(Instant::now());
                    Ok(())
                }
            }),
        )
        .run_immediately();
        scheduler.create_task(spec).await.unwrap();
        let mut events = scheduler.events();
        let t0 = Instant::now();
        scheduler.start(None).await;
        wait_for(&mut events, EventKind::TaskCompleted).await;

        let times = fired.lock().unwrap().clone();
        assert_eq!(times.len(), 1);
        assert_eq!(times[0] - t0, Duration::ZERO);
        // the regular occurrence stays armed
        assert!(scheduler.has_pending_timer("eager").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_is_bounded_and_newest_first() {
        let scheduler = Scheduler::new(SchedulerConfig {
            driver: Driver::Direct,
            max_history: 3,
            ..Default::default()
        });
        scheduler.create_task(failing_spec("t", "1h")).await.unwrap();
        for _ in 0..5 {
            scheduler.trigger_task("t").await;
        }
        let snap = scheduler.task("t").await.unwrap();
        assert_eq!(snap.execution_count, 5);
        let history = scheduler.history("t").await;
        assert_eq!(history.len(), 3);
        assert!(history[0].timestamp >= history[1].timestamp);
        assert!(history[1].timestamp >= history[2].timestamp);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_callback_receives_failures() {
        let scheduler = Scheduler::new(direct_config());
        let seen: Arc<StdMutex<Vec<String>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        let spec = failing_spec("t", "1h").on_error(move |error, task_id| {
            sink.lock()
                .unwrap()
                .push(format!("{task_id}:{}", error.message()));
        });
        scheduler.create_task(spec).await.unwrap();
        scheduler.trigger_task("t").await;

        assert_eq!(seen.lock().unwrap().clone(), vec!["t:boom".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_handler_is_contained() {
        let scheduler = Scheduler::new(direct_config());
        let spec = TaskSpec::new(
            "t",
            "1h",
            HandlerFn::arc(|| async { panic!("handler bug") }),
        );
        scheduler.create_task(spec).await.unwrap();
        scheduler.trigger_task("t").await;

        let history = scheduler.history("t").await;
        assert_eq!(history.len(), 1);
        assert!(!history[0].success);
        assert_eq!(history[0].error.as_deref(), Some("handler bug"));
        // scheduler still serves requests afterwards
        scheduler.create_task(ok_spec("u", "5s")).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_and_subscribe_lifecycle() {
        let scheduler = Scheduler::new(direct_config());
        let registered = Arc::new(AtomicUsize::new(0));
        let notified = Arc::new(AtomicUsize::new(0));

        let counter = registered.clone();
        let on_id = scheduler.on(EventKind::TaskRegistered, move |event| {
            assert_eq!(event.task_id(), Some("a"));
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = notified.clone();
        let sub_id = scheduler.subscribe(move |snapshots| {
            assert!(!snapshots.is_empty());
            counter.fetch_add(1, Ordering::SeqCst);
        });

        scheduler.create_task(ok_spec("a", "5s")).await.unwrap();
        assert_eq!(registered.load(Ordering::SeqCst), 1);
        assert!(notified.load(Ordering::SeqCst) >= 1);

        scheduler.off(on_id);
        scheduler.unsubscribe(sub_id);
        let before = notified.load(Ordering::SeqCst);
        scheduler.create_task(ok_spec("b", "5s")).await.unwrap();
        assert_eq!(registered.load(Ordering::SeqCst), 1);
        assert_eq!(notified.load(Ordering::SeqCst), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_listener_can_remove_itself_from_its_own_callback() {
        let scheduler = Scheduler::new(direct_config());
        let notified = Arc::new(AtomicUsize::new(0));
        let handled = Arc::new(AtomicUsize::new(0));

        // Snapshot listener that unsubscribes itself on first delivery.
        let sub_slot: Arc<StdMutex<Option<ListenerId>>> = Arc::new(StdMutex::new(None));
        let counter = notified.clone();
        let slot = sub_slot.clone();
        let handle = scheduler.clone();
        let sub_id = scheduler.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = slot.lock().unwrap().take() {
                handle.unsubscribe(id);
            }
        });
        *sub_slot.lock().unwrap() = Some(sub_id);

        // Event handler that detaches itself the same way.
        let on_slot: Arc<StdMutex<Option<ListenerId>>> = Arc::new(StdMutex::new(None));
        let counter = handled.clone();
        let slot = on_slot.clone();
        let handle = scheduler.clone();
        let on_id = scheduler.on(EventKind::TaskRegistered, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = slot.lock().unwrap().take() {
                handle.off(id);
            }
        });
        *on_slot.lock().unwrap() = Some(on_id);

        // Must complete: re-entering the subscription API from a callback
        // cannot wedge dispatch.
        scheduler.create_task(ok_spec("a", "5s")).await.unwrap();
        assert_eq!(notified.load(Ordering::SeqCst), 1);
        assert_eq!(handled.load(Ordering::SeqCst), 1);

        // Both callbacks removed themselves after one delivery.
        scheduler.create_task(ok_spec("b", "5s")).await.unwrap();
        assert_eq!(notified.load(Ordering::SeqCst), 1);
        assert_eq!(handled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_running_attempt_wins() {
        let scheduler = Scheduler::new(direct_config());
        let spec = TaskSpec::new(
            "slow",
            "5s",
            HandlerFn::arc(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            }),
        );
        scheduler.create_task(spec).await.unwrap();
        let mut events = scheduler.events();
        scheduler.start(None).await;

        wait_for(&mut events, EventKind::TaskStarted).await;
        scheduler.stop_task("slow").await;
        assert_eq!(
            scheduler.task("slow").await.unwrap().status,
            TaskStatus::Stopped
        );

        // The in-flight attempt still runs to completion and is recorded.
        wait_for(&mut events, EventKind::TaskCompleted).await;
        let snap = scheduler.task("slow").await.unwrap();
        assert_eq!(snap.execution_count, 1);
        assert_eq!(snap.status, TaskStatus::Stopped);
        assert!(snap.next_run.is_none());
        assert!(!scheduler.has_pending_timer("slow").await);
        let history = scheduler.history("slow").await;
        assert_eq!(history.len(), 1);
        assert!(history[0].success);

        // Stopped means stopped: no later occurrences.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(scheduler.task("slow").await.unwrap().execution_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_fire_during_trigger_skips_and_rearms() {
        let scheduler = Scheduler::new(direct_config());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));
        let gauge = in_flight.clone();
        let high = max_in_flight.clone();
        let spec = TaskSpec::new(
            "slow",
            "5s",
            HandlerFn::arc(move || {
                let gauge = gauge.clone();
                let high = high.clone();
                async move {
                    let depth = gauge.fetch_add(1, Ordering::SeqCst) + 1;
                    high.fetch_max(depth, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(8)).await;
                    gauge.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        );
        scheduler.create_task(spec).await.unwrap();
        let mut events = scheduler.events();
        scheduler.start(None).await;

        let handle = scheduler.clone();
        let trigger = tokio::spawn(async move { handle.trigger_task("slow").await });
        wait_for(&mut events, EventKind::TaskStarted).await;

        // Walk past the scheduled occurrence while the trigger is mid-flight:
        // the occurrence is skipped, not run concurrently.
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(scheduler.task("slow").await.unwrap().execution_count, 1);
        // ...and the task re-armed instead of falling off its schedule.
        assert!(scheduler.has_pending_timer("slow").await);

        wait_for(&mut events, EventKind::TaskCompleted).await;
        trigger.await.unwrap();
        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
        let snap = scheduler.task("slow").await.unwrap();
        assert_eq!(snap.execution_count, 1);
        assert_eq!(snap.status, TaskStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_task_drops_state() {
        let scheduler = Scheduler::new(direct_config());
        scheduler.create_task(ok_spec("t", "5s")).await.unwrap();
        scheduler.start(None).await;
        assert!(scheduler.has_pending_timer("t").await);

        assert!(scheduler.remove_task("t").await);
        assert!(scheduler.task("t").await.is_none());
        assert!(!scheduler.has_pending_timer("t").await);
        assert!(!scheduler.remove_task("t").await);
        // the id is free for reuse
        scheduler.create_task(ok_spec("t", "10s")).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cron_task_gets_next_run_on_start() {
        use chrono::Timelike;

        let scheduler = Scheduler::new(direct_config());
        scheduler
            .create_task(ok_spec("nightly", "0 0 * * *"))
            .await
            .unwrap();
        scheduler.start(None).await;
        let snap = scheduler.task("nightly").await.unwrap();
        assert_eq!(snap.status, TaskStatus::Idle);
        let next = snap.next_run.unwrap();
        assert!(next > Utc::now());
        assert_eq!(next.with_timezone(&chrono::Local).time().hour(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_plugin_failures_do_not_prevent_construction() {
        struct Broken;
        impl crate::plugin::SchedulerPlugin for Broken {
            fn name(&self) -> &str {
                "broken"
            }
            fn init(&self, _: &Scheduler) -> Result<(), crate::plugin::PluginError> {
                Err("nope".into())
            }
        }
        struct Counting(Arc<AtomicUsize>);
        impl crate::plugin::SchedulerPlugin for Counting {
            fn name(&self) -> &str {
                "counting"
            }
            fn init(&self, scheduler: &Scheduler) -> Result<(), crate::plugin::PluginError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                scheduler.on(EventKind::TaskRegistered, |_| {});
                Ok(())
            }
        }

        let inits = Arc::new(AtomicUsize::new(0));
        let scheduler = Scheduler::new(SchedulerConfig {
            driver: Driver::Direct,
            plugins: vec![Arc::new(Broken), Arc::new(Counting(inits.clone()))],
            ..Default::default()
        });
        assert_eq!(inits.load(Ordering::SeqCst), 1);
        scheduler.create_task(ok_spec("t", "5s")).await.unwrap();
    }
}
