//! # In-memory task registry with a namespace index.
//!
//! [`TaskRegistry`] owns every [`TaskRecord`] keyed by task id and maintains a
//! secondary `namespace → ids` index so scoped queries and bulk start/stop
//! never scan the whole table.
//!
//! ## Rules
//! - **Unique ids**: `add()` rejects an id that is already registered and
//!   leaves the registry untouched.
//! - **Transactional index**: the namespace index is updated in the same call
//!   that mutates the primary map; the two can never disagree.
//! - **No policy**: the registry stores and looks up; status transitions and
//!   scheduling decisions belong to the scheduler.

use std::collections::{BTreeSet, HashMap, VecDeque};

use chrono::{DateTime, Utc};

use crate::error::SchedulerError;
use crate::schedule::ParsedSchedule;
use crate::tasks::{ExecutionRecord, HandlerRef, TaskOptions, TaskSnapshot, TaskSpec, TaskStatus};
use crate::timers::Driver;

/// Mutable bookkeeping for one registered task.
///
/// Created from a validated [`TaskSpec`] with its schedule already parsed;
/// every new record starts `Stopped` until the scheduler promotes it.
pub(crate) struct TaskRecord {
    pub(crate) id: String,
    pub(crate) schedule: String,
    pub(crate) parsed: ParsedSchedule,
    pub(crate) handler: HandlerRef,
    pub(crate) namespace: String,
    pub(crate) tags: Vec<String>,
    pub(crate) options: TaskOptions,
    pub(crate) status: TaskStatus,
    pub(crate) last_run: Option<DateTime<Utc>>,
    pub(crate) next_run: Option<DateTime<Utc>>,
    pub(crate) execution_count: u64,
    /// Newest-first, bounded by the scheduler's `max_history`.
    pub(crate) history: VecDeque<ExecutionRecord>,
}

impl TaskRecord {
    pub(crate) fn new(spec: TaskSpec, parsed: ParsedSchedule) -> Self {
        Self {
            id: spec.id,
            schedule: spec.schedule,
            parsed,
            handler: spec.handler,
            namespace: spec.namespace,
            tags: spec.tags,
            options: spec.options,
            status: TaskStatus::Stopped,
            last_run: None,
            next_run: None,
            execution_count: 0,
            history: VecDeque::new(),
        }
    }

    /// Prepends one attempt record, evicting the oldest beyond `cap`.
    pub(crate) fn push_record(&mut self, record: ExecutionRecord, cap: usize) {
        self.history.push_front(record);
        self.history.truncate(cap);
    }

    /// Read-only projection; `driver` is the effective driver after scheduler
    /// defaults are applied.
    pub(crate) fn snapshot(&self, driver: Driver) -> TaskSnapshot {
        let error = if self.status == TaskStatus::Error {
            self.history
                .iter()
                .find(|r| !r.success)
                .and_then(|r| r.error.clone())
        } else {
            None
        };
        TaskSnapshot {
            id: self.id.clone(),
            status: self.status,
            last_run: self.last_run,
            next_run: self.next_run,
            execution_count: self.execution_count,
            schedule: self.schedule.clone(),
            tags: self.tags.clone(),
            namespace: self.namespace.clone(),
            driver,
            error,
        }
    }
}

/// Primary task table plus the namespace index.
#[derive(Default)]
pub(crate) struct TaskRegistry {
    tasks: HashMap<String, TaskRecord>,
    namespaces: HashMap<String, BTreeSet<String>>,
}

impl TaskRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Inserts a record, failing on a duplicate id without any mutation.
    pub(crate) fn add(&mut self, record: TaskRecord) -> Result<(), SchedulerError> {
        if self.tasks.contains_key(&record.id) {
            return Err(SchedulerError::DuplicateTask(record.id));
        }
        self.namespaces
            .entry(record.namespace.clone())
            .or_default()
            .insert(record.id.clone());
        self.tasks.insert(record.id.clone(), record);
        Ok(())
    }

    pub(crate) fn get(&self, id: &str) -> Option<&TaskRecord> {
        self.tasks.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut TaskRecord> {
        self.tasks.get_mut(id)
    }

    /// Removes and returns a record, pruning its namespace bucket when empty.
    pub(crate) fn remove(&mut self, id: &str) -> Option<TaskRecord> {
        let record = self.tasks.remove(id)?;
        if let Some(ids) = self.namespaces.get_mut(&record.namespace) {
            ids.remove(id);
            if ids.is_empty() {
                self.namespaces.remove(&record.namespace);
            }
        }
        Some(record)
    }

    /// Task ids in a namespace, or every id when `scope` is `None`.
    ///
    /// Namespace-scoped results come back in stable (sorted) order.
    pub(crate) fn ids_in_scope(&self, scope: Option<&str>) -> Vec<String> {
        match scope {
            Some(ns) => self
                .namespaces
                .get(ns)
                .map(|ids| ids.iter().cloned().collect())
                .unwrap_or_default(),
            None => self.tasks.keys().cloned().collect(),
        }
    }

    pub(crate) fn records_in_scope(&self, scope: Option<&str>) -> Vec<&TaskRecord> {
        self.ids_in_scope(scope)
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }
}
