/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The shared task registry and its guard.
//!
//! One process-wide lock protects every [`TaskDescriptor`] together with the
//! aggregate counters.  The controller takes it to insert a task; each
//! periodic thread takes it to read or advance its *own* descriptor.  Every
//! method holds the lock for one short field-group access and releases it
//! before returning, so nothing here is ever held across the absolute sleep.
//!
//! Tasks are keyed by id in a `BTreeMap` (deterministic snapshot order) and
//! the number of live tasks is capped by an explicit limit.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::TaskError;
use crate::task::{ActivationWindow, DeadlineAdvance, TaskDescriptor, TaskId};
use crate::time::TimeSpec;

/// Default cap on live tasks (the demo controller allows ids 1–99).
pub const DEFAULT_MAX_TASKS: usize = 99;

// ── Aggregate counters ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Totals {
    deadline_misses: u64,
    executions: u64,
    currently_executing: Option<TaskId>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    tasks: BTreeMap<TaskId, TaskDescriptor>,
    totals: Totals,
}

// ── Snapshot ──────────────────────────────────────────────────────────────────

/// Read-only copy of the registry taken under the guard.
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    /// Live tasks ordered by id.
    pub tasks: Vec<TaskDescriptor>,
    pub total_deadline_misses: u64,
    pub total_executions: u64,
    /// Task that most recently started and has not ended yet.
    pub currently_executing: Option<TaskId>,
}

impl RegistrySnapshot {
    /// Priorities shared by more than one task, with the ids sharing them.
    pub fn priority_groups(&self) -> BTreeMap<i32, Vec<TaskId>> {
        let mut groups: BTreeMap<i32, Vec<TaskId>> = BTreeMap::new();
        for task in &self.tasks {
            groups.entry(task.priority()).or_default().push(task.id());
        }
        groups.retain(|_, ids| ids.len() > 1);
        groups
    }
}

// ── TaskRegistry ──────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct TaskRegistry {
    inner: Mutex<RegistryInner>,
    max_tasks: usize,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_TASKS)
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry accepting at most `max_tasks` live tasks.
    pub fn with_capacity(max_tasks: usize) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            max_tasks,
        }
    }

    pub fn capacity(&self) -> usize {
        self.max_tasks
    }

    pub fn len(&self) -> usize {
        self.inner.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().tasks.is_empty()
    }

    // ── Controller side ───────────────────────────────────────────────────────

    /// Insert a new descriptor.  Rejects unusable timing and live ids, and
    /// enforces the cap.
    pub fn insert(&self, descriptor: TaskDescriptor) -> Result<(), TaskError> {
        descriptor.validate()?;
        let mut inner = self.inner.lock();
        let id = descriptor.id();
        if inner.tasks.contains_key(&id) {
            return Err(TaskError::DuplicateId { id });
        }
        if inner.tasks.len() >= self.max_tasks {
            return Err(TaskError::CapacityExceeded {
                limit: self.max_tasks,
            });
        }
        inner.tasks.insert(id, descriptor);
        Ok(())
    }

    /// Smallest id greater than every live id (`1` when empty).
    pub fn next_free_id(&self) -> TaskId {
        let inner = self.inner.lock();
        inner
            .tasks
            .keys()
            .next_back()
            .map_or(1, |last| last.saturating_add(1))
    }

    /// Release a descriptor, returning its final state.
    pub fn remove(&self, id: TaskId) -> Option<TaskDescriptor> {
        let mut inner = self.inner.lock();
        if inner.totals.currently_executing == Some(id) {
            inner.totals.currently_executing = None;
        }
        let removed = inner.tasks.remove(&id);
        if removed.is_some() {
            debug!(task = id, "descriptor released");
        }
        removed
    }

    // ── Observer side ─────────────────────────────────────────────────────────

    pub fn task(&self, id: TaskId) -> Option<TaskDescriptor> {
        self.inner.lock().tasks.get(&id).cloned()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let inner = self.inner.lock();
        RegistrySnapshot {
            tasks: inner.tasks.values().cloned().collect(),
            total_deadline_misses: inner.totals.deadline_misses,
            total_executions: inner.totals.executions,
            currently_executing: inner.totals.currently_executing,
        }
    }

    // ── Periodic-thread side ──────────────────────────────────────────────────

    fn with_task<R>(
        &self,
        id: TaskId,
        f: impl FnOnce(&mut TaskDescriptor, &mut Totals) -> R,
    ) -> Result<R, TaskError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let task = inner
            .tasks
            .get_mut(&id)
            .ok_or(TaskError::UnknownTask { id })?;
        Ok(f(task, &mut inner.totals))
    }

    /// Materialise the first activation / deadline pair from `now`.
    pub fn start_period(&self, id: TaskId, now: TimeSpec) -> Result<ActivationWindow, TaskError> {
        self.with_task(id, |task, _| task.start_period(now))
    }

    /// Copy of `next_activation`, for the caller to sleep on outside the lock.
    pub fn next_activation(&self, id: TaskId) -> Result<Option<TimeSpec>, TaskError> {
        self.with_task(id, |task, _| task.next_activation())
    }

    /// Move `next_activation` and `next_deadline` to the next period.
    pub fn advance(
        &self,
        id: TaskId,
        mode: DeadlineAdvance,
    ) -> Result<Option<ActivationWindow>, TaskError> {
        self.with_task(id, |task, _| task.advance(mode))
    }

    /// Deadline check and miss accounting in one critical section.
    ///
    /// Returns `(new_count, deadline)` when `now` is past the deadline.
    pub fn record_miss_if_late(
        &self,
        id: TaskId,
        now: &TimeSpec,
    ) -> Result<Option<(u64, TimeSpec)>, TaskError> {
        self.with_task(id, |task, totals| {
            let count = task.record_miss_if_late(now)?;
            totals.deadline_misses += 1;
            task.next_deadline().map(|deadline| (count, deadline))
        })
    }

    pub fn begin_execution(&self, id: TaskId) -> Result<(), TaskError> {
        self.with_task(id, |task, totals| {
            task.begin_execution();
            totals.executions += 1;
            totals.currently_executing = Some(id);
        })
    }

    pub fn end_execution(&self, id: TaskId) -> Result<(), TaskError> {
        self.with_task(id, |task, totals| {
            task.end_execution();
            if totals.currently_executing == Some(id) {
                totals.currently_executing = None;
            }
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{SchedClass, TaskSpec};
    use std::sync::Arc;

    fn desc(id: TaskId, priority: i32) -> TaskDescriptor {
        TaskDescriptor::from_spec(&TaskSpec::new(id, 100, 100, SchedClass::Fifo), priority)
    }

    // ── insert / remove ───────────────────────────────────────────────────────

    #[test]
    fn insert_rejects_duplicate_live_id() {
        let reg = TaskRegistry::new();
        reg.insert(desc(1, 10)).unwrap();
        assert_eq!(reg.insert(desc(1, 20)), Err(TaskError::DuplicateId { id: 1 }));
        assert_eq!(reg.task(1).unwrap().priority(), 10, "first insert untouched");
    }

    #[test]
    fn insert_rejects_unusable_timing() {
        let reg = TaskRegistry::new();
        let zero_period =
            TaskDescriptor::from_spec(&TaskSpec::new(4, 0, 0, SchedClass::Fifo), 10);
        let zero_deadline =
            TaskDescriptor::from_spec(&TaskSpec::new(5, 100, 0, SchedClass::Fifo), 10);
        assert_eq!(reg.insert(zero_period), Err(TaskError::ZeroPeriod { id: 4 }));
        assert_eq!(reg.insert(zero_deadline), Err(TaskError::ZeroDeadline { id: 5 }));
        assert!(reg.snapshot().tasks.is_empty());
    }

    #[test]
    fn insert_enforces_capacity() {
        let reg = TaskRegistry::with_capacity(2);
        reg.insert(desc(1, 0)).unwrap();
        reg.insert(desc(2, 0)).unwrap();
        assert_eq!(
            reg.insert(desc(3, 0)),
            Err(TaskError::CapacityExceeded { limit: 2 })
        );
        reg.remove(1).unwrap();
        reg.insert(desc(3, 0)).unwrap();
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn removed_id_can_be_reused() {
        let reg = TaskRegistry::new();
        reg.insert(desc(5, 0)).unwrap();
        assert!(reg.remove(5).is_some());
        assert!(reg.remove(5).is_none());
        reg.insert(desc(5, 0)).unwrap();
    }

    #[test]
    fn next_free_id_follows_highest_live_id() {
        let reg = TaskRegistry::new();
        assert_eq!(reg.next_free_id(), 1);
        reg.insert(desc(1, 0)).unwrap();
        reg.insert(desc(4, 0)).unwrap();
        assert_eq!(reg.next_free_id(), 5);
    }

    #[test]
    fn unknown_task_is_reported() {
        let reg = TaskRegistry::new();
        assert_eq!(
            reg.start_period(9, TimeSpec::now()),
            Err(TaskError::UnknownTask { id: 9 })
        );
        assert!(reg.begin_execution(9).is_err());
    }

    // ── timing / counters ─────────────────────────────────────────────────────

    #[test]
    fn miss_accounting_updates_task_and_totals() {
        let reg = TaskRegistry::new();
        reg.insert(desc(1, 0)).unwrap();
        reg.insert(desc(2, 0)).unwrap();
        let w = reg.start_period(1, TimeSpec::new(0, 0)).unwrap();
        reg.start_period(2, TimeSpec::new(0, 0)).unwrap();

        let late = w.next_deadline.advance_ms(1);
        assert_eq!(reg.record_miss_if_late(1, &late).unwrap(), Some((1, w.next_deadline)));
        assert_eq!(reg.record_miss_if_late(2, &w.next_deadline).unwrap(), None);

        let snap = reg.snapshot();
        assert_eq!(snap.total_deadline_misses, 1);
        assert_eq!(snap.tasks[0].missed_deadlines(), 1);
        assert_eq!(snap.tasks[1].missed_deadlines(), 0);
    }

    #[test]
    fn execution_totals_and_current_task() {
        let reg = TaskRegistry::new();
        reg.insert(desc(1, 0)).unwrap();
        reg.begin_execution(1).unwrap();
        assert_eq!(reg.snapshot().currently_executing, Some(1));
        reg.end_execution(1).unwrap();
        let snap = reg.snapshot();
        assert_eq!(snap.currently_executing, None);
        assert_eq!(snap.total_executions, 1);
    }

    #[test]
    fn advance_moves_only_the_named_task() {
        let reg = TaskRegistry::new();
        reg.insert(desc(1, 0)).unwrap();
        reg.insert(desc(2, 0)).unwrap();
        let w1 = reg.start_period(1, TimeSpec::new(0, 0)).unwrap();
        let w2 = reg.start_period(2, TimeSpec::new(0, 0)).unwrap();

        reg.advance(1, DeadlineAdvance::Period).unwrap();

        assert_eq!(
            reg.next_activation(1).unwrap(),
            Some(w1.next_activation.advance_ms(100))
        );
        assert_eq!(reg.next_activation(2).unwrap(), Some(w2.next_activation));
    }

    // ── snapshot helpers ──────────────────────────────────────────────────────

    #[test]
    fn priority_groups_list_only_shared_priorities() {
        let reg = TaskRegistry::new();
        reg.insert(desc(1, 50)).unwrap();
        reg.insert(desc(2, 10)).unwrap();
        reg.insert(desc(3, 50)).unwrap();
        let groups = reg.snapshot().priority_groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[&50], vec![1, 3]);
    }

    // ── concurrency ───────────────────────────────────────────────────────────

    #[test]
    fn concurrent_inserts_keep_every_descriptor_intact() {
        let reg = Arc::new(TaskRegistry::with_capacity(1_000));
        let writers: Vec<_> = (0..8u32)
            .map(|w| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    for k in 0..50u32 {
                        let id = w * 100 + k + 1;
                        let spec = TaskSpec::new(id, u64::from(id), u64::from(id), SchedClass::Fifo);
                        reg.insert(TaskDescriptor::from_spec(&spec, id as i32)).unwrap();
                        // interleave self-mutation with other writers' inserts
                        reg.start_period(id, TimeSpec::now()).unwrap();
                        reg.advance(id, DeadlineAdvance::Period).unwrap();
                    }
                })
            })
            .collect();
        for h in writers {
            h.join().unwrap();
        }

        let snap = reg.snapshot();
        assert_eq!(snap.tasks.len(), 400);
        for t in &snap.tasks {
            assert_eq!(t.period_ms(), u64::from(t.id()));
            assert_eq!(t.priority(), t.id() as i32);
            assert_eq!(t.missed_deadlines(), 0);
            assert_eq!(t.window().unwrap().index, 1);
        }
    }
}
