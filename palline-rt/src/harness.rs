/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Task creation and lifetime control.
//!
//! [`Harness::spawn`] is the single entry point for starting a periodic
//! task.  It runs the creation pipeline in order and stops at the first
//! failure:
//!
//! ```text
//! TaskSpec ─► validate ─► SchedBinder::bind ─► TaskRegistry::insert
//!                                                      │
//!                                   launch ◄───────────┘
//!                                     │   (failure: descriptor removed)
//!                                     ▼
//!                                TaskHandle
//! ```
//!
//! The harness is `Sync`; any number of controller threads may spawn
//! concurrently while tasks are running.

use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::info;

use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::event::{NullObserver, Observer};
use crate::periodic::{NoWork, PeriodicTask, StopSignal, Workload};
use crate::registry::{RegistrySnapshot, TaskRegistry};
use crate::sched::SchedBinder;
use crate::task::{DeadlineAdvance, TaskDescriptor, TaskId, TaskSpec};

// ── Harness ───────────────────────────────────────────────────────────────────

pub struct Harness {
    registry: Arc<TaskRegistry>,
    binder: SchedBinder,
    observer: Arc<dyn Observer>,
    deadline_advance: DeadlineAdvance,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new(
            Arc::new(TaskRegistry::new()),
            SchedBinder::new(),
            Arc::new(NullObserver),
        )
    }
}

impl Harness {
    pub fn new(registry: Arc<TaskRegistry>, binder: SchedBinder, observer: Arc<dyn Observer>) -> Self {
        Self {
            registry,
            binder,
            observer,
            deadline_advance: DeadlineAdvance::default(),
        }
    }

    /// Build a harness from the `harness:` section of a config file.
    pub fn from_config(config: &HarnessConfig, observer: Arc<dyn Observer>) -> Self {
        let binder = SchedBinder::new()
            .with_priority_mode(config.priority_mode)
            .with_edf_budget(config.edf_budget);
        Self::new(
            Arc::new(TaskRegistry::with_capacity(config.max_tasks)),
            binder,
            observer,
        )
        .with_deadline_advance(config.deadline_advance)
    }

    pub fn with_deadline_advance(mut self, mode: DeadlineAdvance) -> Self {
        self.deadline_advance = mode;
        self
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        self.registry.snapshot()
    }

    pub fn next_free_id(&self) -> TaskId {
        self.registry.next_free_id()
    }

    /// Start a task with an empty workload slot.
    pub fn spawn(&self, spec: TaskSpec) -> Result<TaskHandle, HarnessError> {
        self.spawn_with(spec, Box::new(NoWork))
    }

    /// Start a periodic task running `workload` once per period.
    ///
    /// On success the descriptor is registered and the thread runs under the
    /// bound scheduling class.  On failure nothing stays registered.
    ///
    /// # Errors
    /// * [`TaskError`](crate::error::TaskError): invalid spec, duplicate id,
    ///   capacity reached.
    /// * [`SchedError`](crate::error::SchedError): priority out of range,
    ///   thread creation failure, policy refused by the OS.
    pub fn spawn_with(
        &self,
        spec: TaskSpec,
        workload: Box<dyn Workload>,
    ) -> Result<TaskHandle, HarnessError> {
        spec.validate()?;
        let binding = self.binder.bind(&spec)?;

        let descriptor = TaskDescriptor::from_spec(&spec, binding.priority);
        self.registry.insert(descriptor)?;

        let stop = Arc::new(StopSignal::new());
        let task = PeriodicTask::new(
            spec.id,
            Arc::clone(&self.registry),
            Arc::clone(&self.observer),
            workload,
            Arc::clone(&stop),
        )
        .with_edf(binding.edf)
        .with_deadline_advance(self.deadline_advance);

        let thread = match self.binder.launch(spec.id, &binding, move || task.run()) {
            Ok(thread) => thread,
            Err(e) => {
                self.registry.remove(spec.id);
                return Err(e.into());
            }
        };

        info!(
            task = spec.id,
            class = %spec.class,
            effective = binding.effective_class.short_name(),
            priority = binding.priority,
            period_ms = spec.period_ms,
            deadline_ms = spec.relative_deadline_ms,
            "task created"
        );

        Ok(TaskHandle {
            id: spec.id,
            stop,
            thread,
            registry: Arc::clone(&self.registry),
        })
    }
}

// ── TaskHandle ────────────────────────────────────────────────────────────────

/// Owner-side handle of a running task.
///
/// Dropping the handle detaches the task; it keeps running until the
/// process exits.
#[derive(Debug)]
pub struct TaskHandle {
    id: TaskId,
    stop: Arc<StopSignal>,
    thread: JoinHandle<Option<Option<TaskDescriptor>>>,
    registry: Arc<TaskRegistry>,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Current copy of the task's descriptor, `None` once it has stopped.
    pub fn descriptor(&self) -> Option<TaskDescriptor> {
        self.registry.task(self.id)
    }

    /// Ask the loop to stop.  A sleeping task wakes at once; a running one
    /// stops after its deadline check.  Does not wait.
    pub fn request_stop(&self) {
        self.stop.request();
    }

    /// Wait for the thread to exit and return the final descriptor.
    ///
    /// Blocks forever unless [`request_stop`](Self::request_stop) was called;
    /// otherwise returns once the current workload slot, if any, finishes.
    pub fn join(self) -> Result<Option<TaskDescriptor>, HarnessError> {
        let id = self.id;
        let outcome = self
            .thread
            .join()
            .map_err(|_| HarnessError::TaskPanicked { task: id })?;
        Ok(outcome.flatten())
    }

    /// [`request_stop`](Self::request_stop) followed by [`join`](Self::join).
    pub fn stop(self) -> Result<Option<TaskDescriptor>, HarnessError> {
        self.request_stop();
        self.join()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
