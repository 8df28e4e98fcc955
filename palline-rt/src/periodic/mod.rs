/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The periodic execution loop.
//!
//! Each task thread runs one [`PeriodicTask`]:
//!
//! ```text
//!  Initializing ──► start_period(now)
//!        │
//!        ▼
//!  ┌── Executing ── begin_execution · ExecutionStarted · workload
//!  │        │       end_execution · ExecutionEnded
//!  │        ▼
//!  │   Checking ─── check_deadline (DeadlineMissed on a miss)
//!  │        │
//!  │        ├── stop requested? ──► remove descriptor, return it
//!  │        ▼
//!  │   Sleeping ─── absolute sleep until next_activation (registry not held)
//!  │        │       a stop request cuts the sleep short ──► stop
//!  │        ▼
//!  └── Advancing ── next_activation += P, next_deadline per DeadlineAdvance
//! ```
//!
//! Activation instants are computed from the first activation only, never
//! from wake-up time, so lateness in one period does not shift the next.

pub mod monitor;

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, trace, warn};

use crate::error::TaskError;
use crate::event::{EventKind, LifecycleEvent, Observer};
use crate::registry::TaskRegistry;
use crate::sched::EdfRequest;
use crate::task::{DeadlineAdvance, TaskDescriptor, TaskId};
use crate::time::TimeSpec;

// ── Workloads ─────────────────────────────────────────────────────────────────

/// The work a task performs in its slot each period.
pub trait Workload: Send {
    fn run(&mut self, task: TaskId);
}

/// Empty slot.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoWork;

impl Workload for NoWork {
    fn run(&mut self, _task: TaskId) {}
}

/// Occupies the slot by sleeping for a fixed time (simulated execution).
#[derive(Debug, Clone, Copy)]
pub struct SimulatedSleep(pub Duration);

impl SimulatedSleep {
    pub fn from_millis(ms: u64) -> Self {
        Self(Duration::from_millis(ms))
    }
}

impl Workload for SimulatedSleep {
    fn run(&mut self, _task: TaskId) {
        std::thread::sleep(self.0);
    }
}

/// Burns CPU with a floating-point loop.
#[derive(Debug, Clone, Copy)]
pub struct CpuBurn {
    pub iterations: u64,
}

impl Workload for CpuBurn {
    fn run(&mut self, _task: TaskId) {
        let mut acc = 0.0_f64;
        for i in 0..self.iterations {
            let x = i as f64;
            acc += x.sin() * x.cos();
        }
        std::hint::black_box(acc);
    }
}

/// Adapts a closure into a [`Workload`].
pub struct WorkloadFn<F>(pub F);

impl<F> Workload for WorkloadFn<F>
where
    F: FnMut(TaskId) + Send,
{
    fn run(&mut self, task: TaskId) {
        (self.0)(task)
    }
}

// ── StopSignal ────────────────────────────────────────────────────────────────

/// Stop request shared between a task's handle and its loop.
///
/// The loop's absolute wait parks on the condvar, so a request wakes a
/// sleeping task at once instead of after the rest of its period.
#[derive(Debug, Default)]
pub struct StopSignal {
    requested: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        *self.requested.lock() = true;
        self.wake.notify_all();
    }

    pub fn is_requested(&self) -> bool {
        *self.requested.lock()
    }

    /// Wait until the monotonic clock reaches `wake_at` or a stop is
    /// requested, whichever comes first.  Returns `true` on a stop request.
    ///
    /// The condvar deadline is truncated to whole microseconds; the residue
    /// is slept with [`TimeSpec::sleep_until`] so the wake-up instant stays
    /// absolute.
    pub fn sleep_until(&self, wake_at: TimeSpec) -> bool {
        let mut requested = self.requested.lock();
        while !*requested {
            let remaining_us = wake_at.micros_since(&TimeSpec::now());
            if remaining_us <= 0 {
                break;
            }
            let deadline = Instant::now() + Duration::from_micros(remaining_us as u64);
            if self.wake.wait_until(&mut requested, deadline).timed_out() {
                break;
            }
        }
        if *requested {
            return true;
        }
        drop(requested);
        wake_at.sleep_until();
        self.is_requested()
    }
}

// ── PeriodicTask ──────────────────────────────────────────────────────────────

pub struct PeriodicTask {
    id: TaskId,
    registry: Arc<TaskRegistry>,
    observer: Arc<dyn Observer>,
    workload: Box<dyn Workload>,
    stop: Arc<StopSignal>,
    edf: Option<EdfRequest>,
    advance: DeadlineAdvance,
}

enum Flow {
    Continue,
    Stop,
}

impl PeriodicTask {
    pub fn new(
        id: TaskId,
        registry: Arc<TaskRegistry>,
        observer: Arc<dyn Observer>,
        workload: Box<dyn Workload>,
        stop: Arc<StopSignal>,
    ) -> Self {
        Self {
            id,
            registry,
            observer,
            workload,
            stop,
            edf: None,
            advance: DeadlineAdvance::default(),
        }
    }

    /// Request `SCHED_DEADLINE` once at loop start.
    pub fn with_edf(mut self, edf: Option<EdfRequest>) -> Self {
        self.edf = edf;
        self
    }

    pub fn with_deadline_advance(mut self, advance: DeadlineAdvance) -> Self {
        self.advance = advance;
        self
    }

    /// Run periods until a stop is requested.
    ///
    /// Returns the task's final descriptor, removed from the registry, or
    /// `None` if the descriptor vanished underneath the loop.
    pub fn run(mut self) -> Option<TaskDescriptor> {
        if let Some(req) = self.edf {
            match (req.apply)(&req.budget) {
                Ok(()) => debug!(task = self.id, budget = ?req.budget, "SCHED_DEADLINE applied"),
                Err(e) => warn!(
                    task = self.id,
                    error = %e,
                    "sched_setattr failed, continuing under creation policy"
                ),
            }
        }

        let window = match self.registry.start_period(self.id, TimeSpec::now()) {
            Ok(w) => w,
            Err(e) => {
                error!(task = self.id, error = %e, "cannot anchor first period");
                return None;
            }
        };
        debug!(
            task = self.id,
            first_activation = %window.first_activation,
            next_deadline = %window.next_deadline,
            "periodic loop started"
        );

        loop {
            match self.cycle() {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => break,
                Err(e) => {
                    error!(task = self.id, error = %e, "periodic loop aborted");
                    return None;
                }
            }
        }

        let last = self.registry.remove(self.id);
        if let Some(d) = &last {
            info!(
                task = self.id,
                executions = d.executions(),
                missed = d.missed_deadlines(),
                "task stopped"
            );
        }
        last
    }

    fn cycle(&mut self) -> Result<Flow, TaskError> {
        let id = self.id;

        self.registry.begin_execution(id)?;
        trace!(task = id, "execution started");
        self.observer
            .notify(LifecycleEvent::new(id, EventKind::ExecutionStarted));

        self.workload.run(id);

        self.registry.end_execution(id)?;
        trace!(task = id, "execution ended");
        self.observer
            .notify(LifecycleEvent::new(id, EventKind::ExecutionEnded));

        monitor::check_deadline(&self.registry, self.observer.as_ref(), id, TimeSpec::now())?;

        if self.stop.is_requested() {
            return Ok(Flow::Stop);
        }

        let wake_at = self
            .registry
            .next_activation(id)?
            .ok_or(TaskError::NotStarted { id })?;
        if self.stop.sleep_until(wake_at) {
            return Ok(Flow::Stop);
        }

        self.registry.advance(id, self.advance)?;
        Ok(Flow::Continue)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
