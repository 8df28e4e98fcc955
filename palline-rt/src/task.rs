/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Core task data structures for the periodic task harness.
//!
//! Two types model the two sides of task creation:
//!
//! ```text
//! controller ──(TaskSpec)──► SchedBinder ──(priority)──► TaskDescriptor ──► TaskRegistry
//!                ↑ request                                  ↑ live record, mutated once
//!                validated, immutable                         per period by its own thread
//! ```
//!
//! # Ownership model
//! A [`TaskDescriptor`] is owned by the [`TaskRegistry`] and is only ever
//! mutated through it, under its guard.  Each periodic thread touches its own
//! descriptor only; observers receive clones.
//!
//! [`TaskRegistry`]: crate::registry::TaskRegistry

use std::cmp::Ordering;
use std::fmt;

use serde::Deserialize;

use crate::error::TaskError;
use crate::time::TimeSpec;

/// Positive task identifier, unique among live tasks.
pub type TaskId = u32;

// ── Scheduling class ──────────────────────────────────────────────────────────

/// The closed set of scheduling classes a task can be bound to.
///
/// Every caller-facing selection surface (CLI flag, YAML field) maps onto
/// exactly these four values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SchedClass {
    /// `SCHED_OTHER` – time-shared, priority forced to 0.
    #[default]
    #[serde(alias = "other")]
    #[value(alias = "other")]
    BestEffort,
    /// `SCHED_FIFO` – fixed-priority, run until block or yield.
    Fifo,
    /// `SCHED_RR` – fixed-priority, time-sliced.
    #[serde(alias = "rr")]
    #[value(alias = "rr")]
    RoundRobin,
    /// `SCHED_DEADLINE` – earliest deadline first, configured with
    /// `sched_setattr` from inside the task's own thread.
    #[serde(alias = "deadline", alias = "edf")]
    #[value(alias = "deadline", alias = "edf")]
    DeadlineEdf,
}

impl SchedClass {
    /// The policy the execution unit is *created* under.
    ///
    /// `DeadlineEdf` threads start as `SCHED_OTHER`; the deadline class is
    /// requested later with `sched_setattr`.
    pub fn creation_policy(self) -> libc::c_int {
        match self {
            SchedClass::BestEffort | SchedClass::DeadlineEdf => libc::SCHED_OTHER,
            SchedClass::Fifo => libc::SCHED_FIFO,
            SchedClass::RoundRobin => libc::SCHED_RR,
        }
    }

    /// `true` for the two classes whose priority comes from the OS range.
    pub fn is_fixed_priority(self) -> bool {
        matches!(self, SchedClass::Fifo | SchedClass::RoundRobin)
    }

    /// Short label used in log lines and status reports.
    pub fn short_name(self) -> &'static str {
        match self {
            SchedClass::BestEffort => "OTHER",
            SchedClass::Fifo => "FIFO",
            SchedClass::RoundRobin => "RR",
            SchedClass::DeadlineEdf => "DL",
        }
    }
}

impl fmt::Display for SchedClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchedClass::BestEffort => "BestEffort",
            SchedClass::Fifo => "Fifo",
            SchedClass::RoundRobin => "RoundRobin",
            SchedClass::DeadlineEdf => "DeadlineEDF",
        };
        f.write_str(name)
    }
}

// ── Deadline advancement ──────────────────────────────────────────────────────

/// How `next_deadline` moves at the end of each period.
///
/// `next_activation` always moves by `period`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadlineAdvance {
    /// Deadline moves by `period`: every absolute deadline is its own
    /// activation plus the relative deadline.
    #[default]
    Period,
    /// Deadline moves by `relative_deadline`.  Identical to `Period` when
    /// `D == P`; for `D < P` the deadline falls further behind each period.
    RelativeDeadline,
}

// ── TaskSpec (creation request) ───────────────────────────────────────────────

/// A request to create one periodic task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub id: TaskId,
    pub period_ms: u64,
    pub relative_deadline_ms: u64,
    /// Priority requested by the caller.  Ignored for `BestEffort` and
    /// `DeadlineEdf`; for FIFO/RR it is used as-is in fixed mode and ignored
    /// in random mode.
    pub priority_hint: i32,
    pub class: SchedClass,
}

impl TaskSpec {
    pub fn new(id: TaskId, period_ms: u64, relative_deadline_ms: u64, class: SchedClass) -> Self {
        Self {
            id,
            period_ms,
            relative_deadline_ms,
            priority_hint: 0,
            class,
        }
    }

    pub fn with_priority(mut self, priority_hint: i32) -> Self {
        self.priority_hint = priority_hint;
        self
    }

    /// The `i`-th task of the interactive demo: `P = D = 100·i ms`,
    /// priority hint `30 − i`.
    pub fn demo(i: TaskId, class: SchedClass) -> Self {
        let period = 100 * u64::from(i);
        Self::new(i, period, period, class).with_priority(30 - i as i32)
    }

    /// Same as [`demo`](Self::demo) but with the deadline cut to a quarter of
    /// the period, to provoke misses.
    pub fn demo_tight(i: TaskId, class: SchedClass) -> Self {
        let period = 100 * u64::from(i);
        Self::new(i, period, period / 4, class).with_priority(30 - i as i32)
    }

    /// Check the request before anything is allocated for it.
    pub fn validate(&self) -> Result<(), TaskError> {
        check_timing(self.id, self.period_ms, self.relative_deadline_ms)
    }
}

fn check_timing(id: TaskId, period_ms: u64, deadline_ms: u64) -> Result<(), TaskError> {
    if id == 0 {
        return Err(TaskError::InvalidId);
    }
    if period_ms == 0 {
        return Err(TaskError::ZeroPeriod { id });
    }
    if deadline_ms == 0 {
        return Err(TaskError::ZeroDeadline { id });
    }
    if deadline_ms > period_ms {
        return Err(TaskError::DeadlineExceedsPeriod {
            id,
            period_ms,
            deadline_ms,
        });
    }
    Ok(())
}

// ── ActivationWindow ──────────────────────────────────────────────────────────

/// The timing state of one task, materialised by the loop's start-up step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationWindow {
    /// `next_activation` as set by the start-up step (index 0).
    pub first_activation: TimeSpec,
    pub next_activation: TimeSpec,
    pub next_deadline: TimeSpec,
    /// Number of completed advances since start-up.
    pub index: u64,
}

// ── TaskDescriptor ────────────────────────────────────────────────────────────

/// The live record of one periodic task.
///
/// Identity and timing constants are fixed at creation.  The activation
/// window and the counters are changed only through the `pub(crate)`
/// mutators below, which the registry calls under its guard.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDescriptor {
    id: TaskId,
    period_ms: u64,
    relative_deadline_ms: u64,
    priority: i32,
    class: SchedClass,
    estimated_execution_ms: u64,

    window: Option<ActivationWindow>,
    missed_deadlines: u64,
    executions: u64,
    executing: bool,
}

impl TaskDescriptor {
    /// Build the descriptor for a validated request with the priority the
    /// binder resolved.  The miss counter starts at zero.
    pub fn from_spec(spec: &TaskSpec, priority: i32) -> Self {
        Self {
            id: spec.id,
            period_ms: spec.period_ms,
            relative_deadline_ms: spec.relative_deadline_ms,
            priority,
            class: spec.class,
            estimated_execution_ms: spec.period_ms / 3,
            window: None,
            missed_deadlines: 0,
            executions: 0,
            executing: false,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }

    pub fn relative_deadline_ms(&self) -> u64 {
        self.relative_deadline_ms
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn class(&self) -> SchedClass {
        self.class
    }

    /// Informational worst-case estimate (`period / 3`); never enforced.
    pub fn estimated_execution_ms(&self) -> u64 {
        self.estimated_execution_ms
    }

    pub fn window(&self) -> Option<&ActivationWindow> {
        self.window.as_ref()
    }

    pub fn next_activation(&self) -> Option<TimeSpec> {
        self.window.map(|w| w.next_activation)
    }

    pub fn next_deadline(&self) -> Option<TimeSpec> {
        self.window.map(|w| w.next_deadline)
    }

    pub fn missed_deadlines(&self) -> u64 {
        self.missed_deadlines
    }

    pub fn executions(&self) -> u64 {
        self.executions
    }

    /// Same timing rules as [`TaskSpec::validate`], for descriptors built
    /// directly with [`from_spec`](Self::from_spec).
    pub fn validate(&self) -> Result<(), TaskError> {
        check_timing(self.id, self.period_ms, self.relative_deadline_ms)
    }

    pub fn is_executing(&self) -> bool {
        self.executing
    }

    /// Fraction of the current period that has elapsed at `now`, in `[0, 1)`.
    ///
    /// `0.0` before the window exists.
    pub fn period_progress(&self, now: &TimeSpec) -> f64 {
        let Some(window) = self.window else {
            return 0.0;
        };
        if self.period_ms == 0 {
            return 0.0;
        }
        let period = self.period_ms as i64;
        let elapsed = now.millis_since(&window.next_activation).rem_euclid(period);
        elapsed as f64 / period as f64
    }

    // ── Mutators (called by the registry under its guard) ─────────────────────

    /// Start-up step: first activation at `now + period`, first deadline at
    /// `now + relative_deadline`.
    pub(crate) fn start_period(&mut self, now: TimeSpec) -> ActivationWindow {
        let next_activation = now.advance_ms(self.period_ms);
        let window = ActivationWindow {
            first_activation: next_activation,
            next_activation,
            next_deadline: now.advance_ms(self.relative_deadline_ms),
            index: 0,
        };
        self.window = Some(window);
        window
    }

    /// End-of-period step: both instants move together.
    pub(crate) fn advance(&mut self, mode: DeadlineAdvance) -> Option<ActivationWindow> {
        let deadline_step = match mode {
            DeadlineAdvance::Period => self.period_ms,
            DeadlineAdvance::RelativeDeadline => self.relative_deadline_ms,
        };
        let period = self.period_ms;
        let window = self.window.as_mut()?;
        window.next_activation = window.next_activation.advance_ms(period);
        window.next_deadline = window.next_deadline.advance_ms(deadline_step);
        window.index += 1;
        Some(*window)
    }

    /// Count a miss if `now` is strictly later than the current absolute
    /// deadline.  Returns the new miss total when a miss is recorded.
    pub(crate) fn record_miss_if_late(&mut self, now: &TimeSpec) -> Option<u64> {
        let deadline = self.window?.next_deadline;
        if now.compare(&deadline) == Ordering::Greater {
            self.missed_deadlines += 1;
            Some(self.missed_deadlines)
        } else {
            None
        }
    }

    pub(crate) fn begin_execution(&mut self) {
        self.executing = true;
        self.executions += 1;
    }

    pub(crate) fn end_execution(&mut self) {
        self.executing = false;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
