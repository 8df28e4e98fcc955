/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for the periodic task harness.
//!
//! Three enums model the three failure layers:
//!
//! * [`TaskError`]: the creation request itself is invalid, or the registry
//!   cannot take it (duplicate id, capacity).
//! * [`SchedError`]: the OS refused to give the task its execution unit or
//!   its scheduling class.  These are the process-ending failures: the binary
//!   logs them and exits.
//! * [`HarnessError`]: what [`Harness`](crate::harness::Harness) and
//!   [`TaskHandle`](crate::harness::TaskHandle) return; wraps the other two.
//!
//! A failed `sched_setattr` is *not* represented here.  It is a recoverable
//! diagnostic, logged by the periodic loop and otherwise ignored.  A deadline
//! miss is not an error at all.

use thiserror::Error;

use crate::task::{SchedClass, TaskId};

// ── Task creation / registry ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// Task ids are positive; `0` is reserved.
    #[error("task id must be positive, got 0")]
    InvalidId,

    #[error("task {id}: period must be a positive number of milliseconds")]
    ZeroPeriod { id: TaskId },

    #[error("task {id}: relative deadline must be a positive number of milliseconds")]
    ZeroDeadline { id: TaskId },

    /// A relative deadline longer than the period is rejected as a
    /// configuration error.
    #[error("task {id}: relative deadline {deadline_ms}ms exceeds period {period_ms}ms")]
    DeadlineExceedsPeriod {
        id: TaskId,
        period_ms: u64,
        deadline_ms: u64,
    },

    #[error("task id {id} is already in use by a live task")]
    DuplicateId { id: TaskId },

    #[error("task limit reached: {limit} live task(s)")]
    CapacityExceeded { limit: usize },

    #[error("task {id} is not registered")]
    UnknownTask { id: TaskId },

    /// The periodic loop asked for its window before anchoring it.
    #[error("task {id} has no activation window yet")]
    NotStarted { id: TaskId },
}

// ── OS scheduling ─────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SchedError {
    /// `sched_get_priority_min/max` failed for the policy.
    #[error("cannot query priority range for policy {policy}: {source}")]
    PriorityQuery {
        policy: i32,
        #[source]
        source: std::io::Error,
    },

    /// In fixed-priority mode the caller's hint must lie inside the OS range.
    #[error("task {task}: priority {priority} outside {class} range [{min}, {max}]")]
    PriorityOutOfRange {
        task: TaskId,
        class: SchedClass,
        priority: i32,
        min: i32,
        max: i32,
    },

    /// The execution unit could not be created at all.
    #[error("task {task}: cannot create execution thread: {source}")]
    Spawn {
        task: TaskId,
        #[source]
        source: std::io::Error,
    },

    /// The execution unit was created but the OS refused its policy or
    /// priority (typically `EPERM` without `CAP_SYS_NICE`).  The thread is
    /// torn down before any period runs.
    #[error("task {task}: OS rejected policy {policy} priority {priority}: {source}")]
    PolicyRejected {
        task: TaskId,
        policy: i32,
        priority: i32,
        #[source]
        source: std::io::Error,
    },
}

// ── Harness ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Sched(#[from] SchedError),

    /// The task's thread panicked instead of reaching its stop point.
    #[error("task {task} panicked before reaching its stop point")]
    TaskPanicked { task: TaskId },
}
