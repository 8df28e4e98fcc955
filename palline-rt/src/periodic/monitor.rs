/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Deadline monitor.
//!
//! Runs once per period, after the workload slot and before the sleep, so it
//! reports whether the *current* activation finished in time.  The
//! comparison and the counter increment happen in one critical section; the
//! observer is notified after the guard is released.

use tracing::warn;

use crate::error::TaskError;
use crate::event::{EventKind, LifecycleEvent, Observer};
use crate::registry::TaskRegistry;
use crate::task::TaskId;
use crate::time::TimeSpec;

/// Returns `true` if `now` is strictly past the task's absolute deadline,
/// in which case the miss has been counted and reported.
pub fn check_deadline(
    registry: &TaskRegistry,
    observer: &dyn Observer,
    task: TaskId,
    now: TimeSpec,
) -> Result<bool, TaskError> {
    let Some((new_count, deadline)) = registry.record_miss_if_late(task, &now)? else {
        return Ok(false);
    };

    let lateness_us = now.micros_since(&deadline);
    warn!(
        task,
        missed = new_count,
        lateness_us,
        at = %now,
        "deadline missed"
    );
    observer.notify(LifecycleEvent {
        task_id: task,
        kind: EventKind::DeadlineMissed {
            new_count,
            lateness_us,
        },
        at: now,
    });
    Ok(true)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
