/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Earliest-deadline-first scheduling through `sched_setattr(2)`.
//!
//! `SCHED_DEADLINE` cannot be requested through the pthread attribute API.
//! The task's own thread issues the raw `sched_setattr` syscall with a
//! 48-byte `struct sched_attr` (policy tag plus runtime / deadline / period
//! budgets in nanoseconds) targeting itself (`pid = 0`).
//!
//! The syscall is wrapped in an [`EdfCapability`] so callers never reach for
//! it directly:
//!
//! | Variant | Meaning |
//! |---|---|
//! | `Supported(apply)` | `apply(budget)` switches the calling thread to `SCHED_DEADLINE` |
//! | `Unsupported` | no deadline class on this platform; the binder falls back to top-priority FIFO |
//!
//! A failed `apply` (usually `EPERM`) is recoverable: the task keeps running
//! under its creation policy.

use std::io;

use crate::task::TaskSpec;

const NANOS_PER_MILLI: u64 = 1_000_000;

// ── EdfBudget ─────────────────────────────────────────────────────────────────

/// Runtime / deadline / period reservation for one `SCHED_DEADLINE` thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdfBudget {
    pub runtime_ns: u64,
    pub deadline_ns: u64,
    pub period_ns: u64,
}

impl EdfBudget {
    pub fn from_millis(runtime_ms: u64, deadline_ms: u64, period_ms: u64) -> Self {
        Self {
            runtime_ns: runtime_ms.saturating_mul(NANOS_PER_MILLI),
            deadline_ns: deadline_ms.saturating_mul(NANOS_PER_MILLI),
            period_ns: period_ms.saturating_mul(NANOS_PER_MILLI),
        }
    }

    /// Budget derived from the task: runtime is the execution estimate
    /// (`period / 3`, at least 1 ms) clamped to the relative deadline.
    pub fn for_task(spec: &TaskSpec) -> Self {
        let runtime_ms = (spec.period_ms / 3).max(1).min(spec.relative_deadline_ms);
        Self::from_millis(runtime_ms, spec.relative_deadline_ms, spec.period_ms)
    }

    /// The kernel accepts only `0 < runtime ≤ deadline ≤ period`.
    pub fn is_consistent(&self) -> bool {
        self.runtime_ns > 0 && self.runtime_ns <= self.deadline_ns && self.deadline_ns <= self.period_ns
    }
}

// ── EdfCapability ─────────────────────────────────────────────────────────────

/// Signature of a function that moves the *calling* thread to
/// `SCHED_DEADLINE` with the given budget.
pub type ApplyEdf = fn(&EdfBudget) -> io::Result<()>;

#[derive(Clone, Copy)]
pub enum EdfCapability {
    Supported(ApplyEdf),
    Unsupported,
}

impl std::fmt::Debug for EdfCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EdfCapability::Supported(_) => f.write_str("Supported"),
            EdfCapability::Unsupported => f.write_str("Unsupported"),
        }
    }
}

impl EdfCapability {
    /// `Supported(sched_setattr)` on Linux, `Unsupported` elsewhere.
    pub fn detect() -> Self {
        #[cfg(target_os = "linux")]
        {
            EdfCapability::Supported(sys::set_deadline_attr)
        }
        #[cfg(not(target_os = "linux"))]
        {
            EdfCapability::Unsupported
        }
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, EdfCapability::Supported(_))
    }
}

impl Default for EdfCapability {
    fn default() -> Self {
        Self::detect()
    }
}

// ── Linux syscall ─────────────────────────────────────────────────────────────

#[cfg(target_os = "linux")]
pub(crate) mod sys {
    use std::io;

    use super::EdfBudget;

    /// Policy number of `SCHED_DEADLINE` in the Linux UAPI.
    pub const SCHED_DEADLINE: u32 = 6;

    /// `struct sched_attr`, first published layout (`SCHED_ATTR_SIZE_VER0`).
    #[repr(C)]
    #[derive(Debug, Default)]
    pub struct SchedAttr {
        pub size: u32,
        pub sched_policy: u32,
        pub sched_flags: u64,
        pub sched_nice: i32,
        pub sched_priority: u32,
        pub sched_runtime: u64,
        pub sched_deadline: u64,
        pub sched_period: u64,
    }

    impl SchedAttr {
        pub fn deadline(budget: &EdfBudget) -> Self {
            Self {
                size: std::mem::size_of::<SchedAttr>() as u32,
                sched_policy: SCHED_DEADLINE,
                sched_runtime: budget.runtime_ns,
                sched_deadline: budget.deadline_ns,
                sched_period: budget.period_ns,
                ..Default::default()
            }
        }
    }

    /// `sched_setattr(0, &attr, 0)` for the calling thread.
    pub fn set_deadline_attr(budget: &EdfBudget) -> io::Result<()> {
        let attr = SchedAttr::deadline(budget);
        // SAFETY: `attr` is a live, correctly sized `sched_attr`; pid 0 targets
        // the calling thread and flags must be 0.
        let rc = unsafe {
            libc::syscall(
                libc::SYS_sched_setattr,
                0 as libc::pid_t,
                &attr as *const SchedAttr,
                0 as libc::c_uint,
            )
        };
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
