/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Scheduling-class binder.
//!
//! [`SchedBinder`] turns the abstract [`SchedClass`] of a [`TaskSpec`] into
//! concrete OS attributes and starts the task's execution unit under them.
//!
//! | Class | Creation policy | Priority | After start |
//! |---|---|---|---|
//! | `BestEffort` | `SCHED_OTHER` | forced `0` | – |
//! | `Fifo` / `RoundRobin` | `SCHED_FIFO` / `SCHED_RR` | caller hint (fixed) or uniform draw (random) from the OS range | – |
//! | `DeadlineEdf` | `SCHED_OTHER` | `0` | `sched_setattr(SCHED_DEADLINE)` from inside the thread |
//! | `DeadlineEdf`, no EDF support | `SCHED_FIFO` | OS maximum | – |
//!
//! # Launch handshake
//! `std::thread` has no scheduling attributes, so the new thread applies its
//! own policy with `pthread_setschedparam` before running the body and
//! reports the result back.  [`SchedBinder::launch`] only returns `Ok` once
//! the thread runs under the requested policy; a refusal is reported as
//! [`SchedError::PolicyRejected`] and the thread exits without running the
//! body.

pub mod deadline;

use std::io;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use rand::Rng;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::SchedError;
use crate::task::{SchedClass, TaskId, TaskSpec};

pub use deadline::{ApplyEdf, EdfBudget, EdfCapability};

// ── Priority mode ─────────────────────────────────────────────────────────────

/// How FIFO/RR priorities are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PriorityMode {
    /// Use the caller's hint; it must lie inside the OS range.
    #[default]
    Fixed,
    /// Draw uniformly from the OS range, ignoring the hint (demo mode: makes
    /// priority diversity visible).
    Random,
}

// ── Binding ───────────────────────────────────────────────────────────────────

/// Deadline-class request the task thread issues once at start-up.
#[derive(Clone, Copy)]
pub struct EdfRequest {
    pub apply: ApplyEdf,
    pub budget: EdfBudget,
}

impl std::fmt::Debug for EdfRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdfRequest")
            .field("budget", &self.budget)
            .finish_non_exhaustive()
    }
}

/// Concrete OS scheduling attributes resolved for one task.
#[derive(Debug, Clone, Copy)]
pub struct Binding {
    /// Class the task will actually run under at creation (differs from the
    /// requested class only for the EDF fallback).
    pub effective_class: SchedClass,
    /// `SCHED_OTHER`, `SCHED_FIFO` or `SCHED_RR`.
    pub policy: libc::c_int,
    pub priority: i32,
    pub edf: Option<EdfRequest>,
}

// ── SchedBinder ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct SchedBinder {
    priority_mode: PriorityMode,
    edf: EdfCapability,
    edf_budget: Option<EdfBudget>,
}

impl SchedBinder {
    /// Fixed priorities, platform EDF detection, per-task EDF budgets.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_priority_mode(mut self, mode: PriorityMode) -> Self {
        self.priority_mode = mode;
        self
    }

    pub fn with_edf_capability(mut self, edf: EdfCapability) -> Self {
        self.edf = edf;
        self
    }

    /// Use one fixed budget for every EDF task instead of deriving it from
    /// the task's period and deadline.
    pub fn with_edf_budget(mut self, budget: Option<EdfBudget>) -> Self {
        self.edf_budget = budget;
        self
    }

    /// OS-reported `[min, max]` priority range for `policy`.
    pub fn priority_range(policy: libc::c_int) -> Result<(i32, i32), SchedError> {
        // SAFETY: plain queries without pointers.
        let (min, max) = unsafe {
            (
                libc::sched_get_priority_min(policy),
                libc::sched_get_priority_max(policy),
            )
        };
        if min < 0 || max < 0 {
            return Err(SchedError::PriorityQuery {
                policy,
                source: io::Error::last_os_error(),
            });
        }
        Ok((min, max))
    }

    /// Pull a FIFO/RR priority hint into the OS range of its class.  Other
    /// classes ignore the hint and are returned unchanged.
    pub fn clamp_priority_hint(spec: TaskSpec) -> Result<TaskSpec, SchedError> {
        if !spec.class.is_fixed_priority() {
            return Ok(spec);
        }
        let (min, max) = Self::priority_range(spec.class.creation_policy())?;
        let hint = spec.priority_hint.clamp(min, max);
        Ok(spec.with_priority(hint))
    }

    /// Resolve the OS attributes for `spec`.
    ///
    /// # Errors
    /// [`SchedError::PriorityQuery`] if the range query fails,
    /// [`SchedError::PriorityOutOfRange`] for an out-of-range fixed hint.
    pub fn bind(&self, spec: &TaskSpec) -> Result<Binding, SchedError> {
        match spec.class {
            SchedClass::BestEffort => Ok(Binding {
                effective_class: SchedClass::BestEffort,
                policy: libc::SCHED_OTHER,
                priority: 0,
                edf: None,
            }),

            SchedClass::Fifo | SchedClass::RoundRobin => {
                let policy = spec.class.creation_policy();
                let (min, max) = Self::priority_range(policy)?;
                let priority = match self.priority_mode {
                    PriorityMode::Fixed => {
                        if !(min..=max).contains(&spec.priority_hint) {
                            return Err(SchedError::PriorityOutOfRange {
                                task: spec.id,
                                class: spec.class,
                                priority: spec.priority_hint,
                                min,
                                max,
                            });
                        }
                        spec.priority_hint
                    }
                    PriorityMode::Random => rand::thread_rng().gen_range(min..=max),
                };
                Ok(Binding {
                    effective_class: spec.class,
                    policy,
                    priority,
                    edf: None,
                })
            }

            SchedClass::DeadlineEdf => match self.edf {
                EdfCapability::Supported(apply) => Ok(Binding {
                    effective_class: SchedClass::DeadlineEdf,
                    policy: libc::SCHED_OTHER,
                    priority: 0,
                    edf: Some(EdfRequest {
                        apply,
                        budget: self
                            .edf_budget
                            .unwrap_or_else(|| EdfBudget::for_task(spec)),
                    }),
                }),
                EdfCapability::Unsupported => {
                    let (_, max) = Self::priority_range(libc::SCHED_FIFO)?;
                    warn!(
                        task = spec.id,
                        priority = max,
                        "deadline scheduling unsupported on this platform, falling back to FIFO"
                    );
                    Ok(Binding {
                        effective_class: SchedClass::Fifo,
                        policy: libc::SCHED_FIFO,
                        priority: max,
                        edf: None,
                    })
                }
            },
        }
    }

    /// Start `body` on a new thread running under `binding`.
    ///
    /// Blocks until the thread has applied its policy.  The returned handle
    /// yields `None` only if the policy was refused, which is already
    /// reported as an error here.
    ///
    /// # Errors
    /// [`SchedError::Spawn`] if the thread cannot be created,
    /// [`SchedError::PolicyRejected`] if the OS refuses the policy/priority.
    pub fn launch<F, T>(
        &self,
        task: TaskId,
        binding: &Binding,
        body: F,
    ) -> Result<JoinHandle<Option<T>>, SchedError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let policy = binding.policy;
        let priority = binding.priority;
        let (ready_tx, ready_rx) = mpsc::sync_channel::<io::Result<()>>(1);

        let handle = thread::Builder::new()
            .name(format!("rt-task-{task}"))
            .spawn(move || {
                let applied = set_current_thread_policy(policy, priority);
                let ok = applied.is_ok();
                let _ = ready_tx.send(applied);
                if ok {
                    Some(body())
                } else {
                    None
                }
            })
            .map_err(|source| SchedError::Spawn { task, source })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                debug!(task, policy, priority, "execution thread running");
                Ok(handle)
            }
            Ok(Err(source)) => {
                let _ = handle.join();
                Err(SchedError::PolicyRejected {
                    task,
                    policy,
                    priority,
                    source,
                })
            }
            Err(_) => {
                let _ = handle.join();
                Err(SchedError::Spawn {
                    task,
                    source: io::Error::new(
                        io::ErrorKind::Other,
                        "execution thread exited before applying its policy",
                    ),
                })
            }
        }
    }
}

// ── Thread policy helpers ─────────────────────────────────────────────────────

/// Apply `policy` / `priority` to the calling thread.
pub fn set_current_thread_policy(policy: libc::c_int, priority: i32) -> io::Result<()> {
    // SAFETY: zeroed `sched_param` is valid on every libc layout; only
    // `sched_priority` is meaningful.
    let mut param: libc::sched_param = unsafe { std::mem::zeroed() };
    param.sched_priority = priority;
    // SAFETY: `pthread_self()` is always a valid handle for the caller.
    let rc = unsafe { libc::pthread_setschedparam(libc::pthread_self(), policy, &param) };
    if rc != 0 {
        return Err(io::Error::from_raw_os_error(rc));
    }
    Ok(())
}

/// `(policy, priority)` of the calling thread.
pub fn current_thread_policy() -> io::Result<(libc::c_int, i32)> {
    let mut policy: libc::c_int = 0;
    // SAFETY: see `set_current_thread_policy`.
    let mut param: libc::sched_param = unsafe { std::mem::zeroed() };
    // SAFETY: both out-pointers are valid for writes.
    let rc = unsafe { libc::pthread_getschedparam(libc::pthread_self(), &mut policy, &mut param) };
    if rc != 0 {
        return Err(io::Error::from_raw_os_error(rc));
    }
    Ok((policy, param.sched_priority))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(class: SchedClass, hint: i32) -> TaskSpec {
        TaskSpec::new(1, 100, 100, class).with_priority(hint)
    }

    fn fail_edf(_: &EdfBudget) -> io::Result<()> {
        Err(io::Error::from_raw_os_error(libc::EPERM))
    }

    // ── priority_range ────────────────────────────────────────────────────────

    #[test]
    fn fifo_and_rr_ranges_are_non_empty() {
        for policy in [libc::SCHED_FIFO, libc::SCHED_RR] {
            let (min, max) = SchedBinder::priority_range(policy).unwrap();
            assert!(min <= max, "policy {policy}: [{min}, {max}]");
        }
    }

    #[test]
    fn invalid_policy_query_is_an_error() {
        let err = SchedBinder::priority_range(12_345).unwrap_err();
        assert!(matches!(err, SchedError::PriorityQuery { policy: 12_345, .. }));
    }

    #[test]
    fn clamped_hint_lands_inside_the_range() {
        let (min, max) = SchedBinder::priority_range(libc::SCHED_FIFO).unwrap();
        let low = SchedBinder::clamp_priority_hint(spec(SchedClass::Fifo, min - 50)).unwrap();
        let high = SchedBinder::clamp_priority_hint(spec(SchedClass::Fifo, max + 50)).unwrap();
        let mid = SchedBinder::clamp_priority_hint(spec(SchedClass::Fifo, min)).unwrap();
        assert_eq!(low.priority_hint, min);
        assert_eq!(high.priority_hint, max);
        assert_eq!(mid.priority_hint, min);

        let other = SchedBinder::clamp_priority_hint(spec(SchedClass::BestEffort, -3)).unwrap();
        assert_eq!(other.priority_hint, -3);
    }

    // ── bind ──────────────────────────────────────────────────────────────────

    #[test]
    fn best_effort_priority_is_forced_to_zero() {
        let b = SchedBinder::new().bind(&spec(SchedClass::BestEffort, 42)).unwrap();
        assert_eq!(b.policy, libc::SCHED_OTHER);
        assert_eq!(b.priority, 0);
        assert!(b.edf.is_none());
    }

    #[test]
    fn fixed_mode_uses_the_hint() {
        let (min, max) = SchedBinder::priority_range(libc::SCHED_FIFO).unwrap();
        let hint = (min + max) / 2;
        let b = SchedBinder::new().bind(&spec(SchedClass::Fifo, hint)).unwrap();
        assert_eq!(b.policy, libc::SCHED_FIFO);
        assert_eq!(b.priority, hint);
    }

    #[test]
    fn fixed_mode_rejects_out_of_range_hint() {
        let (min, max) = SchedBinder::priority_range(libc::SCHED_RR).unwrap();
        for hint in [min - 1, max + 1] {
            let err = SchedBinder::new()
                .bind(&spec(SchedClass::RoundRobin, hint))
                .unwrap_err();
            assert!(matches!(err, SchedError::PriorityOutOfRange { priority, .. } if priority == hint));
        }
    }

    #[test]
    fn random_mode_stays_inside_os_range() {
        let binder = SchedBinder::new().with_priority_mode(PriorityMode::Random);
        for class in [SchedClass::Fifo, SchedClass::RoundRobin] {
            let (min, max) = SchedBinder::priority_range(class.creation_policy()).unwrap();
            for _ in 0..500 {
                // hint is ignored in random mode, even when out of range
                let b = binder.bind(&spec(class, -7)).unwrap();
                assert!((min..=max).contains(&b.priority), "{class}: {}", b.priority);
            }
        }
    }

    #[test]
    fn edf_binds_time_shared_with_a_deadline_request() {
        let b = SchedBinder::new()
            .with_edf_capability(EdfCapability::Supported(fail_edf))
            .bind(&TaskSpec::new(2, 300, 300, SchedClass::DeadlineEdf))
            .unwrap();
        assert_eq!(b.effective_class, SchedClass::DeadlineEdf);
        assert_eq!(b.policy, libc::SCHED_OTHER);
        assert_eq!(b.priority, 0);
        let req = b.edf.unwrap();
        assert_eq!(req.budget, EdfBudget::from_millis(100, 300, 300));
    }

    #[test]
    fn edf_budget_override_wins() {
        let fixed = EdfBudget::from_millis(10, 30, 30);
        let b = SchedBinder::new()
            .with_edf_capability(EdfCapability::Supported(fail_edf))
            .with_edf_budget(Some(fixed))
            .bind(&TaskSpec::new(2, 300, 300, SchedClass::DeadlineEdf))
            .unwrap();
        assert_eq!(b.edf.unwrap().budget, fixed);
    }

    #[test]
    fn edf_without_platform_support_falls_back_to_top_fifo() {
        let (_, max) = SchedBinder::priority_range(libc::SCHED_FIFO).unwrap();
        let b = SchedBinder::new()
            .with_edf_capability(EdfCapability::Unsupported)
            .bind(&spec(SchedClass::DeadlineEdf, 0))
            .unwrap();
        assert_eq!(b.effective_class, SchedClass::Fifo);
        assert_eq!(b.policy, libc::SCHED_FIFO);
        assert_eq!(b.priority, max);
        assert!(b.edf.is_none());
    }

    // ── launch ────────────────────────────────────────────────────────────────

    #[test]
    fn best_effort_launch_runs_body_under_sched_other() {
        let binder = SchedBinder::new();
        let binding = binder.bind(&spec(SchedClass::BestEffort, 0)).unwrap();
        let handle = binder
            .launch(1, &binding, || {
                let name = std::thread::current().name().map(str::to_owned);
                (current_thread_policy().unwrap(), name)
            })
            .unwrap();
        let ((policy, priority), name) = handle.join().unwrap().unwrap();
        assert_eq!(policy, libc::SCHED_OTHER);
        assert_eq!(priority, 0);
        assert_eq!(name.as_deref(), Some("rt-task-1"));
    }

    #[test]
    fn rejected_policy_never_runs_the_body() {
        // SCHED_OTHER only accepts priority 0, so this is refused with EINVAL
        // regardless of privileges.
        let binding = Binding {
            effective_class: SchedClass::BestEffort,
            policy: libc::SCHED_OTHER,
            priority: 5,
            edf: None,
        };
        let ran = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = std::sync::Arc::clone(&ran);
        let err = SchedBinder::new()
            .launch(9, &binding, move || flag.store(true, std::sync::atomic::Ordering::SeqCst))
            .unwrap_err();
        assert!(matches!(err, SchedError::PolicyRejected { task: 9, priority: 5, .. }));
        assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
    }
}
