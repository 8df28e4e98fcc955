/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Palline-RT – periodic real-time task harness
//!
//! Runs a set of periodic tasks, each on its own OS thread under a chosen
//! scheduling class, with drift-free absolute-time activation and per-task
//! deadline-miss accounting.
//!
//! ```text
//! lib.rs
//! ├── time          – monotonic TimeSpec, absolute sleep
//! ├── task          – SchedClass, TaskSpec, TaskDescriptor
//! ├── error         – TaskError / SchedError / HarnessError
//! ├── event         – lifecycle events and the Observer seam
//! ├── registry      – shared task table behind one guard
//! ├── sched/        – class → OS policy binding, thread launch
//! │   └── deadline  – SCHED_DEADLINE via sched_setattr
//! ├── periodic/     – per-task execution loop and workloads
//! │   └── monitor   – deadline check and miss accounting
//! ├── harness       – spawn / stop pipeline
//! └── config/       – YAML harness configuration
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod harness;
pub mod periodic;
pub mod registry;
pub mod sched;
pub mod task;
pub mod time;
