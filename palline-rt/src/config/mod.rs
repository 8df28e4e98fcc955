/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Harness configuration loading.
//!
//! The expected YAML structure is:
//! ```yaml
//! harness:
//!   max_tasks: 99
//!   priority_mode: fixed        # fixed | random
//!   deadline_advance: period    # period | relative_deadline
//!   edf_budget:                 # optional, overrides per-task budgets
//!     runtime_ms: 10
//!     deadline_ms: 30
//!     period_ms: 30
//! tasks:
//!   - id: 1
//!     period_ms: 100
//!     deadline_ms: 100
//!     priority: 29
//!     class: fifo
//!     workload: { kind: sleep, ms: 20 }
//! ```
//!
//! Both sections are optional.  Task entries go through the same validation
//! as programmatic creation requests, so a file that loads cleanly only
//! fails at spawn time for OS reasons (priority range, privileges).

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::SchedError;
use crate::periodic::{CpuBurn, NoWork, SimulatedSleep, Workload};
use crate::registry::DEFAULT_MAX_TASKS;
use crate::sched::{EdfBudget, PriorityMode, SchedBinder};
use crate::task::{DeadlineAdvance, SchedClass, TaskId, TaskSpec};

// ── Private YAML deserialization types ────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    harness: HarnessSection,
    #[serde(default)]
    tasks: Vec<TaskEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct HarnessSection {
    max_tasks: Option<usize>,
    priority_mode: PriorityMode,
    deadline_advance: DeadlineAdvance,
    edf_budget: Option<EdfBudgetEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EdfBudgetEntry {
    runtime_ms: u64,
    deadline_ms: u64,
    period_ms: u64,
}

/// Per-task fields as they appear in the YAML file.
///
/// `deadline_ms` defaults to the period (implicit deadline).
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TaskEntry {
    id: TaskId,
    period_ms: u64,
    deadline_ms: Option<u64>,
    #[serde(default)]
    priority: i32,
    #[serde(default)]
    class: SchedClass,
    #[serde(default)]
    workload: WorkloadConfig,
}

// ── Public data structures ────────────────────────────────────────────────────

/// What a configured task does in its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkloadConfig {
    #[default]
    None,
    Sleep { ms: u64 },
    Spin { iterations: u64 },
}

impl WorkloadConfig {
    pub fn build(&self) -> Box<dyn Workload> {
        match *self {
            WorkloadConfig::None => Box::new(NoWork),
            WorkloadConfig::Sleep { ms } => Box::new(SimulatedSleep::from_millis(ms)),
            WorkloadConfig::Spin { iterations } => Box::new(CpuBurn { iterations }),
        }
    }
}

/// Harness-wide settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarnessConfig {
    pub max_tasks: usize,
    pub priority_mode: PriorityMode,
    pub deadline_advance: DeadlineAdvance,
    /// Fixed `SCHED_DEADLINE` budget for every EDF task; derived per task
    /// when `None`.
    pub edf_budget: Option<EdfBudget>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            max_tasks: DEFAULT_MAX_TASKS,
            priority_mode: PriorityMode::default(),
            deadline_advance: DeadlineAdvance::default(),
            edf_budget: None,
        }
    }
}

/// One configured task: a validated creation request plus its workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskConfig {
    pub spec: TaskSpec,
    pub workload: WorkloadConfig,
}

/// Task set used when the configuration lists no tasks.
///
/// `tasks` tasks with `D = P` followed by `tight` tasks with `D = P/4`, each
/// sleeping a third of its period.  FIFO/RR hints (`30 − i`) are clamped into
/// the OS range so every demo task binds in fixed-priority mode.
pub fn demo_task_set(
    class: SchedClass,
    tasks: u32,
    tight: u32,
) -> Result<Vec<TaskConfig>, SchedError> {
    let normal = (1..=tasks).map(|i| TaskSpec::demo(i, class));
    let tight = (tasks + 1..=tasks + tight).map(|i| TaskSpec::demo_tight(i, class));
    normal
        .chain(tight)
        .map(|spec| {
            let spec = SchedBinder::clamp_priority_hint(spec)?;
            let ms = spec.period_ms / 3;
            Ok(TaskConfig {
                spec,
                workload: WorkloadConfig::Sleep { ms },
            })
        })
        .collect()
}

// ── ConfigManager ─────────────────────────────────────────────────────────────

/// Loads and holds the harness configuration from a YAML file.
#[derive(Debug, Default)]
pub struct ConfigManager {
    harness: HarnessConfig,
    tasks: Vec<TaskConfig>,
    loaded: bool,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates `path`.
    ///
    /// Calling this a second time replaces everything previously loaded.  On
    /// error the manager is left holding the defaults.
    ///
    /// # Errors
    /// The file cannot be read, the YAML is malformed or has unknown keys, a
    /// task entry is invalid, two entries share an id, there are more entries
    /// than `max_tasks`, or the EDF budget is inconsistent.
    pub fn load_from_file(&mut self, path: &Path) -> Result<()> {
        info!("Loading harness configuration from: {}", path.display());

        *self = Self::default();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        let file: ConfigFile = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML file: {}", path.display()))?;

        let harness = Self::harness_from(file.harness)?;

        let mut seen = BTreeSet::new();
        let mut tasks = Vec::with_capacity(file.tasks.len());
        for entry in file.tasks {
            let spec = TaskSpec::new(
                entry.id,
                entry.period_ms,
                entry.deadline_ms.unwrap_or(entry.period_ms),
                entry.class,
            )
            .with_priority(entry.priority);

            spec.validate()
                .with_context(|| format!("Invalid task entry {}", entry.id))?;
            if !seen.insert(spec.id) {
                bail!("Task id {} appears more than once", spec.id);
            }

            debug!(
                "  Task: {} | P: {}ms | D: {}ms | prio: {} | class: {} | workload: {:?}",
                spec.id,
                spec.period_ms,
                spec.relative_deadline_ms,
                spec.priority_hint,
                spec.class,
                entry.workload,
            );
            tasks.push(TaskConfig {
                spec,
                workload: entry.workload,
            });
        }

        if tasks.len() > harness.max_tasks {
            bail!(
                "{} task entries exceed max_tasks = {}",
                tasks.len(),
                harness.max_tasks
            );
        }
        if tasks.is_empty() {
            warn!("No tasks found in configuration file");
        }

        self.harness = harness;
        self.tasks = tasks;
        self.loaded = true;

        info!(
            "Successfully loaded {} task(s), max_tasks {}, priority mode {:?}",
            self.tasks.len(),
            self.harness.max_tasks,
            self.harness.priority_mode,
        );
        Ok(())
    }

    fn harness_from(section: HarnessSection) -> Result<HarnessConfig> {
        let max_tasks = section.max_tasks.unwrap_or(DEFAULT_MAX_TASKS);
        if max_tasks == 0 {
            bail!("max_tasks must be at least 1");
        }

        let edf_budget = match section.edf_budget {
            Some(b) => {
                let budget = EdfBudget::from_millis(b.runtime_ms, b.deadline_ms, b.period_ms);
                if !budget.is_consistent() {
                    bail!(
                        "edf_budget must satisfy 0 < runtime ≤ deadline ≤ period (got {}/{}/{} ms)",
                        b.runtime_ms,
                        b.deadline_ms,
                        b.period_ms
                    );
                }
                Some(budget)
            }
            None => None,
        };

        Ok(HarnessConfig {
            max_tasks,
            priority_mode: section.priority_mode,
            deadline_advance: section.deadline_advance,
            edf_budget,
        })
    }

    pub fn harness_config(&self) -> &HarnessConfig {
        &self.harness
    }

    pub fn tasks(&self) -> &[TaskConfig] {
        &self.tasks
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
