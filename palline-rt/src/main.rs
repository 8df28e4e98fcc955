/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, trace, warn};

use palline_rt::config::{self, ConfigManager};
use palline_rt::event::{ChannelObserver, EventKind, LifecycleEvent};
use palline_rt::harness::{Harness, TaskHandle};
use palline_rt::sched::PriorityMode;
use palline_rt::task::SchedClass;
use palline_rt::time::TimeSpec;

// ── CLI argument definition ───────────────────────────────────────────────────

/// Periodic real-time task harness.
///
/// Without `--config`, starts `--tasks` demo tasks (task i: P = D = 100·i ms,
/// priority 30 − i clamped to the OS range) followed by `--tight` tasks whose
/// deadline is P/4.
///
/// Example:
///   palline-rt --class fifo --tasks 5 --tight 1 --duration-secs 10
#[derive(Debug, Parser)]
#[command(
    name = "palline-rt",
    about = "Periodic real-time task harness",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML harness configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Scheduling class for the demo tasks.
    #[arg(short = 's', long = "class", value_enum, default_value_t = SchedClass::BestEffort)]
    class: SchedClass,

    /// Number of demo tasks with D = P.
    #[arg(short = 'n', long = "tasks", default_value_t = 3)]
    tasks: u32,

    /// Number of extra demo tasks with D = P/4.
    #[arg(short = 't', long = "tight", default_value_t = 0)]
    tight: u32,

    /// FIFO/RR priority selection; overrides the config file.
    #[arg(short = 'p', long = "priority-mode", value_enum)]
    priority_mode: Option<PriorityMode>,

    /// Stop after this many seconds (default: run until Ctrl-C).
    #[arg(short = 'd', long = "duration-secs")]
    duration_secs: Option<u64>,

    /// Interval between status reports.
    #[arg(long = "status-interval-ms", default_value_t = 1000)]
    status_interval_ms: u64,

    /// Cap on live tasks; overrides the config file.
    #[arg(short = 'm', long = "max-tasks")]
    max_tasks: Option<usize>,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=trace).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Palline-RT starting up...");

    let cli = Cli::parse();

    info!(
        config        = ?cli.config,
        class         = %cli.class,
        tasks         = cli.tasks,
        tight         = cli.tight,
        priority_mode = ?cli.priority_mode,
        duration_secs = ?cli.duration_secs,
        "Configuration"
    );

    // ── Load harness configuration ────────────────────────────────────────────
    let mut config_manager = ConfigManager::new();
    match &cli.config {
        Some(path) => {
            if let Err(e) = config_manager.load_from_file(path) {
                error!("Failed to load harness configuration: {:#}", e);
                process::exit(1);
            }
        }
        None => {
            warn!("No configuration file provided, running demo task set");
        }
    }

    let mut harness_config = *config_manager.harness_config();
    if let Some(mode) = cli.priority_mode {
        harness_config.priority_mode = mode;
    }
    if let Some(max) = cli.max_tasks {
        harness_config.max_tasks = max;
    }

    let (observer, events) = ChannelObserver::channel();
    let harness = Harness::from_config(&harness_config, Arc::new(observer));

    let task_set = if config_manager.tasks().is_empty() {
        match config::demo_task_set(cli.class, cli.tasks, cli.tight) {
            Ok(set) => set,
            Err(e) => {
                error!("Cannot build demo task set: {:#}", anyhow::Error::from(e));
                process::exit(1);
            }
        }
    } else {
        config_manager.tasks().to_vec()
    };

    // ── Spawn tasks ───────────────────────────────────────────────────────────
    // Any creation failure is fatal: the running set would not match the
    // requested one.  Exiting tears down the task threads with the process.
    let mut handles = Vec::with_capacity(task_set.len());
    for entry in task_set {
        match harness.spawn_with(entry.spec, entry.workload.build()) {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                error!("Task creation failed: {:#}", anyhow::Error::from(e));
                process::exit(1);
            }
        }
    }
    info!("{} task(s) running", handles.len());

    // ── Observe ───────────────────────────────────────────────────────────────
    observe(
        &harness,
        events,
        Duration::from_millis(cli.status_interval_ms.max(1)),
        cli.duration_secs.map(Duration::from_secs),
    )
    .await;

    // ── Shut down ─────────────────────────────────────────────────────────────
    shutdown(handles).await;
    let snap = harness.snapshot();
    info!(
        executions = snap.total_executions,
        missed = snap.total_deadline_misses,
        "Palline-RT stopped"
    );
}

/// Drain lifecycle events and print periodic status until Ctrl-C or the
/// optional run duration elapses.
async fn observe(
    harness: &Harness,
    mut events: UnboundedReceiver<LifecycleEvent>,
    status_every: Duration,
    run_for: Option<Duration>,
) {
    let mut status = tokio::time::interval(status_every);
    status.tick().await;

    let timeout = async {
        match run_for {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(timeout);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            Some(event) = events.recv() => log_event(&event),
            _ = status.tick() => report_status(harness),
            _ = &mut ctrl_c => {
                info!("Interrupted, stopping tasks");
                break;
            }
            _ = &mut timeout => {
                info!("Run duration elapsed, stopping tasks");
                break;
            }
        }
    }
}

fn log_event(event: &LifecycleEvent) {
    match event.kind {
        EventKind::ExecutionStarted => trace!(task = event.task_id, at = %event.at, "started"),
        EventKind::ExecutionEnded => trace!(task = event.task_id, at = %event.at, "ended"),
        EventKind::DeadlineMissed {
            new_count,
            lateness_us,
        } => debug!(
            task = event.task_id,
            missed = new_count,
            lateness_us,
            "miss observed"
        ),
    }
}

fn report_status(harness: &Harness) {
    let snap = harness.snapshot();
    info!(
        tasks = snap.tasks.len(),
        capacity = harness.registry().capacity(),
        next_id = harness.next_free_id(),
        executions = snap.total_executions,
        missed = snap.total_deadline_misses,
        executing = ?snap.currently_executing,
        "status"
    );

    let now = TimeSpec::now();
    for t in &snap.tasks {
        debug!(
            "  [{id:>2}] {class:<5} P={p}ms D={d}ms prio={prio} runs={runs} missed={missed} progress={progress:.0}%",
            id = t.id(),
            class = t.class().short_name(),
            p = t.period_ms(),
            d = t.relative_deadline_ms(),
            prio = t.priority(),
            runs = t.executions(),
            missed = t.missed_deadlines(),
            progress = t.period_progress(&now) * 100.0,
        );
    }

    for (prio, ids) in snap.priority_groups() {
        debug!("  priority {prio} shared by tasks {ids:?}");
    }
}

/// Request every task to stop, then join them off the async runtime.
async fn shutdown(handles: Vec<TaskHandle>) {
    for h in &handles {
        h.request_stop();
    }
    let joined = tokio::task::spawn_blocking(move || {
        handles
            .into_iter()
            .map(|h| (h.id(), h.join()))
            .collect::<Vec<_>>()
    })
    .await;

    let results = match joined {
        Ok(results) => results,
        Err(e) => {
            error!("Join worker failed: {}", e);
            return;
        }
    };
    for (id, result) in results {
        match result {
            Ok(Some(last)) => info!(
                task = id,
                executions = last.executions(),
                missed = last.missed_deadlines(),
                "final"
            ),
            Ok(None) => warn!(task = id, "task ended without a final record"),
            Err(e) => error!(task = id, "{}", e),
        }
    }
}
