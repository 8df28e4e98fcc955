/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Lifecycle event stream from the periodic tasks to an external observer.
//!
//! All tasks fan in to one [`Observer`].  Per task, events arrive in loop
//! order (`ExecutionStarted`, `ExecutionEnded`, then `DeadlineMissed` if the
//! check failed); across tasks there is no ordering.
//!
//! `notify` is called from real-time threads between the workload and the
//! absolute sleep.  An implementation that blocks delays the sleep and
//! reintroduces drift, so it must return promptly.

use tokio::sync::mpsc;

use crate::task::TaskId;
use crate::time::TimeSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    ExecutionStarted,
    ExecutionEnded,
    DeadlineMissed {
        /// Miss total for the task after this miss.
        new_count: u64,
        /// How far past the absolute deadline the check ran, in µs.
        lateness_us: i64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub task_id: TaskId,
    pub kind: EventKind,
    /// Monotonic instant at which the event was produced.
    pub at: TimeSpec,
}

impl LifecycleEvent {
    pub fn new(task_id: TaskId, kind: EventKind) -> Self {
        Self {
            task_id,
            kind,
            at: TimeSpec::now(),
        }
    }
}

// ── Observer ──────────────────────────────────────────────────────────────────

/// Consumer of lifecycle events.  Must not block.
pub trait Observer: Send + Sync {
    fn notify(&self, event: LifecycleEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl Observer for NullObserver {
    fn notify(&self, _event: LifecycleEvent) {}
}

/// Forwards events into an unbounded tokio channel.
///
/// `UnboundedSender::send` never blocks and needs no runtime on the sending
/// side, so plain OS threads can use it; the receiver is drained by an async
/// consumer.  A closed receiver silently drops events.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<LifecycleEvent>,
}

impl ChannelObserver {
    /// Create an observer and the receiving end of its stream.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LifecycleEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Observer for ChannelObserver {
    fn notify(&self, event: LifecycleEvent) {
        let _ = self.tx.send(event);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
