//! Effect Scheduler
//!
//! Effects never run inside a render pass. A pass that makes an effect due
//! queues a task for it; the renderer drains the queue afterwards, either
//! all at once ([`Renderer::flush_effects`](crate::Renderer::flush_effects))
//! or as tasks fall due on the tokio clock.
//!
//! # Staleness
//!
//! Every task carries the epoch its slot had when the task was queued. A
//! slot's epoch moves on whenever a newer run is scheduled or the instance
//! unmounts, so by the time a task is popped it may no longer be the
//! current one. Such tasks are skipped, not run.

use std::collections::VecDeque;

use tokio::time::Instant;

use crate::tree::NodeId;

/// One scheduled effect run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EffectTask {
    pub(crate) node: NodeId,
    pub(crate) slot: usize,
    pub(crate) epoch: u64,
    pub(crate) due: Instant,
}

/// FIFO of pending effect runs.
///
/// Tasks are queued with a fixed delay, so queue order is also due order.
#[derive(Debug, Default)]
pub(crate) struct EffectQueue {
    tasks: VecDeque<EffectTask>,
}

impl EffectQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, task: EffectTask) {
        self.tasks.push_back(task);
    }

    pub(crate) fn pop_front(&mut self) -> Option<EffectTask> {
        self.tasks.pop_front()
    }

    /// Pop the oldest task if it is due at `now`.
    pub(crate) fn pop_due(&mut self, now: Instant) -> Option<EffectTask> {
        match self.tasks.front() {
            Some(task) if task.due <= now => self.tasks.pop_front(),
            _ => None,
        }
    }

    /// When the oldest task falls due.
    pub(crate) fn next_due(&self) -> Option<Instant> {
        self.tasks.front().map(|task| task.due)
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }
}
