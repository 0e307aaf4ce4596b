//! In-process counters, owned by the daemon and shared by handle.
//!
//! Components receive an `Arc<PilotMetrics>` at construction; nothing reads
//! or writes ambient global state. These are process-lifetime counters - the
//! persisted `Stats` in the state document are the durable ones.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct PilotMetrics {
    pub brain_cycles: AtomicU64,
    pub light_cycles: AtomicU64,
    pub weekly_resets: AtomicU64,
    pub actions_executed: AtomicU64,
    pub actions_failed: AtomicU64,
    pub reasoning_calls: AtomicU64,
    pub reasoning_failures: AtomicU64,
    pub notifications_sent: AtomicU64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MetricsSnapshot {
    pub brain_cycles: u64,
    pub light_cycles: u64,
    pub weekly_resets: u64,
    pub actions_executed: u64,
    pub actions_failed: u64,
    pub reasoning_calls: u64,
    pub reasoning_failures: u64,
    pub notifications_sent: u64,
}

impl PilotMetrics {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            brain_cycles: self.brain_cycles.load(Ordering::Relaxed),
            light_cycles: self.light_cycles.load(Ordering::Relaxed),
            weekly_resets: self.weekly_resets.load(Ordering::Relaxed),
            actions_executed: self.actions_executed.load(Ordering::Relaxed),
            actions_failed: self.actions_failed.load(Ordering::Relaxed),
            reasoning_calls: self.reasoning_calls.load(Ordering::Relaxed),
            reasoning_failures: self.reasoning_failures.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
        }
    }
}
