//! Cheap, deterministic per-loop metrics.
//!
//! ## Design
//!
//! - **Per-worker local counters**: hot-path updates are plain integer ops,
//!   no atomics, no false sharing (each worker owns its record for the
//!   loop's extent).
//! - **Post-join aggregation**: workers return their counters when they
//!   exit; the driver merges them into one [`LoopReport`] after the joins,
//!   so observation never contends with execution.
//!
//! The report is the drivers' only side channel: committed/aborted counts,
//! push/pop totals, steal rates, and wall time, keyed by the loop name.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-worker counters, updated with plain integer ops on the hot path.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoopMetrics {
    /// Operator invocations that returned normally and committed.
    pub committed: u64,
    /// Operator invocations rolled back and re-queued.
    pub aborted: u64,
    /// Items pushed (committed context pushes; seeds are not counted).
    pub pushes: u64,
    /// Items popped and handed to the operator.
    pub pops: u64,
    /// Steal attempts (victim probes).
    pub steal_attempts: u64,
    /// Steals that yielded an item.
    pub steal_successes: u64,
}

impl LoopMetrics {
    #[inline]
    pub(crate) fn add(&mut self, other: &LoopMetrics) {
        self.committed += other.committed;
        self.aborted += other.aborted;
        self.pushes += other.pushes;
        self.pops += other.pops;
        self.steal_attempts += other.steal_attempts;
        self.steal_successes += other.steal_successes;
    }
}

/// Merged metrics for one loop invocation.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LoopReport {
    /// The loop name from [`crate::runtime::LoopConfig`].
    pub name: String,
    /// Worker threads the loop ran with.
    pub workers: usize,
    /// Wall time of the whole invocation, including seeding and joins.
    pub elapsed: Duration,
    /// Operator invocations that committed.
    pub committed: u64,
    /// Operator invocations rolled back and re-queued.
    pub aborted: u64,
    /// Items pushed through operator contexts.
    pub pushes: u64,
    /// Items popped and executed (including re-executions after abort).
    pub pops: u64,
    /// Steal attempts across all workers.
    pub steal_attempts: u64,
    /// Steals that yielded an item.
    pub steal_successes: u64,
}

impl LoopReport {
    pub(crate) fn merge(
        name: &str,
        workers: usize,
        elapsed: Duration,
        per_worker: &[LoopMetrics],
    ) -> Self {
        let mut total = LoopMetrics::default();
        for m in per_worker {
            total.add(m);
        }
        Self {
            name: name.to_owned(),
            workers,
            elapsed,
            committed: total.committed,
            aborted: total.aborted,
            pushes: total.pushes,
            pops: total.pops,
            steal_attempts: total.steal_attempts,
            steal_successes: total.steal_successes,
        }
    }

    /// Total operator invocations (committed + aborted).
    pub fn invocations(&self) -> u64 {
        self.committed + self.aborted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_sums_worker_counters() {
        let a = LoopMetrics {
            committed: 2,
            aborted: 1,
            pushes: 3,
            pops: 3,
            ..Default::default()
        };
        let b = LoopMetrics {
            committed: 5,
            steal_attempts: 7,
            steal_successes: 2,
            pops: 5,
            ..Default::default()
        };
        let report = LoopReport::merge("t", 2, Duration::from_millis(1), &[a, b]);
        assert_eq!(report.committed, 7);
        assert_eq!(report.aborted, 1);
        assert_eq!(report.invocations(), 8);
        assert_eq!(report.pops, 8);
        assert_eq!(report.steal_attempts, 7);
        assert_eq!(report.workers, 2);
    }
}
