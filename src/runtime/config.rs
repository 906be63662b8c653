//! Runtime handle and per-loop configuration.
//!
//! All parallel loops hang off a [`Runtime`] value that owns the worker
//! count and the master seed. There is no module-level mutable state: code
//! that wants to run a loop holds a `Runtime` and calls its methods, so the
//! environment a loop observes is exactly what its handle carries.
//!
//! [`LoopConfig`] is the per-invocation policy bundle (the loop name for
//! reporting, steal control, spin tuning). Both types serialize, so a test
//! harness can record the exact configuration a run used and replay it.

use serde::{Deserialize, Serialize};

/// Handle to the parallel runtime: a fixed worker count and a master seed.
///
/// Cheap to clone; loops spawn their workers per invocation and join them
/// before returning, so a `Runtime` holds no threads of its own.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Runtime {
    workers: usize,
    seed: u64,
}

impl Runtime {
    /// A runtime with `workers` worker threads and the default seed.
    ///
    /// # Panics
    /// Panics if `workers` is 0.
    pub fn new(workers: usize) -> Self {
        Self::with_seed(workers, 0x853c49e6748fea9b)
    }

    /// A runtime with an explicit master seed (reproducible steal order on
    /// a fixed worker count).
    pub fn with_seed(workers: usize, seed: u64) -> Self {
        assert!(workers > 0, "workers must be > 0");
        Self { workers, seed }
    }

    /// Number of worker threads each loop spawns.
    #[inline]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Master seed; per-worker streams are derived from it.
    #[inline]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Per-worker RNG seed, decorrelated across worker ids.
    pub(crate) fn worker_seed(&self, worker: usize) -> u64 {
        self.seed ^ (worker as u64).wrapping_mul(0x9E3779B97F4A7C15)
    }
}

/// Per-loop policy: name tag, steal control, spin tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Loop name, attached to the returned report.
    pub name: String,

    /// Allow idle workers to take work from elsewhere (victim deques in
    /// `do_all`, the worklist's steal capability in `for_each`).
    pub steal: bool,

    /// Spin iterations before a waiting worker starts yielding.
    pub spin_iters: u32,
}

impl LoopConfig {
    /// Config with the given loop name and default policy.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Self::default()
        }
    }

    /// Validate configuration. Panics on invalid values.
    pub fn validate(&self) {
        assert!(self.spin_iters > 0, "spin_iters must be > 0");
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            name: "loop".to_owned(),
            steal: true,
            spin_iters: 200,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "workers must be > 0")]
    fn zero_workers_rejected() {
        let _ = Runtime::new(0);
    }

    #[test]
    fn worker_seeds_are_distinct() {
        let rt = Runtime::new(4);
        let seeds: Vec<_> = (0..4).map(|w| rt.worker_seed(w)).collect();
        for i in 0..seeds.len() {
            for j in i + 1..seeds.len() {
                assert_ne!(seeds[i], seeds[j]);
            }
        }
    }

    #[test]
    fn named_config_keeps_defaults() {
        let cfg = LoopConfig::named("discharge");
        assert_eq!(cfg.name, "discharge");
        assert!(cfg.steal);
        cfg.validate();
    }

    #[test]
    #[should_panic(expected = "spin_iters")]
    fn zero_spin_rejected() {
        let cfg = LoopConfig {
            spin_iters: 0,
            ..LoopConfig::default()
        };
        cfg.validate();
    }
}
