//! Scheduling substrate: per-worker state, loop drivers, and reporting.
//!
//! # Overview
//!
//! The runtime drives application operators over the worklists in
//! [`crate::worklist`]. A [`Runtime`] handle fixes the worker count and
//! master seed; each loop invocation spawns its own scoped thread pool,
//! drains work, and joins before returning, so nothing here outlives a
//! loop and there is no module-level mutable state.
//!
//! ```text
//!   Runtime::for_each(cfg, &mut wl, initial, op)
//!        │
//!        ├── wl.fill_initial(initial)          (single-threaded seed)
//!        ├── spawn worker 0..N  ──┐
//!        │      pop → op → commit │ per-worker metrics, no atomics
//!        │      or abort/retry    │
//!        ├── join all ◄───────────┘
//!        └── merged LoopReport (or first fatal error)
//! ```
//!
//! # Module map
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | `Runtime` handle + per-loop `LoopConfig` |
//! | [`for_each`] | Speculative driver with commit/abort and parallel break |
//! | [`do_all`] | Non-speculative bulk map over stealing deques |
//! | [`per_worker`] | One record per worker, merge on teardown |
//! | [`worker_id`] | Dense worker identity, explicit at every call site |
//! | [`metrics`] | Per-worker counters merged into a per-loop report |
//! | [`rng`] | Deterministic victim selection |
//! | [`idle`] | Spin-then-yield waiting |
//!
//! # Concurrency model
//!
//! A fixed pool of OS threads per loop; cooperative within a worker (one
//! operator at a time), parallel across workers. Suspension happens only
//! in spinlock waits and the idle backoff — no blocking I/O, no parking.
//! Operators own any synchronization on user data structures; the
//! substrate synchronizes only its own queues and counters.

pub mod config;
pub mod do_all;
pub mod for_each;
pub(crate) mod idle;
pub mod metrics;
pub mod per_worker;
pub mod rng;
pub mod worker_id;

pub use config::{LoopConfig, Runtime};
pub use for_each::{OpError, UserContext};
pub use metrics::{LoopMetrics, LoopReport};
pub use per_worker::PerWorker;
pub use rng::XorShift64;
pub use worker_id::WorkerId;
