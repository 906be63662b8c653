//! Composable, thread-safe worklists.
//!
//! # Capability set
//!
//! Every worklist is a thread-safe multiset of items with:
//!
//! - `push` — enqueue one item, callable from any worker concurrently;
//! - `pop` — dequeue one item, `None` when the caller's view is empty;
//! - `empty` — best-effort emptiness (racy by design: a concurrent push
//!   may falsify the answer before the caller reads it);
//! - `aborted` — re-enqueue an item whose execution rolled back; a worklist
//!   may treat this as `push` or bias re-delivery toward the same worker;
//! - `fill_initial` — single-threaded bulk seed at construction;
//! - optionally `steal`/`can_steal` for cross-worker taking.
//!
//! The worker id is an explicit parameter on every operation: per-worker
//! routing (chunk slots, cursors, caches) is visible at the call site
//! instead of hiding behind thread identity.
//!
//! # Composition
//!
//! The implementations are built to nest: the chunked FIFO's chunk bodies
//! are the sequential specialization of the same adapter that serves as a
//! standalone concurrent stack; the priority-bucket worklist holds any
//! worklist as its buckets; the metric cache fronts any parent. The loop
//! drivers are generic over the trait and never name a concrete policy.
//!
//! # Ordering
//!
//! Within one worker, pops follow the underlying policy (LIFO/FIFO/
//! priority). Across workers there is no total order; the priority
//! structures are best-effort and priority inversion is permitted.
//!
//! # Visibility
//!
//! An item is owned by the worklist from `push` until `pop` returns it.
//! Adapter pushes are visible to other workers when `push` returns; chunked
//! pushes become visible only when their chunk is published. Liveness
//! contract for termination detection: a worklist makes pushes visible to
//! the pushing worker's own view before that worker can go idle.

pub mod cache;
pub mod chunked;
pub mod obim;
pub mod stl;

pub use cache::CacheByMetric;
pub use chunked::ChunkedFifo;
pub use obim::Obim;
pub use stl::{Fifo, Lifo, PriQueue, SeqContainer, StlAdapter};

use crate::runtime::WorkerId;

/// The worklist capability set. See the module docs for the contract.
pub trait Worklist<T: Send>: Send + Sync {
    /// Enqueue one item. Callable from any worker, concurrently.
    fn push(&self, w: WorkerId, v: T);

    /// Dequeue one item, or `None` if the caller's view is empty.
    fn pop(&self, w: WorkerId) -> Option<T>;

    /// Best-effort emptiness of the caller's view.
    fn empty(&self, w: WorkerId) -> bool;

    /// Re-enqueue an item whose execution was rolled back.
    fn aborted(&self, w: WorkerId, v: T);

    /// Single-threaded bulk seed. Callers run this before workers start.
    fn fill_initial(&mut self, items: Vec<T>);

    /// Take an item from another worker's share, if supported.
    fn steal(&self, _w: WorkerId) -> Option<T> {
        None
    }

    /// Whether `steal` can ever return an item.
    fn can_steal(&self) -> bool {
        false
    }
}
