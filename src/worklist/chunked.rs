//! Chunked FIFO: per-worker staging chunks that become globally visible
//! only when full.
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────────────────────────────────────┐
//!                 │                ChunkedFifo                   │
//!                 │                                              │
//!   worker 0 ────►│  curr ──┐                                    │
//!                 │  next ──┤   published: Fifo<Box<Chunk>>      │
//!   worker 1 ────►│  curr   ├──►  [■■■■] [■■■■] [■■■■]  ──────►  │
//!                 │  next ──┘    (full chunks only, FIFO)        │
//!                 └──────────────────────────────────────────────┘
//! ```
//!
//! Each worker owns two slots: `curr`, drained during pops, and `next`,
//! filled during pushes. A chunk reaches the shared FIFO only when it is
//! full, so the lock on the global queue is touched once per `CHUNK_SIZE`
//! operations instead of once per item.
//!
//! # Chunk states and ownership
//!
//! A chunk is owned by exactly one slot at a time: a worker's `curr`, a
//! worker's `next`, or the published FIFO. `Box` carries the ownership
//! through every hand-off, so a chunk is never referenced from two slots
//! at once and frees exactly once when drained.
//!
//! ```text
//!   fresh ──► owned-as-next ──► published ──► owned-as-curr ──► drained
//!                   │                              ▲
//!                   └──────── adopted directly ────┘   (pop with empty FIFO)
//! ```
//!
//! # Abort locality
//!
//! `aborted` always parks the item in the worker's own `next`, never the
//! shared FIFO. A rolled-back item re-runs on the worker that already has
//! its neighborhood in cache, and stays away from the worker it just
//! conflicted with.
//!
//! # Emptiness
//!
//! `empty` reports on the caller's view: its own two slots plus the shared
//! FIFO. Another worker's staged `next` is invisible — that worker will
//! drain it itself before it can go idle, which is what termination
//! detection relies on.

use crate::runtime::{PerWorker, WorkerId};

use super::stl::{Fifo, Lifo};
use super::Worklist;

/// Chunk body: the sequential specialization of the LIFO adapter. Intra-
/// chunk order is stack order; FIFO order holds between chunks.
type Chunk<T> = Lifo<T, false>;

/// Per-worker chunk slots.
struct Slots<T> {
    /// Chunk being drained by this worker's pops.
    curr: Option<Box<Chunk<T>>>,
    /// Chunk being filled by this worker's pushes; item count tracked
    /// alongside because the chunk itself is behind its (free) lock.
    next: Option<Box<Chunk<T>>>,
    next_size: usize,
}

impl<T> Default for Slots<T> {
    fn default() -> Self {
        Self {
            curr: None,
            next: None,
            next_size: 0,
        }
    }
}

/// Batching worklist: per-worker staging chunks over a shared FIFO of full
/// chunks.
///
/// `PUSH_TO_LOCAL` selects the push policy: `true` (default) favors the
/// worker's own `curr` so freshly created work runs soonest; `false`
/// stages every push in `next` for global distribution.
pub struct ChunkedFifo<T, const CHUNK_SIZE: usize = 64, const PUSH_TO_LOCAL: bool = true> {
    published: Fifo<Box<Chunk<T>>>,
    slots: PerWorker<Slots<T>>,
}

impl<T: Send, const CHUNK_SIZE: usize, const PUSH_TO_LOCAL: bool>
    ChunkedFifo<T, CHUNK_SIZE, PUSH_TO_LOCAL>
{
    /// An empty worklist for `workers` workers.
    pub fn new(workers: usize) -> Self {
        assert!(CHUNK_SIZE > 0, "chunk size must be > 0");
        Self {
            published: Fifo::new(),
            slots: PerWorker::new(workers, |_| Slots::default()),
        }
    }

    /// Chunks currently in the shared FIFO. Observability only; racy under
    /// concurrent use like every other emptiness signal here.
    pub fn queued_chunks(&self) -> usize {
        self.published.len()
    }

    /// Stage `v` in `next`, publishing `next` first if it is full.
    fn push_next(published: &Fifo<Box<Chunk<T>>>, n: &mut Slots<T>, v: T) {
        if n.next.is_none() {
            n.next = Some(Box::new(Chunk::new()));
            n.next_size = 0;
        }
        if n.next_size == CHUNK_SIZE {
            let full = n.next.take().expect("full next chunk present");
            published.push_item(full);
            n.next = Some(Box::new(Chunk::new()));
            n.next_size = 0;
        }
        n.next.as_ref().expect("next chunk present").push_item(v);
        n.next_size += 1;
    }

    /// Refill `curr`: prefer a published chunk, else adopt our own `next`.
    fn fill_curr(&self, n: &mut Slots<T>) {
        n.curr = match self.published.pop_item() {
            Some(chunk) => Some(chunk),
            None => {
                n.next_size = 0;
                n.next.take()
            }
        };
    }

    fn push_local(&self, n: &mut Slots<T>, v: T) {
        if n.curr.is_none() {
            self.fill_curr(n);
        }
        match &n.curr {
            Some(chunk) => chunk.push_item(v),
            None => Self::push_next(&self.published, n, v),
        }
    }
}

impl<T: Send, const CHUNK_SIZE: usize, const PUSH_TO_LOCAL: bool> Worklist<T>
    for ChunkedFifo<T, CHUNK_SIZE, PUSH_TO_LOCAL>
{
    fn push(&self, w: WorkerId, v: T) {
        // SAFETY: `w` is the calling worker's own id (driver contract).
        let n = unsafe { self.slots.get(w) };
        if PUSH_TO_LOCAL {
            self.push_local(n, v);
        } else {
            Self::push_next(&self.published, n, v);
        }
    }

    fn pop(&self, w: WorkerId) -> Option<T> {
        // SAFETY: `w` is the calling worker's own id (driver contract).
        let n = unsafe { self.slots.get(w) };
        loop {
            if n.curr.is_none() {
                self.fill_curr(n);
            }
            match &n.curr {
                Some(chunk) => match chunk.pop_item() {
                    Some(v) => return Some(v),
                    // Drained; free it and try for another chunk.
                    None => n.curr = None,
                },
                None => return None,
            }
        }
    }

    fn empty(&self, w: WorkerId) -> bool {
        // SAFETY: `w` is the calling worker's own id (driver contract).
        let n = unsafe { self.slots.get(w) };
        if let Some(chunk) = &n.curr {
            if !chunk.is_empty() {
                return false;
            }
        }
        if let Some(chunk) = &n.next {
            if !chunk.is_empty() {
                return false;
            }
        }
        self.published.is_empty()
    }

    /// Rolled-back work parks in this worker's `next`, regardless of the
    /// push policy: locally biased re-delivery, out of the shared FIFO
    /// where another worker could immediately re-acquire and re-conflict.
    fn aborted(&self, w: WorkerId, v: T) {
        // SAFETY: `w` is the calling worker's own id (driver contract).
        let n = unsafe { self.slots.get(w) };
        Self::push_next(&self.published, n, v);
    }

    /// Bulk seed, publishing every seeded chunk (the final, possibly
    /// partial, one included) so all items are immediately visible to all
    /// workers.
    fn fill_initial(&mut self, items: Vec<T>) {
        let n = self.slots.get_mut(WorkerId::FIRST);
        for v in items {
            Self::push_next(&self.published, n, v);
        }
        if let Some(chunk) = n.next.take() {
            self.published.push_item(chunk);
        }
        n.next_size = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: WorkerId = WorkerId::FIRST;

    #[test]
    fn publishes_only_full_chunks() {
        // Staging policy: every push goes through `next`.
        let wl = ChunkedFifo::<u32, 4, false>::new(1);
        for v in 0..4 {
            wl.push(W, v);
        }
        assert_eq!(wl.queued_chunks(), 0);

        wl.push(W, 4);
        // The first four went out as one full chunk; the fifth is staged.
        assert_eq!(wl.queued_chunks(), 1);

        let mut drained = Vec::new();
        while let Some(v) = wl.pop(W) {
            drained.push(v);
        }
        drained.sort_unstable();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn pop_adopts_own_next_when_fifo_is_dry() {
        let wl = ChunkedFifo::<u32, 64>::new(2);
        wl.push(W, 7);
        assert_eq!(wl.queued_chunks(), 0);
        assert_eq!(wl.pop(W), Some(7));
        assert_eq!(wl.pop(W), None);
    }

    #[test]
    fn other_workers_see_published_chunks() {
        let a = WorkerId::new(0);
        let b = WorkerId::new(1);
        let wl = ChunkedFifo::<u32, 2, false>::new(2);
        for v in 0..4 {
            wl.push(a, v);
        }
        // Two full chunks published; worker b drains them.
        assert_eq!(wl.queued_chunks(), 2);
        let mut seen = Vec::new();
        while let Some(v) = wl.pop(b) {
            seen.push(v);
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[test]
    fn aborted_items_return_to_the_same_worker() {
        let wl = ChunkedFifo::<u32, 8>::new(2);
        wl.aborted(W, 42);
        assert!(!wl.empty(W));
        assert_eq!(wl.pop(W), Some(42));
    }

    #[test]
    fn fill_initial_makes_all_items_visible() {
        let mut wl = ChunkedFifo::<u32, 4>::new(2);
        wl.fill_initial((0..10).collect());
        // 10 items, chunk size 4: three chunks, the last one partial.
        assert_eq!(wl.queued_chunks(), 3);

        let b = WorkerId::new(1);
        let mut drained = Vec::new();
        while let Some(v) = wl.pop(b) {
            drained.push(v);
        }
        drained.sort_unstable();
        assert_eq!(drained, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn empty_tracks_the_callers_view() {
        let a = WorkerId::new(0);
        let b = WorkerId::new(1);
        let wl = ChunkedFifo::<u32, 64>::new(2);
        assert!(wl.empty(a));
        wl.push(a, 1);
        // Staged in a's next: a sees it, b does not.
        assert!(!wl.empty(a));
        assert!(wl.empty(b));
    }
}
