//! Sequential containers turned into worklists by the spinlock.
//!
//! [`StlAdapter`] wraps any [`SeqContainer`] (a stack, queue, or heap) in a
//! [`Spinlock`] and implements the worklist capability set on top: push,
//! pop, and empty each acquire-operate-release; `aborted` is exactly
//! `push`. Three canonical instantiations:
//!
//! - [`Lifo`] — `Vec`; pop returns the most recently pushed item.
//! - [`Fifo`] — `VecDeque` popped from the front; least recently pushed.
//! - [`PriQueue`] — `BinaryHeap`; pop returns the greatest element under
//!   `Ord` (wrap items in [`core::cmp::Reverse`] for min-first).
//!
//! These are safe under concurrent use but serialize every operation on one
//! lock, so they scale poorly under contention. They earn their keep as
//! building blocks: the chunked FIFO uses the sequential specialization
//! (`CONCURRENT = false`) as its chunk bodies and the concurrent FIFO as
//! its chunk queue, and the priority-bucket worklist defaults its buckets
//! to [`Fifo`].

use std::collections::{BinaryHeap, VecDeque};

use crate::runtime::WorkerId;
use crate::stdx::Spinlock;

use super::Worklist;

/// A sequential container usable under the adapter: push one, pop the
/// container's notion of "top", report emptiness.
pub trait SeqContainer: Default {
    /// Item type stored by the container.
    type Item;

    fn push(&mut self, v: Self::Item);
    fn pop_top(&mut self) -> Option<Self::Item>;
    fn is_empty(&self) -> bool;
    fn len(&self) -> usize;
}

impl<T> SeqContainer for Vec<T> {
    type Item = T;

    #[inline]
    fn push(&mut self, v: T) {
        Vec::push(self, v);
    }

    #[inline]
    fn pop_top(&mut self) -> Option<T> {
        self.pop()
    }

    #[inline]
    fn is_empty(&self) -> bool {
        Vec::is_empty(self)
    }

    #[inline]
    fn len(&self) -> usize {
        Vec::len(self)
    }
}

// Front-pop shim: a queue's "top" is its front.
impl<T> SeqContainer for VecDeque<T> {
    type Item = T;

    #[inline]
    fn push(&mut self, v: T) {
        self.push_back(v);
    }

    #[inline]
    fn pop_top(&mut self) -> Option<T> {
        self.pop_front()
    }

    #[inline]
    fn is_empty(&self) -> bool {
        VecDeque::is_empty(self)
    }

    #[inline]
    fn len(&self) -> usize {
        VecDeque::len(self)
    }
}

impl<T: Ord> SeqContainer for BinaryHeap<T> {
    type Item = T;

    #[inline]
    fn push(&mut self, v: T) {
        BinaryHeap::push(self, v);
    }

    #[inline]
    fn pop_top(&mut self) -> Option<T> {
        self.pop()
    }

    #[inline]
    fn is_empty(&self) -> bool {
        BinaryHeap::is_empty(self)
    }

    #[inline]
    fn len(&self) -> usize {
        BinaryHeap::len(self)
    }
}

/// A sequential container behind a spinlock.
///
/// With `CONCURRENT = false` the lock compiles away and this is a plain
/// single-threaded container with the same method surface — the chunked
/// FIFO's chunk bodies are exactly this specialization.
pub struct StlAdapter<C, const CONCURRENT: bool = true> {
    inner: Spinlock<C, CONCURRENT>,
}

/// Concurrent (or sequential) stack: pop returns the most recent push.
pub type Lifo<T, const CONCURRENT: bool = true> = StlAdapter<Vec<T>, CONCURRENT>;

/// Concurrent (or sequential) queue: pop returns the oldest push.
pub type Fifo<T, const CONCURRENT: bool = true> = StlAdapter<VecDeque<T>, CONCURRENT>;

/// Concurrent (or sequential) priority queue: pop returns the greatest
/// element under `Ord`. Use [`core::cmp::Reverse`] on the item type for
/// min-first order.
pub type PriQueue<T, const CONCURRENT: bool = true> = StlAdapter<BinaryHeap<T>, CONCURRENT>;

impl<C: SeqContainer, const CONCURRENT: bool> StlAdapter<C, CONCURRENT> {
    /// An empty adapter.
    pub fn new() -> Self {
        Self {
            inner: Spinlock::new(C::default()),
        }
    }

    /// Enqueue one item.
    #[inline]
    pub fn push_item(&self, v: C::Item) {
        self.inner.lock().push(v);
    }

    /// Dequeue the container's top, or `None` when empty.
    #[inline]
    pub fn pop_item(&self) -> Option<C::Item> {
        self.inner.lock().pop_top()
    }

    /// Whether the container is empty at the moment of the check.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Item count at the moment of the check.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Single-threaded bulk seed.
    pub fn seed(&mut self, items: impl IntoIterator<Item = C::Item>) {
        let c = self.inner.get_mut();
        for v in items {
            c.push(v);
        }
    }
}

impl<C: SeqContainer, const CONCURRENT: bool> Default for StlAdapter<C, CONCURRENT> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, C> Worklist<T> for StlAdapter<C, true>
where
    T: Send,
    C: SeqContainer<Item = T> + Send,
{
    #[inline]
    fn push(&self, _w: WorkerId, v: T) {
        self.push_item(v);
    }

    #[inline]
    fn pop(&self, _w: WorkerId) -> Option<T> {
        self.pop_item()
    }

    #[inline]
    fn empty(&self, _w: WorkerId) -> bool {
        self.is_empty()
    }

    #[inline]
    fn aborted(&self, _w: WorkerId, v: T) {
        self.push_item(v);
    }

    fn fill_initial(&mut self, items: Vec<T>) {
        self.seed(items);
    }
}
