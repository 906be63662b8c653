//! Spanning forest over an undirected graph.
//!
//! Concurrent union-find with CAS merges, run in two phases the way the
//! blocked asynchronous algorithm does it: a bulk `do_all` pass merges each
//! node's first edge and banks a continuation work item, then a
//! speculative `for_each` over a chunked FIFO drains the continuations.
//! Edges that close a cycle count as empty merges; edges that join two
//! components land in the forest.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::graph::Csr;
use crate::runtime::{LoopConfig, Runtime};
use crate::stdx::Spinlock;
use crate::worklist::ChunkedFifo;

/// Concurrent union-find over dense `u32` ids: CAS union, path-halving
/// find. Lower root id wins a union so merges cannot livelock.
pub struct UnionFind {
    parent: Box<[AtomicU32]>,
}

impl UnionFind {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n as u32).map(AtomicU32::new).collect(),
        }
    }

    /// Representative of `x`'s component, halving the path on the way.
    pub fn find(&self, mut x: u32) -> u32 {
        loop {
            let p = self.parent[x as usize].load(Ordering::Acquire);
            if p == x {
                return x;
            }
            let gp = self.parent[p as usize].load(Ordering::Acquire);
            if p == gp {
                return p;
            }
            // Halve: point x at its grandparent. A racing union may undo
            // this; it is only a shortcut.
            let _ = self.parent[x as usize].compare_exchange_weak(
                p,
                gp,
                Ordering::AcqRel,
                Ordering::Relaxed,
            );
            x = gp;
        }
    }

    /// Join the components of `a` and `b`. Returns `false` for an empty
    /// merge (already one component).
    pub fn union(&self, a: u32, b: u32) -> bool {
        loop {
            let ra = self.find(a);
            let rb = self.find(b);
            if ra == rb {
                return false;
            }
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            if self.parent[hi as usize]
                .compare_exchange(hi, lo, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return true;
            }
            // Someone re-rooted hi underneath us; retry from the new roots.
        }
    }

    /// Number of roots. Only meaningful after workers quiesce.
    pub fn components(&self) -> usize {
        (0..self.parent.len() as u32)
            .filter(|&x| self.parent[x as usize].load(Ordering::Acquire) == x)
            .count()
    }
}

/// Continuation: resume scanning `node`'s row at edge offset `resume_at`.
#[derive(Clone, Copy, Debug)]
struct WorkItem {
    node: u32,
    resume_at: usize,
}

/// Result of [`spanning_forest`].
pub struct Forest {
    /// Tree edges, one per successful merge.
    pub edges: Vec<(u32, u32)>,
    /// Component count after all merges.
    pub components: usize,
    /// Merges that found both endpoints already connected.
    pub empty_merges: u64,
}

/// Compute a spanning forest of `g` (interpreted as undirected; pass a
/// symmetric graph).
pub fn spanning_forest(rt: &Runtime, g: &Csr<()>) -> Forest {
    let n = g.num_nodes();
    let uf = UnionFind::new(n);
    let forest = Spinlock::new(Vec::new());
    let pending = Spinlock::new(Vec::new());
    let empty_merges = AtomicU64::new(0);

    // Phase 1: merge each node's first edge, bank the rest.
    rt.do_all(&LoopConfig::named("init-merge"), g.nodes().collect(), |u| {
        let Some(first) = g.edges(u).next() else {
            return;
        };
        if uf.union(u, g.dst(first)) {
            forest.lock().push((u, g.dst(first)));
        } else {
            empty_merges.fetch_add(1, Ordering::Relaxed);
        }
        if g.degree(u) > 1 {
            pending.lock().push(WorkItem {
                node: u,
                resume_at: 1,
            });
        }
    });

    // Phase 2: drain continuations; a failed merge defers the rest of the
    // row behind the failing edge.
    let initial = std::mem::take(&mut *pending.lock());
    let mut wl = ChunkedFifo::<WorkItem, 128>::new(rt.workers());
    rt.for_each::<_, _, _, core::convert::Infallible>(
        &LoopConfig::named("merge"),
        &mut wl,
        initial,
        |item, ctx| {
            let row = g.edges(item.node);
            for e in row.clone().skip(item.resume_at) {
                let dst = g.dst(e);
                if uf.union(item.node, dst) {
                    forest.lock().push((item.node, dst));
                } else {
                    empty_merges.fetch_add(1, Ordering::Relaxed);
                    let next = e + 1 - row.start;
                    if next < row.len() {
                        ctx.push(WorkItem {
                            node: item.node,
                            resume_at: next,
                        });
                    }
                    break;
                }
            }
            Ok(())
        },
    )
    .expect("merge operators are infallible");

    Forest {
        edges: forest.into_inner(),
        components: uf.components(),
        empty_merges: empty_merges.load(Ordering::Relaxed),
    }
}

/// Forest check: every edge internal to its component, and the edge count
/// exactly `nodes - components`.
pub fn verify_forest(g: &Csr<()>, forest: &Forest) -> Result<(), String> {
    let uf = UnionFind::new(g.num_nodes());
    for &(u, v) in &forest.edges {
        if !uf.union(u, v) {
            return Err(format!("edge ({u}, {v}) closes a cycle in the forest"));
        }
    }
    for u in g.nodes() {
        for e in g.edges(u) {
            let v = g.dst(e);
            if uf.find(u) != uf.find(v) {
                return Err(format!("graph edge ({u}, {v}) spans two components"));
            }
        }
    }
    let expected = g.num_nodes() - forest.components;
    if forest.edges.len() != expected {
        return Err(format!(
            "not a forest: expected {expected} edges, found {}",
            forest.edges.len()
        ));
    }
    Ok(())
}
