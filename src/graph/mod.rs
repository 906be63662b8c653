//! Compressed-sparse-row graphs for the applications.
//!
//! Minimal adjacency storage: `u32` node ids, a row-offset array, flat
//! destination and edge-payload arrays, and per-node data accessed by
//! shared reference (applications keep atomics or locks inside their node
//! type when they mutate concurrently). Construction is from in-memory
//! edge lists only.

use core::ops::Range;

/// CSR graph with node data `N` and edge data `E`.
pub struct Csr<N, E = ()> {
    row_start: Box<[usize]>,
    edge_dst: Box<[u32]>,
    edge_data: Box<[E]>,
    node_data: Box<[N]>,
}

impl<N, E: Clone> Csr<N, E> {
    /// Build from a directed edge list. Edges keep their relative order
    /// within each source's row.
    pub fn from_edges(
        num_nodes: usize,
        edges: &[(u32, u32, E)],
        mut make_node: impl FnMut(u32) -> N,
    ) -> Self {
        let mut degree = vec![0usize; num_nodes];
        for &(src, dst, _) in edges {
            assert!((src as usize) < num_nodes && (dst as usize) < num_nodes);
            degree[src as usize] += 1;
        }

        let mut row_start = Vec::with_capacity(num_nodes + 1);
        let mut acc = 0usize;
        row_start.push(0);
        for d in &degree {
            acc += d;
            row_start.push(acc);
        }

        let mut cursor: Vec<usize> = row_start[..num_nodes].to_vec();
        let mut edge_dst = vec![0u32; edges.len()];
        let mut edge_data: Vec<Option<E>> = vec![None; edges.len()];
        for (src, dst, e) in edges {
            let slot = cursor[*src as usize];
            cursor[*src as usize] += 1;
            edge_dst[slot] = *dst;
            edge_data[slot] = Some(e.clone());
        }

        Self {
            row_start: row_start.into_boxed_slice(),
            edge_dst: edge_dst.into_boxed_slice(),
            edge_data: edge_data
                .into_iter()
                .map(|e| e.expect("every slot filled"))
                .collect(),
            node_data: (0..num_nodes as u32).map(&mut make_node).collect(),
        }
    }
}

impl<N> Csr<N, ()> {
    /// Build the symmetric closure of an undirected edge list: each pair
    /// `(u, v)` produces both arcs.
    pub fn symmetric(
        num_nodes: usize,
        edges: &[(u32, u32)],
        make_node: impl FnMut(u32) -> N,
    ) -> Self {
        let mut directed = Vec::with_capacity(edges.len() * 2);
        for &(u, v) in edges {
            directed.push((u, v, ()));
            directed.push((v, u, ()));
        }
        Self::from_edges(num_nodes, &directed, make_node)
    }
}

impl<N, E> Csr<N, E> {
    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.node_data.len()
    }

    #[inline]
    pub fn num_edges(&self) -> usize {
        self.edge_dst.len()
    }

    /// Edge indices of `u`'s outgoing row.
    #[inline]
    pub fn edges(&self, u: u32) -> Range<usize> {
        self.row_start[u as usize]..self.row_start[u as usize + 1]
    }

    #[inline]
    pub fn degree(&self, u: u32) -> usize {
        self.edges(u).len()
    }

    /// Destination of edge `e`.
    #[inline]
    pub fn dst(&self, e: usize) -> u32 {
        self.edge_dst[e]
    }

    #[inline]
    pub fn edge(&self, e: usize) -> &E {
        &self.edge_data[e]
    }

    #[inline]
    pub fn node(&self, u: u32) -> &N {
        &self.node_data[u as usize]
    }

    /// All node ids.
    pub fn nodes(&self) -> impl Iterator<Item = u32> + '_ {
        0..self.node_data.len() as u32
    }
}
