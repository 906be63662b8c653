//! Worker identity for per-worker routing.
//!
//! Worker ids are dense indices `0..workers`, assigned by the loop drivers
//! when they spawn their thread pool and passed *explicitly* through every
//! worklist operation. There is deliberately no thread-local fallback: an
//! operation that needs a worker identity takes one as a parameter, so the
//! ownership story of per-worker records is visible at every call site.

/// Dense worker index, `0..workers`.
///
/// Cheap to copy and compare; the drivers guarantee that at any moment at
/// most one OS thread acts as a given id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(usize);

impl WorkerId {
    /// Worker 0; the id under which single-threaded setup (bulk seeding,
    /// tests) runs.
    pub const FIRST: WorkerId = WorkerId(0);

    /// Construct from a dense index.
    #[inline]
    pub const fn new(index: usize) -> Self {
        WorkerId(index)
    }

    /// The dense index, for slot addressing.
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl core::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "w{}", self.0)
    }
}
