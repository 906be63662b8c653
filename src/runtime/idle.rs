//! Tiered idle backoff for workers waiting on work or termination.
//!
//! Spin first (bursty workloads refill worklists within nanoseconds), then
//! yield periodically so co-scheduled workers can publish their staged
//! pushes. There is no park tier: loop lifetimes are bounded by the work in
//! flight, and termination detection wants bounded-latency re-checks of the
//! emptiness condition.

/// Graduated spin-then-yield policy. One instance per worker per loop.
pub(crate) struct TieredIdle {
    rounds: u32,
    spin_iters: u32,
}

impl TieredIdle {
    pub(crate) fn new(spin_iters: u32) -> Self {
        Self {
            rounds: 0,
            spin_iters,
        }
    }

    /// Work was found; restart the spin tier.
    #[inline]
    pub(crate) fn on_work(&mut self) {
        self.rounds = 0;
    }

    /// No work this round; wait a little.
    #[inline]
    pub(crate) fn on_idle(&mut self) {
        self.rounds = self.rounds.saturating_add(1);
        if self.rounds <= self.spin_iters {
            std::hint::spin_loop();
        } else if (self.rounds & 0xF) == 0 {
            std::thread::yield_now();
        } else {
            std::hint::spin_loop();
        }
    }
}
