//! Parallel runtime for amorphous data-parallel computation on irregular
//! graphs.
//!
//! The heart of the crate is a library of composable, thread-safe
//! worklists that deliver tasks to a fixed pool of workers while
//! preserving application-specified ordering heuristics, supporting
//! speculative abort/retry, and scaling through per-worker locality:
//!
//! - Adapter worklists over sequential containers ([`worklist::Lifo`],
//!   [`worklist::Fifo`], [`worklist::PriQueue`]) — simple, contended.
//! - [`worklist::ChunkedFifo`] — per-worker staging chunks published to a
//!   shared queue only when full; aborts re-park locally.
//! - [`worklist::Obim`] — priority buckets by an integer metric with
//!   per-worker monotone cursors; best-effort global order.
//! - [`worklist::CacheByMetric`] — a small per-worker cache of the best
//!   items in front of any parent worklist.
//!
//! Two loop drivers consume them: [`runtime::Runtime::for_each`], the
//! speculative driver with buffered context pushes, abort/retry, and
//! parallel break; and [`runtime::Runtime::do_all`], the non-speculative
//! bulk map with work stealing.
//!
//! ```
//! use worklist_rs::runtime::{LoopConfig, Runtime};
//! use worklist_rs::worklist::ChunkedFifo;
//!
//! let rt = Runtime::new(4);
//! let mut wl = ChunkedFifo::<u64, 64>::new(rt.workers());
//! let report = rt
//!     .for_each::<_, _, _, std::convert::Infallible>(
//!         &LoopConfig::named("count-down"),
//!         &mut wl,
//!         vec![16u64],
//!         |&n, ctx| {
//!             if n > 0 {
//!                 ctx.push(n - 1);
//!             }
//!             Ok(())
//!         },
//!     )
//!     .unwrap();
//! assert_eq!(report.committed, 17);
//! ```
//!
//! The [`apps`] module holds three graph applications (spanning forest,
//! preflow-push max-flow, static timing analysis) written purely against
//! the public driver surface; they are both examples and end-to-end
//! exercises of the substrate.

pub mod apps;
pub mod graph;
pub mod runtime;
pub mod stdx;
pub mod worklist;

pub use runtime::{LoopConfig, LoopReport, OpError, Runtime, UserContext, WorkerId};
pub use worklist::{CacheByMetric, ChunkedFifo, Fifo, Lifo, Obim, PriQueue, Worklist};
