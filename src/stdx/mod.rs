//! Small, self-contained primitives used across the runtime.
//!
//! # Scope
//! `stdx` hosts narrow utilities with no scheduling policy of their own.
//! They are tuned for predictable fast paths rather than general-purpose
//! ergonomics.
//!
//! # Module map
//! - `spinlock`: one-word test-and-set lock with a compile-time concurrency
//!   toggle; the sequential specialization compiles to plain access.
//!
//! # Safety
//! Types here use `unsafe` internally and rely on invariants called out in
//! their module docs. Read those before extending or reusing the internals.

pub mod spinlock;

pub use spinlock::{SpinGuard, Spinlock};
