//! Executor-agnostic async primitives.
//!
//! The node runs a handful of cooperative tasks (MAC, location engine,
//! application glue) on whatever executor the platform provides. These
//! primitives only assume that all of them are polled from the same
//! executor thread; state crossing the ISR boundary goes through
//! `critical-section` in the PHY instead.

pub mod channel;
pub mod join;
pub mod mutex;
pub mod queue;
pub mod select;
pub mod yield_now;

/// The result of a [`select`](select::select): which future finished
/// first.
pub enum Either<A, B> {
    /// The first future finished first.
    First(A),
    /// The second future finished first.
    Second(B),
}
