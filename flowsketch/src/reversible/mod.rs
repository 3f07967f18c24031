//! Reversible sketches: structure that lets the summary name its own keys
//!
//! Plain frequency sketches can only answer questions about keys the caller
//! already holds. The sketches here spend extra counters on key structure
//! (per-bit counts, quotient groups, candidate slots) so that heavy hitters
//! and heavy changers can be *recovered* from the table without a candidate
//! list.

mod deltoid;
mod fast_sketch;
mod ld_sketch;
mod mv_sketch;

pub use deltoid::Deltoid;
pub use fast_sketch::FastSketch;
pub use ld_sketch::LDSketch;
pub use mv_sketch::MVSketch;

/// Lower and upper estimate for one flow
///
/// Produced by the bucket sketches that can bracket a flow's true count
/// (LDSketch, MVSketch). The true count lies in `[lower, upper]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bounds<T> {
    /// Largest provable undercount
    pub lower: T,
    /// Smallest provable overcount
    pub upper: T,
}
