//! Core traits shared by all sketches

use crate::common::{Counter, FlowKey};

/// Operations every sketch supports regardless of its query semantics
///
/// `clear` returns the sketch to the state right after construction: counters
/// zeroed, auxiliary scalars reset, hash functions untouched. No memory is
/// reallocated. `byte_size` is the sketch's self-reported footprint covering
/// the instance, its hash functions, and its tables.
pub trait Sketch {
    /// Reset to the post-construction state, keeping hash functions
    fn clear(&mut self);

    /// Self-reported memory footprint in bytes
    fn byte_size(&self) -> usize;
}

/// Sketch that maps keyed updates to per-key estimates
///
/// `update` folds `(key, val)` into the summary; `query` projects the
/// summary back to a point estimate for one key. The bias of the estimate
/// (one-sided, signed, bounded) is documented per sketch. Sketches that fix
/// the key width in their own state implement this for a single `N`; pure
/// table sketches implement it for every `N`.
pub trait KeyedSketch<T: Counter, const N: usize>: Sketch {
    /// Fold a keyed value into the summary
    fn update(&mut self, key: &FlowKey<N>, val: T);

    /// Point estimate for one key
    fn query(&self, key: &FlowKey<N>) -> T;
}
