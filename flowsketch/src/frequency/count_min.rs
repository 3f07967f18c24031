//! Count-Min sketch for per-flow frequency estimation
//!
//! Count-Min (Cormode & Muthukrishnan, 2005) keeps a `depth x width` grid of
//! non-negative counters. Every update adds into one counter per row; the
//! query takes the minimum across rows, so the error is one-sided: estimates
//! never fall below the true count and exceed it only through collisions.
//!
//! Widths are rounded up to the next prime to decorrelate rows.
//!
//! # Examples
//! ```
//! use flowsketch::frequency::CountMinSketch;
//! use flowsketch::{AwareHash, FlowKey, KeyedSketch};
//!
//! let mut cm = CountMinSketch::<u32, AwareHash>::with_seed(4, 256, 1).unwrap();
//! let flow = FlowKey::<4>::from(0x0a000001u32);
//! cm.update(&flow, 10);
//! cm.update(&flow, 3);
//! assert!(cm.query(&flow) >= 13);
//! ```

use crate::common::{
    invalid_capacity, util, with_process_rng, Counter, FlowHasher, FlowKey, HashFamily,
    KeyedSketch, Result, SeededHasher, Sketch,
};
use crate::common::table::CounterTable;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Count-Min sketch: `depth x width` non-negative counters, min-of-rows query
#[derive(Clone, Debug)]
pub struct CountMinSketch<T, H> {
    depth: usize,
    width: usize,
    hashes: HashFamily<H>,
    table: CounterTable<T>,
}

impl<T: Counter, H: SeededHasher> CountMinSketch<T, H> {
    /// Build a sketch seeded from the process-wide PRNG
    ///
    /// `width` is rounded up to the next prime.
    ///
    /// # Errors
    /// Returns `InvalidCapacity` if `depth` or `width` is zero.
    pub fn new(depth: usize, width: usize) -> Result<Self> {
        with_process_rng(|rng| Self::with_rng(depth, width, rng))
    }

    /// Build a sketch with a private deterministic seed
    pub fn with_seed(depth: usize, width: usize, seed: u64) -> Result<Self> {
        Self::with_rng(depth, width, &mut StdRng::seed_from_u64(seed))
    }

    /// Build a sketch drawing hash state from `rng`
    pub fn with_rng<R: Rng + ?Sized>(depth: usize, width: usize, rng: &mut R) -> Result<Self> {
        if depth == 0 {
            return Err(invalid_capacity("depth", depth, "must be > 0"));
        }
        if width == 0 {
            return Err(invalid_capacity("width", width, "must be > 0"));
        }
        let width = util::next_prime(width);
        Ok(Self {
            depth,
            width,
            hashes: HashFamily::with_rng(depth, rng)?,
            table: CounterTable::new(depth, width)?,
        })
    }

    /// Number of rows
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Counters per row (prime)
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    fn index<const N: usize>(&self, row: usize, key: &FlowKey<N>) -> usize {
        (self.hashes[row].hash_key(key) % self.width as u64) as usize
    }

    /// Add `val` to the flow's counter in every row
    pub fn update<const N: usize>(&mut self, key: &FlowKey<N>, val: T) {
        for row in 0..self.depth {
            let idx = self.index(row, key);
            self.table.add(row, idx, val);
        }
    }

    /// Minimum counter across rows; never underestimates
    pub fn query<const N: usize>(&self, key: &FlowKey<N>) -> T {
        let mut min_val = T::MAX;
        for row in 0..self.depth {
            let idx = self.index(row, key);
            min_val = min_val.min(self.table.at(row, idx));
        }
        min_val
    }
}

impl<T: Counter, H: SeededHasher> Sketch for CountMinSketch<T, H> {
    fn clear(&mut self) {
        self.table.clear();
    }

    fn byte_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.hashes.byte_size() + self.table.heap_bytes()
    }
}

impl<T: Counter, H: SeededHasher, const N: usize> KeyedSketch<T, N> for CountMinSketch<T, H> {
    fn update(&mut self, key: &FlowKey<N>, val: T) {
        CountMinSketch::update(self, key, val);
    }

    fn query(&self, key: &FlowKey<N>) -> T {
        CountMinSketch::query(self, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::AwareHash;

    #[test]
    fn test_width_is_primed() {
        let cm = CountMinSketch::<u32, AwareHash>::with_seed(4, 256, 1).unwrap();
        assert_eq!(cm.width(), 257);
        assert_eq!(cm.depth(), 4);
    }

    #[test]
    fn test_rejects_zero_dims() {
        assert!(CountMinSketch::<u32, AwareHash>::with_seed(0, 16, 1).is_err());
        assert!(CountMinSketch::<u32, AwareHash>::with_seed(4, 0, 1).is_err());
    }

    #[test]
    fn test_unseen_key_reads_zero() {
        let cm = CountMinSketch::<u32, AwareHash>::with_seed(4, 64, 1).unwrap();
        assert_eq!(cm.query(&FlowKey::<4>::from(9u32)), 0);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut cm = CountMinSketch::<u32, AwareHash>::with_seed(4, 64, 1).unwrap();
        let key = FlowKey::<4>::from(1u32);
        cm.update(&key, 5);
        cm.clear();
        assert_eq!(cm.query(&key), 0);
    }
}
