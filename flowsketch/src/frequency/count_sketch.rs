//! CountSketch: signed counters with a median estimator
//!
//! CountSketch (Charikar, Chen & Farach-Colton, 2002) pairs each row with a
//! `+/-1` sign hash drawn from a second, independent family. Updates add
//! `val * sign`; queries recover the per-row estimator `counter * sign` and
//! return the absolute value of the median, which is unbiased rather than
//! one-sided. Signed counters are what later allow heavy-changer queries over
//! differences of sketches.

use crate::common::table::CounterTable;
use crate::common::{
    invalid_capacity, util, with_process_rng, Counter, FlowHasher, FlowKey, HashFamily,
    KeyedSketch, Result, SeededHasher, SignedCounter, Sketch,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// CountSketch over `depth x width` signed counters
///
/// # Examples
/// ```
/// use flowsketch::frequency::CountSketch;
/// use flowsketch::{AwareHash, FlowKey};
///
/// let mut cs = CountSketch::<i64, AwareHash>::with_seed(5, 128, 1).unwrap();
/// let flow = FlowKey::<4>::from(3u32);
/// cs.update(&flow, 4);
/// cs.update(&flow, 4);
/// assert!(cs.query(&flow) > 0);
/// ```
#[derive(Clone, Debug)]
pub struct CountSketch<T, H> {
    depth: usize,
    width: usize,
    index_hashes: HashFamily<H>,
    sign_hashes: HashFamily<H>,
    table: CounterTable<T>,
}

impl<T: SignedCounter, H: SeededHasher> CountSketch<T, H> {
    /// Build a sketch seeded from the process-wide PRNG
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
            index_hashes: HashFamily::with_rng(depth, rng)?,
            sign_hashes: HashFamily::with_rng(depth, rng)?,
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
    fn sign<const N: usize>(&self, row: usize, key: &FlowKey<N>) -> bool {
        self.sign_hashes[row].hash_key(key) & 1 == 1
    }

    /// Add `val * sign_row(key)` into each row
    pub fn update<const N: usize>(&mut self, key: &FlowKey<N>, val: T) {
        for row in 0..self.depth {
            let idx = (self.index_hashes[row].hash_key(key) % self.width as u64) as usize;
            let signed = if self.sign(row, key) {
                val
            } else {
                T::from_i64(-val.to_i64())
            };
            self.table.add(row, idx, signed);
        }
    }

    /// Absolute median of the per-row estimators `counter * sign`
    pub fn query<const N: usize>(&self, key: &FlowKey<N>) -> T {
        let mut values: Vec<T> = (0..self.depth)
            .map(|row| {
                let idx = (self.index_hashes[row].hash_key(key) % self.width as u64) as usize;
                let c = self.table.at(row, idx);
                if self.sign(row, key) {
                    c
                } else {
                    T::from_i64(-c.to_i64())
                }
            })
            .collect();
        util::abs_median(&mut values)
    }
}

impl<T: SignedCounter, H: SeededHasher> Sketch for CountSketch<T, H> {
    fn clear(&mut self) {
        self.table.clear();
    }

    fn byte_size(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.index_hashes.byte_size()
            + self.sign_hashes.byte_size()
            + self.table.heap_bytes()
    }
}

impl<T: SignedCounter, H: SeededHasher, const N: usize> KeyedSketch<T, N> for CountSketch<T, H> {
    fn update(&mut self, key: &FlowKey<N>, val: T) {
        CountSketch::update(self, key, val);
    }

    fn query(&self, key: &FlowKey<N>) -> T {
        CountSketch::query(self, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::AwareHash;

    #[test]
    fn test_lone_flow_is_exact() {
        let mut cs = CountSketch::<i64, AwareHash>::with_seed(5, 64, 2).unwrap();
        let key = FlowKey::<4>::from(42u32);
        cs.update(&key, 6);
        cs.update(&key, 6);
        assert_eq!(cs.query(&key), 12);
    }

    #[test]
    fn test_query_is_nonnegative() {
        let mut cs = CountSketch::<i64, AwareHash>::with_seed(3, 8, 5).unwrap();
        for v in 0..50u32 {
            cs.update(&FlowKey::<4>::from(v), 1);
        }
        for v in 0..50u32 {
            assert!(cs.query(&FlowKey::<4>::from(v)) >= 0);
        }
    }

    #[test]
    fn test_clear_resets() {
        let mut cs = CountSketch::<i64, AwareHash>::with_seed(3, 8, 5).unwrap();
        let key = FlowKey::<4>::from(1u32);
        cs.update(&key, 100);
        cs.clear();
        assert_eq!(cs.query(&key), 0);
    }
}
