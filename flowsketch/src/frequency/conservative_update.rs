//! Conservative-update variant of Count-Min
//!
//! Same table shape as Count-Min, but an update first reads the current
//! minimum `m` across the touched counters and then raises each only to
//! `max(counter, m + val)` (Estan & Varghese, 2002). Counters that are
//! already above the new estimate stay put, which trims the overestimation
//! collisions feed into non-heavy flows. Queries are identical to Count-Min,
//! and the estimate still never underestimates.

use crate::common::table::CounterTable;
use crate::common::{
    invalid_capacity, util, with_process_rng, Counter, FlowHasher, FlowKey, HashFamily,
    KeyedSketch, Result, SeededHasher, Sketch,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Count-Min with the conservative-update rule
///
/// # Examples
/// ```
/// use flowsketch::frequency::ConservativeCountMin;
/// use flowsketch::{AwareHash, FlowKey};
///
/// let mut cu = ConservativeCountMin::<u32, AwareHash>::with_seed(4, 128, 1).unwrap();
/// let flow = FlowKey::<4>::from(7u32);
/// cu.update(&flow, 2);
/// assert!(cu.query(&flow) >= 2);
/// ```
#[derive(Clone, Debug)]
pub struct ConservativeCountMin<T, H> {
    depth: usize,
    width: usize,
    hashes: HashFamily<H>,
    table: CounterTable<T>,
    // per-update scratch for the touched column of each row
    indices: Vec<usize>,
}

impl<T: Counter, H: SeededHasher> ConservativeCountMin<T, H> {
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
            hashes: HashFamily::with_rng(depth, rng)?,
            table: CounterTable::new(depth, width)?,
            indices: vec![0; depth],
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

    /// Conservative update: raise touched counters only up to `min + val`
    pub fn update<const N: usize>(&mut self, key: &FlowKey<N>, val: T) {
        let mut min_val = T::MAX;
        for row in 0..self.depth {
            let idx = (self.hashes[row].hash_key(key) % self.width as u64) as usize;
            self.indices[row] = idx;
            min_val = min_val.min(self.table.at(row, idx));
        }
        let target = min_val.saturating_add(val);
        for row in 0..self.depth {
            let idx = self.indices[row];
            if self.table.at(row, idx) < target {
                self.table.set(row, idx, target);
            }
        }
    }

    /// Minimum counter across rows; never underestimates
    pub fn query<const N: usize>(&self, key: &FlowKey<N>) -> T {
        let mut min_val = T::MAX;
        for row in 0..self.depth {
            let idx = (self.hashes[row].hash_key(key) % self.width as u64) as usize;
            min_val = min_val.min(self.table.at(row, idx));
        }
        min_val
    }
}

impl<T: Counter, H: SeededHasher> Sketch for ConservativeCountMin<T, H> {
    fn clear(&mut self) {
        self.table.clear();
    }

    fn byte_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.hashes.byte_size() + self.table.heap_bytes()
    }
}

impl<T: Counter, H: SeededHasher, const N: usize> KeyedSketch<T, N> for ConservativeCountMin<T, H> {
    fn update(&mut self, key: &FlowKey<N>, val: T) {
        ConservativeCountMin::update(self, key, val);
    }

    fn query(&self, key: &FlowKey<N>) -> T {
        ConservativeCountMin::query(self, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::AwareHash;
    use crate::frequency::CountMinSketch;

    #[test]
    fn test_single_flow_is_exact() {
        let mut cu = ConservativeCountMin::<u32, AwareHash>::with_seed(4, 64, 3).unwrap();
        let key = FlowKey::<4>::from(5u32);
        for _ in 0..10 {
            cu.update(&key, 1);
        }
        assert_eq!(cu.query(&key), 10);
    }

    #[test]
    fn test_never_exceeds_count_min() {
        // identical seed => identical hash layout for both sketches
        let mut cm = CountMinSketch::<u32, AwareHash>::with_seed(3, 16, 11).unwrap();
        let mut cu = ConservativeCountMin::<u32, AwareHash>::with_seed(3, 16, 11).unwrap();
        let keys: Vec<FlowKey<4>> = (0..200u32).map(FlowKey::from).collect();
        for (i, key) in keys.iter().enumerate() {
            let val = (i % 5 + 1) as u32;
            cm.update(key, val);
            cu.update(key, val);
        }
        for key in &keys {
            assert!(cu.query(key) <= cm.query(key));
        }
    }

    #[test]
    fn test_clear_resets() {
        let mut cu = ConservativeCountMin::<u32, AwareHash>::with_seed(3, 16, 1).unwrap();
        let key = FlowKey::<4>::from(1u32);
        cu.update(&key, 9);
        cu.clear();
        assert_eq!(cu.query(&key), 0);
    }
}
