//! K-ary sketch for change and volume estimation
//!
//! The K-ary sketch (Krishnamurthy et al., 2003) keeps Count-Min-shaped
//! signed counters plus the running stream total `S`. The per-row estimator
//! `(counter - S/w) / (1 - 1/w)` removes the expected background mass a
//! random flow contributes to each bucket; the absolute median across rows is
//! the point estimate.

use crate::common::table::CounterTable;
use crate::common::{
    invalid_capacity, util, with_process_rng, Counter, FlowHasher, FlowKey, HashFamily,
    KeyedSketch, Result, SeededHasher, SignedCounter, Sketch,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// K-ary sketch: signed counters plus a stream total
#[derive(Clone, Debug)]
pub struct KarySketch<T, H> {
    depth: usize,
    width: usize,
    sum: i64,
    hashes: HashFamily<H>,
    table: CounterTable<T>,
}

impl<T: SignedCounter, H: SeededHasher> KarySketch<T, H> {
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
            sum: 0,
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

    /// Total value folded into the sketch
    pub fn total(&self) -> i64 {
        self.sum
    }

    /// Add `val` to one counter per row and to the stream total
    pub fn update<const N: usize>(&mut self, key: &FlowKey<N>, val: T) {
        self.sum += val.to_i64();
        for row in 0..self.depth {
            let idx = (self.hashes[row].hash_key(key) % self.width as u64) as usize;
            self.table.add(row, idx, val);
        }
    }

    /// Absolute median of the background-corrected per-row estimators
    pub fn query<const N: usize>(&self, key: &FlowKey<N>) -> T {
        let w = self.width as f64;
        let mut values: Vec<f64> = (0..self.depth)
            .map(|row| {
                let idx = (self.hashes[row].hash_key(key) % self.width as u64) as usize;
                (self.table.at(row, idx).to_f64() - self.sum as f64 / w) / (1.0 - 1.0 / w)
            })
            .collect();
        T::from_f64(util::median_f64(&mut values).abs())
    }
}

impl<T: SignedCounter, H: SeededHasher> Sketch for KarySketch<T, H> {
    fn clear(&mut self) {
        self.sum = 0;
        self.table.clear();
    }

    fn byte_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.hashes.byte_size() + self.table.heap_bytes()
    }
}

impl<T: SignedCounter, H: SeededHasher, const N: usize> KeyedSketch<T, N> for KarySketch<T, H> {
    fn update(&mut self, key: &FlowKey<N>, val: T) {
        KarySketch::update(self, key, val);
    }

    fn query(&self, key: &FlowKey<N>) -> T {
        KarySketch::query(self, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::AwareHash;

    #[test]
    fn test_heavy_flow_estimate_tracks_count() {
        let mut kary = KarySketch::<i64, AwareHash>::with_seed(5, 512, 4).unwrap();
        let heavy = FlowKey::<4>::from(1u32);
        for _ in 0..1000 {
            kary.update(&heavy, 1);
        }
        for v in 100..200u32 {
            kary.update(&FlowKey::<4>::from(v), 1);
        }
        let est = kary.query(&heavy);
        assert!((900..=1100).contains(&est), "estimate {} off", est);
    }

    #[test]
    fn test_total_accumulates() {
        let mut kary = KarySketch::<i64, AwareHash>::with_seed(3, 32, 1).unwrap();
        kary.update(&FlowKey::<4>::from(1u32), 4);
        kary.update(&FlowKey::<4>::from(2u32), 6);
        assert_eq!(kary.total(), 10);
    }

    #[test]
    fn test_clear_resets_sum() {
        let mut kary = KarySketch::<i64, AwareHash>::with_seed(3, 32, 1).unwrap();
        kary.update(&FlowKey::<4>::from(1u32), 4);
        kary.clear();
        assert_eq!(kary.total(), 0);
        assert_eq!(kary.query(&FlowKey::<4>::from(1u32)), 0);
    }
}
