//! MRAC: flow-size distribution from a single counter row
//!
//! MRAC (Kumar et al., 2004) hashes every packet of a flow into one bucket
//! of a single row and never resolves collisions. The row is useless for
//! point queries, but the histogram of observed counter values is a compact,
//! biased approximation of the flow-size distribution: buckets holding `v`
//! roughly track flows of size `v`, modulo collision inflation.

use crate::common::{
    invalid_capacity, util, with_process_rng, Counter, FlowHasher, FlowKey, Result, SeededHasher,
    Sketch,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

/// Single-row multiplicity recorder for flow-size distribution estimates
#[derive(Clone, Debug)]
pub struct Mrac<T, H> {
    width: usize,
    total: u64,
    hash: H,
    row: Vec<T>,
}

impl<T: Counter, H: SeededHasher> Mrac<T, H> {
    /// Build a sketch seeded from the process-wide PRNG
    ///
    /// # Errors
    /// Returns `InvalidCapacity` if `width` is zero.
    pub fn new(width: usize) -> Result<Self> {
        with_process_rng(|rng| Self::with_rng(width, rng))
    }

    /// Build a sketch with a private deterministic seed
    pub fn with_seed(width: usize, seed: u64) -> Result<Self> {
        Self::with_rng(width, &mut StdRng::seed_from_u64(seed))
    }

    /// Build a sketch drawing hash state from `rng`
    pub fn with_rng<R: Rng + ?Sized>(width: usize, rng: &mut R) -> Result<Self> {
        if width == 0 {
            return Err(invalid_capacity("width", width, "must be > 0"));
        }
        let width = util::next_prime(width);
        Ok(Self {
            width,
            total: 0,
            hash: H::from_rng(rng),
            row: vec![T::ZERO; width],
        })
    }

    /// Counters in the row (prime)
    pub fn width(&self) -> usize {
        self.width
    }

    /// Packets folded in since the last clear
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Record one packet of `key`'s flow
    pub fn update<const N: usize>(&mut self, key: &FlowKey<N>) {
        self.total += 1;
        let idx = (self.hash.hash_key(key) % self.width as u64) as usize;
        self.row[idx] = self.row[idx].saturating_add(T::from_i64(1));
    }

    /// Histogram of counter values as fractions of the row
    ///
    /// Maps each observed counter value (including zero) to the fraction of
    /// buckets holding it. With load well below one flow per bucket this
    /// approximates the flow-size distribution.
    pub fn estimate_distribution(&self) -> BTreeMap<T, f64> {
        let mut histogram: BTreeMap<T, f64> = BTreeMap::new();
        for &v in &self.row {
            *histogram.entry(v).or_insert(0.0) += 1.0;
        }
        for fraction in histogram.values_mut() {
            *fraction /= self.width as f64;
        }
        histogram
    }
}

impl<T: Counter, H: SeededHasher> Sketch for Mrac<T, H> {
    fn clear(&mut self) {
        self.total = 0;
        self.row.fill(T::ZERO);
    }

    fn byte_size(&self) -> usize {
        std::mem::size_of::<Self>()
            + std::mem::size_of::<H>()
            + self.row.len() * std::mem::size_of::<T>()
    }
}
