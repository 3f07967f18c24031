//! Flajolet-Martin probabilistic counting
//!
//! The original bitmap estimator (Flajolet & Martin, 1985): each row records
//! in a 64-bit bitmap the trailing-zero ranks observed under an independent
//! hash. The length of the unbroken prefix of set bits tracks
//! `log2(cardinality)`; the median across rows is scaled by the magic
//! constant `1.2928` (`2^phi` for the estimator's bias `phi`).

use crate::common::{
    invalid_capacity, with_process_rng, FlowHasher, FlowKey, HashFamily, Result, SeededHasher,
    Sketch,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Scaling constant correcting the expected bias of the prefix length
const PHI_CORRECTION: f64 = 1.2928;

/// Flajolet-Martin sketch: `depth` 64-bit bitmaps with a median estimator
#[derive(Clone, Debug)]
pub struct FlajoletMartin<H> {
    depth: usize,
    bitmaps: Vec<u64>,
    hashes: HashFamily<H>,
}

impl<H: SeededHasher> FlajoletMartin<H> {
    /// Build an estimator seeded from the process-wide PRNG
    ///
    /// # Errors
    /// Returns `InvalidCapacity` if `depth` is zero.
    pub fn new(depth: usize) -> Result<Self> {
        with_process_rng(|rng| Self::with_rng(depth, rng))
    }

    /// Build an estimator with a private deterministic seed
    pub fn with_seed(depth: usize, seed: u64) -> Result<Self> {
        Self::with_rng(depth, &mut StdRng::seed_from_u64(seed))
    }

    /// Build an estimator drawing hash state from `rng`
    pub fn with_rng<R: Rng + ?Sized>(depth: usize, rng: &mut R) -> Result<Self> {
        if depth == 0 {
            return Err(invalid_capacity("depth", depth, "must be > 0"));
        }
        Ok(Self {
            depth,
            bitmaps: vec![0u64; depth],
            hashes: HashFamily::with_rng(depth, rng)?,
        })
    }

    /// Number of bitmap rows
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Record the key's trailing-zero rank in every row
    ///
    /// A hash with no trailing zeros (odd value) leaves its row untouched;
    /// rank `r > 0` sets bit `r - 1`.
    pub fn update<const N: usize>(&mut self, key: &FlowKey<N>) {
        for (row, bitmap) in self.bitmaps.iter_mut().enumerate() {
            let hashed = self.hashes[row].hash_key(key);
            if hashed == 0 {
                continue;
            }
            let rank = hashed.trailing_zeros();
            if rank > 0 {
                *bitmap |= 1u64 << (rank - 1);
            }
        }
    }

    /// Estimated number of distinct keys: `1.2928 * 2^median_prefix`
    pub fn cardinality(&self) -> f64 {
        let mut prefixes: Vec<u32> = self
            .bitmaps
            .iter()
            .map(|&b| b.trailing_ones())
            .collect();
        prefixes.sort_unstable();
        let d = self.depth;
        let median = if d % 2 == 1 {
            f64::from(prefixes[d / 2])
        } else {
            f64::from(prefixes[d / 2 - 1] + prefixes[d / 2]) / 2.0
        };
        PHI_CORRECTION * 2f64.powf(median)
    }
}

impl<H: SeededHasher> Sketch for FlajoletMartin<H> {
    fn clear(&mut self) {
        self.bitmaps.fill(0);
    }

    fn byte_size(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.bitmaps.len() * std::mem::size_of::<u64>()
            + self.hashes.byte_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::AwareHash;

    #[test]
    fn test_empty_estimate_is_baseline() {
        let fm = FlajoletMartin::<AwareHash>::with_seed(8, 1).unwrap();
        assert!((fm.cardinality() - PHI_CORRECTION).abs() < 1e-9);
    }

    #[test]
    fn test_estimate_grows_with_distinct_keys() {
        let mut fm = FlajoletMartin::<AwareHash>::with_seed(16, 2).unwrap();
        for v in 0..100u32 {
            fm.update(&FlowKey::<4>::from(v));
        }
        let small = fm.cardinality();
        for v in 100..10_000u32 {
            fm.update(&FlowKey::<4>::from(v));
        }
        let large = fm.cardinality();
        assert!(large > small);
    }

    #[test]
    fn test_duplicates_do_not_move_estimate() {
        let mut fm = FlajoletMartin::<AwareHash>::with_seed(8, 3).unwrap();
        let key = FlowKey::<4>::from(1u32);
        fm.update(&key);
        let once = fm.cardinality();
        for _ in 0..1000 {
            fm.update(&key);
        }
        assert_eq!(fm.cardinality(), once);
    }

    #[test]
    fn test_clear_resets() {
        let mut fm = FlajoletMartin::<AwareHash>::with_seed(8, 1).unwrap();
        for v in 0..100u32 {
            fm.update(&FlowKey::<4>::from(v));
        }
        fm.clear();
        assert!((fm.cardinality() - PHI_CORRECTION).abs() < 1e-9);
    }
}
