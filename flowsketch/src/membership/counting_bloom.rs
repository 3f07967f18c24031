//! Counting Bloom filter with 4-bit buckets
//!
//! Replaces the Bloom bit array with 4-bit counters (Fan et al., 2000) so
//! that removals become possible: insert increments the probed counters
//! saturating at 15, remove decrements saturating at 0. Queries report a key
//! present iff all probed counters are non-zero. Without saturation,
//! removals exactly undo insertions; once a counter has pinned at 15 the
//! filter may yield false negatives as well as false positives.

use crate::common::table::NibbleTable;
use crate::common::{
    invalid_capacity, util, with_process_rng, FlowHasher, FlowKey, HashFamily, Result,
    SeededHasher, Sketch,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Counting Bloom filter: prime bucket count, two 4-bit counters per byte
///
/// # Examples
/// ```
/// use flowsketch::membership::CountingBloomFilter;
/// use flowsketch::{AwareHash, FlowKey};
///
/// let mut cbf = CountingBloomFilter::<AwareHash>::with_seed(512, 4, 1).unwrap();
/// let flow = FlowKey::<4>::from(1u32);
/// cbf.insert(&flow);
/// assert!(cbf.query(&flow));
/// cbf.remove(&flow);
/// assert!(!cbf.query(&flow));
/// ```
#[derive(Clone, Debug)]
pub struct CountingBloomFilter<H> {
    nbuckets: usize,
    num_hash: usize,
    counters: NibbleTable,
    hashes: HashFamily<H>,
}

impl<H: SeededHasher> CountingBloomFilter<H> {
    /// Build a filter seeded from the process-wide PRNG
    ///
    /// `nbuckets` is rounded up to the next prime.
    ///
    /// # Errors
    /// Returns `InvalidCapacity` if `nbuckets` or `num_hash` is zero.
    pub fn new(nbuckets: usize, num_hash: usize) -> Result<Self> {
        with_process_rng(|rng| Self::with_rng(nbuckets, num_hash, rng))
    }

    /// Build a filter with a private deterministic seed
    pub fn with_seed(nbuckets: usize, num_hash: usize, seed: u64) -> Result<Self> {
        Self::with_rng(nbuckets, num_hash, &mut StdRng::seed_from_u64(seed))
    }

    /// Build a filter drawing hash state from `rng`
    pub fn with_rng<R: Rng + ?Sized>(
        nbuckets: usize,
        num_hash: usize,
        rng: &mut R,
    ) -> Result<Self> {
        if nbuckets == 0 {
            return Err(invalid_capacity("nbuckets", nbuckets, "must be > 0"));
        }
        let nbuckets = util::next_prime(nbuckets);
        Ok(Self {
            nbuckets,
            num_hash,
            counters: NibbleTable::new(nbuckets)?,
            hashes: HashFamily::with_rng(num_hash, rng)?,
        })
    }

    /// Number of 4-bit buckets (prime)
    pub fn nbuckets(&self) -> usize {
        self.nbuckets
    }

    #[inline]
    fn bucket<const N: usize>(&self, i: usize, key: &FlowKey<N>) -> usize {
        (self.hashes[i].hash_key(key) % self.nbuckets as u64) as usize
    }

    /// Increment the probed counters, saturating at 15
    pub fn insert<const N: usize>(&mut self, key: &FlowKey<N>) {
        for i in 0..self.num_hash {
            let idx = self.bucket(i, key);
            let val = self.counters.get(idx);
            if val < NibbleTable::MAX {
                self.counters.set(idx, val + 1);
            }
        }
    }

    /// Decrement the probed counters, saturating at 0
    pub fn remove<const N: usize>(&mut self, key: &FlowKey<N>) {
        for i in 0..self.num_hash {
            let idx = self.bucket(i, key);
            let val = self.counters.get(idx);
            if val > 0 {
                self.counters.set(idx, val - 1);
            }
        }
    }

    /// True iff every probed counter is non-zero
    ///
    /// After removes this may report false positives, and false negatives
    /// only if some probed counter ever saturated.
    pub fn query<const N: usize>(&self, key: &FlowKey<N>) -> bool {
        (0..self.num_hash).all(|i| self.counters.get(self.bucket(i, key)) != 0)
    }

    /// True if every counter is zero (the freshly built state)
    pub fn is_empty(&self) -> bool {
        self.counters.is_zero()
    }
}

impl<H: SeededHasher> Sketch for CountingBloomFilter<H> {
    fn clear(&mut self) {
        self.counters.clear();
    }

    fn byte_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.counters.heap_bytes() + self.hashes.byte_size()
    }
}
