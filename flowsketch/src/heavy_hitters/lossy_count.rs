//! Lossy Counting with hashed buckets
//!
//! Lossy Counting (Manku & Motwani, 2002) divides the stream into epochs of
//! `ceil(1/epsilon)` mass. Tracked entries carry the epoch they entered as an
//! error floor; at each epoch boundary every entry whose `freq + error` cannot
//! reach the current epoch number is swept out. Tracked counts undercount by
//! at most `epsilon * stream_mass`.

use crate::common::{
    invalid_capacity, util, with_process_rng, Counter, FlowHasher, FlowKey, KeyedSketch, Result,
    SeededHasher, Sketch,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Clone, Debug)]
struct Entry<T, const N: usize> {
    key: FlowKey<N>,
    freq: T,
    error: i64,
}

/// Epoch-swept frequent-flow table over hashed buckets
///
/// Entries live in a hash-indexed bucket each holding a short list, so
/// lookups touch one bucket instead of the whole table.
#[derive(Clone, Debug)]
pub struct LossyCount<T, H, const N: usize> {
    epoch_len: i64,
    nbuckets: usize,
    epoch: i64,
    count: i64,
    hash: H,
    buckets: Vec<Vec<Entry<T, N>>>,
}

impl<T: Counter, H: SeededHasher, const N: usize> LossyCount<T, H, N> {
    /// Build a table with error bound `epsilon` over `nbuckets` hash buckets
    ///
    /// The epoch length is `ceil(1 / epsilon)`; `nbuckets` is rounded up to
    /// the next prime.
    ///
    /// # Errors
    /// Returns `InvalidCapacity` if `epsilon <= 0` or `nbuckets` is zero.
    pub fn new(epsilon: f64, nbuckets: usize) -> Result<Self> {
        with_process_rng(|rng| Self::with_rng(epsilon, nbuckets, rng))
    }

    /// Build a table with a private deterministic seed
    pub fn with_seed(epsilon: f64, nbuckets: usize, seed: u64) -> Result<Self> {
        Self::with_rng(epsilon, nbuckets, &mut StdRng::seed_from_u64(seed))
    }

    /// Build a table drawing hash state from `rng`
    pub fn with_rng<R: Rng + ?Sized>(epsilon: f64, nbuckets: usize, rng: &mut R) -> Result<Self> {
        if epsilon <= 0.0 || !epsilon.is_finite() {
            return Err(invalid_capacity("epsilon", epsilon, "must be > 0"));
        }
        if nbuckets == 0 {
            return Err(invalid_capacity("nbuckets", nbuckets, "must be > 0"));
        }
        let nbuckets = util::next_prime(nbuckets);
        Ok(Self {
            epoch_len: (1.0 / epsilon).ceil() as i64,
            nbuckets,
            epoch: 1,
            count: 0,
            hash: H::from_rng(rng),
            buckets: vec![Vec::new(); nbuckets],
        })
    }

    /// Mass per epoch (`ceil(1 / epsilon)`)
    pub fn epoch_len(&self) -> i64 {
        self.epoch_len
    }

    /// Current epoch number
    pub fn epoch(&self) -> i64 {
        self.epoch
    }

    /// Fold a weighted update, sweeping stale entries at epoch boundaries
    pub fn update(&mut self, key: &FlowKey<N>, val: T) {
        let idx = (self.hash.hash_key(key) % self.nbuckets as u64) as usize;
        let bucket = &mut self.buckets[idx];
        match bucket.iter_mut().find(|e| e.key == *key) {
            Some(entry) => entry.freq = entry.freq.saturating_add(val),
            None => bucket.push(Entry {
                key: *key,
                freq: val,
                error: self.epoch - 1,
            }),
        }

        self.count += val.to_i64();
        if self.count >= self.epoch_len {
            self.epoch += self.count / self.epoch_len;
            self.count %= self.epoch_len;
            let epoch = self.epoch;
            for bucket in &mut self.buckets {
                bucket.retain(|e| e.freq.to_i64() + e.error > epoch);
            }
        }
    }

    /// Tracked frequency of `key`, zero once swept
    pub fn query(&self, key: &FlowKey<N>) -> T {
        let idx = (self.hash.hash_key(key) % self.nbuckets as u64) as usize;
        self.buckets[idx]
            .iter()
            .find(|e| e.key == *key)
            .map(|e| e.freq)
            .unwrap_or(T::ZERO)
    }
}

impl<T: Counter, H: SeededHasher, const N: usize> Sketch for LossyCount<T, H, N> {
    fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.epoch = 1;
        self.count = 0;
    }

    fn byte_size(&self) -> usize {
        let entries: usize = self.buckets.iter().map(Vec::len).sum();
        std::mem::size_of::<Self>()
            + std::mem::size_of::<H>()
            + entries * std::mem::size_of::<Entry<T, N>>()
    }
}

impl<T: Counter, H: SeededHasher, const N: usize> KeyedSketch<T, N> for LossyCount<T, H, N> {
    fn update(&mut self, key: &FlowKey<N>, val: T) {
        LossyCount::update(self, key, val);
    }

    fn query(&self, key: &FlowKey<N>) -> T {
        LossyCount::query(self, key)
    }
}
