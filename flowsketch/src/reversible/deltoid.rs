//! Deltoid: group-testing sketch with bit-level key recovery
//!
//! Deltoid (Cormode & Muthukrishnan, 2004) hashes each flow into one of
//! `num_group` groups per row and splits every group into per-bit counter
//! pairs: `arr1[i][g][j]` accumulates flows whose key bit `j` is one,
//! `arr0[i][g][j]` those where it is zero, and `arr1[i][g][nbits]` holds the
//! group total. A group dominated by a single heavy flow decides every key
//! bit by comparing the pair against the threshold, which reconstructs the
//! flow key outright. Running the same test over counter differences yields
//! heavy changers.

use crate::common::{
    invalid_capacity, util, with_process_rng, Counter, FlowHasher, FlowKey, HashFamily,
    KeyedSketch, Result, SeededHasher, Sketch,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

/// Group-testing sketch over per-bit counter pairs
///
/// # Examples
/// ```
/// use flowsketch::reversible::Deltoid;
/// use flowsketch::{AwareHash, FlowKey};
///
/// let mut d = Deltoid::<u64, AwareHash, 4>::with_seed(2, 32, 1).unwrap();
/// let heavy = FlowKey::<4>::from(0xc0a80001u32);
/// d.update(&heavy, 100);
/// let hitters = d.heavy_hitters(50);
/// assert_eq!(hitters.get(&heavy), Some(&100));
/// ```
#[derive(Clone, Debug)]
pub struct Deltoid<T, H, const N: usize> {
    num_hash: usize,
    num_group: usize,
    nbits: usize,
    sum: i64,
    hashes: HashFamily<H>,
    // per group: nbits one-side counters plus the trailing group total
    arr1: Vec<T>,
    // per group: nbits zero-side counters
    arr0: Vec<T>,
}

impl<T: Counter, H: SeededHasher, const N: usize> Deltoid<T, H, N> {
    /// Build a sketch seeded from the process-wide PRNG
    ///
    /// `num_group` is rounded up to the next prime.
    ///
    /// # Errors
    /// Returns `InvalidCapacity` if `num_hash` or `num_group` is zero.
    pub fn new(num_hash: usize, num_group: usize) -> Result<Self> {
        with_process_rng(|rng| Self::with_rng(num_hash, num_group, rng))
    }

    /// Build a sketch with a private deterministic seed
    pub fn with_seed(num_hash: usize, num_group: usize, seed: u64) -> Result<Self> {
        Self::with_rng(num_hash, num_group, &mut StdRng::seed_from_u64(seed))
    }

    /// Build a sketch drawing hash state from `rng`
    pub fn with_rng<R: Rng + ?Sized>(
        num_hash: usize,
        num_group: usize,
        rng: &mut R,
    ) -> Result<Self> {
        if num_group == 0 {
            return Err(invalid_capacity("num_group", num_group, "must be > 0"));
        }
        let num_group = util::next_prime(num_group);
        let nbits = N * 8;
        Ok(Self {
            num_hash,
            num_group,
            nbits,
            sum: 0,
            hashes: HashFamily::with_rng(num_hash, rng)?,
            arr1: vec![T::ZERO; num_hash * num_group * (nbits + 1)],
            arr0: vec![T::ZERO; num_hash * num_group * nbits],
        })
    }

    /// Rows (independent hash groups)
    pub fn num_hash(&self) -> usize {
        self.num_hash
    }

    /// Groups per row (prime)
    pub fn num_group(&self) -> usize {
        self.num_group
    }

    /// Total value folded into the sketch
    pub fn total(&self) -> i64 {
        self.sum
    }

    #[inline]
    fn idx1(&self, row: usize, group: usize, bit: usize) -> usize {
        (row * self.num_group + group) * (self.nbits + 1) + bit
    }

    #[inline]
    fn idx0(&self, row: usize, group: usize, bit: usize) -> usize {
        (row * self.num_group + group) * self.nbits + bit
    }

    /// Add `val` to the key's bit-side counters and group total in each row
    pub fn update(&mut self, key: &FlowKey<N>, val: T) {
        self.sum += val.to_i64();
        for row in 0..self.num_hash {
            let group = (self.hashes[row].hash_key(key) % self.num_group as u64) as usize;
            for bit in 0..self.nbits {
                let slot = if key.bit(bit) {
                    let i = self.idx1(row, group, bit);
                    &mut self.arr1[i]
                } else {
                    let i = self.idx0(row, group, bit);
                    &mut self.arr0[i]
                };
                *slot = slot.saturating_add(val);
            }
            let i = self.idx1(row, group, self.nbits);
            self.arr1[i] = self.arr1[i].saturating_add(val);
        }
    }

    /// Minimum matching-side counter over all rows and bits; one-sided
    pub fn query(&self, key: &FlowKey<N>) -> T {
        let mut min_val = T::MAX;
        for row in 0..self.num_hash {
            let group = (self.hashes[row].hash_key(key) % self.num_group as u64) as usize;
            for bit in 0..self.nbits {
                let c = if key.bit(bit) {
                    self.arr1[self.idx1(row, group, bit)]
                } else {
                    self.arr0[self.idx0(row, group, bit)]
                };
                min_val = min_val.min(c);
            }
        }
        min_val
    }

    /// Recover all flows whose aggregate exceeds `threshold`
    ///
    /// Every group whose total clears the threshold proposes one candidate:
    /// bit `j` is one iff the one-side counter clears the threshold while the
    /// zero-side does not; groups where both or neither side clears are
    /// polluted and rejected. Candidates are deduplicated and confirmed with
    /// `query`.
    pub fn heavy_hitters(&self, threshold: T) -> BTreeMap<FlowKey<N>, T> {
        let mut hitters = BTreeMap::new();
        let thresh = threshold.to_i64();
        for row in 0..self.num_hash {
            for group in 0..self.num_group {
                let total = self.arr1[self.idx1(row, group, self.nbits)].to_i64();
                if total <= thresh {
                    continue;
                }
                let Some(candidate) = self.reconstruct(row, group, |r, g, b, one| {
                    let c = if one {
                        self.arr1[self.idx1(r, g, b)].to_i64()
                    } else {
                        self.arr0[self.idx0(r, g, b)].to_i64()
                    };
                    c > thresh
                }) else {
                    continue;
                };
                if hitters.contains_key(&candidate) {
                    continue;
                }
                let estimate = self.query(&candidate);
                if estimate >= threshold {
                    hitters.insert(candidate, estimate);
                }
            }
        }
        hitters
    }

    /// Recover all flows whose aggregate changed by more than `threshold`
    /// between `self` and `other`
    ///
    /// The group test runs on absolute counter differences, so flows that
    /// grew and flows that shrank are both recovered.
    ///
    /// # Panics
    /// Panics if the two sketches were built with different shapes.
    pub fn heavy_changers(&self, threshold: T, other: &Self) -> BTreeMap<FlowKey<N>, T> {
        assert_eq!(self.num_hash, other.num_hash, "num_hash mismatch");
        assert_eq!(self.num_group, other.num_group, "num_group mismatch");

        let mut changers = BTreeMap::new();
        let thresh = threshold.to_i64();
        for row in 0..self.num_hash {
            for group in 0..self.num_group {
                let i = self.idx1(row, group, self.nbits);
                let total = (self.arr1[i].to_i64() - other.arr1[i].to_i64()).abs();
                if total <= thresh {
                    continue;
                }
                let Some(candidate) = self.reconstruct(row, group, |r, g, b, one| {
                    let diff = if one {
                        let i = self.idx1(r, g, b);
                        self.arr1[i].to_i64() - other.arr1[i].to_i64()
                    } else {
                        let i = self.idx0(r, g, b);
                        self.arr0[i].to_i64() - other.arr0[i].to_i64()
                    };
                    diff.abs() > thresh
                }) else {
                    continue;
                };
                if changers.contains_key(&candidate) {
                    continue;
                }
                let delta = (self.query(&candidate).to_i64() - other.query(&candidate).to_i64())
                    .abs();
                if delta >= thresh {
                    changers.insert(candidate, T::from_i64(delta));
                }
            }
        }
        changers
    }

    /// Rebuild the candidate key of `(row, group)` bit by bit
    ///
    /// `exceeds(row, group, bit, side)` reports whether the given counter
    /// side clears the threshold. Returns `None` for polluted groups where a
    /// bit cannot be decided.
    fn reconstruct(
        &self,
        row: usize,
        group: usize,
        exceeds: impl Fn(usize, usize, usize, bool) -> bool,
    ) -> Option<FlowKey<N>> {
        let mut key = FlowKey::<N>::default();
        for bit in 0..self.nbits {
            let one = exceeds(row, group, bit, true);
            let zero = exceeds(row, group, bit, false);
            if one == zero {
                return None;
            }
            if one {
                key.set_bit(bit, true);
            }
        }
        Some(key)
    }
}

impl<T: Counter, H: SeededHasher, const N: usize> Sketch for Deltoid<T, H, N> {
    fn clear(&mut self) {
        self.sum = 0;
        self.arr1.fill(T::ZERO);
        self.arr0.fill(T::ZERO);
    }

    fn byte_size(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.hashes.byte_size()
            + (self.arr1.len() + self.arr0.len()) * std::mem::size_of::<T>()
    }
}

impl<T: Counter, H: SeededHasher, const N: usize> KeyedSketch<T, N> for Deltoid<T, H, N> {
    fn update(&mut self, key: &FlowKey<N>, val: T) {
        Deltoid::update(self, key, val);
    }

    fn query(&self, key: &FlowKey<N>) -> T {
        Deltoid::query(self, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::AwareHash;

    fn key(v: u32) -> FlowKey<4> {
        FlowKey::from(v)
    }

    #[test]
    fn test_query_is_one_sided() {
        let mut d = Deltoid::<u64, AwareHash, 4>::with_seed(2, 16, 1).unwrap();
        d.update(&key(1), 10);
        d.update(&key(2), 4);
        assert!(d.query(&key(1)) >= 10);
        assert!(d.query(&key(2)) >= 4);
    }

    #[test]
    fn test_lone_heavy_flow_is_recovered() {
        let mut d = Deltoid::<u64, AwareHash, 4>::with_seed(2, 32, 7).unwrap();
        let heavy = key(0xdeadbeef);
        d.update(&heavy, 500);
        for v in 1..20u32 {
            d.update(&key(v), 1);
        }
        let hitters = d.heavy_hitters(100);
        assert!(hitters.contains_key(&heavy));
    }

    #[test]
    fn test_changer_recovery_between_epochs() {
        let mut before = Deltoid::<u64, AwareHash, 4>::with_seed(2, 32, 9).unwrap();
        let mut after = before.clone();
        let changer = key(0x0a0a0a0a);
        before.update(&changer, 10);
        after.update(&changer, 400);
        for v in 1..10u32 {
            before.update(&key(v), 3);
            after.update(&key(v), 3);
        }
        let changers = after.heavy_changers(100, &before);
        assert!(changers.contains_key(&changer));
        assert!(*changers.get(&changer).unwrap() >= 100);
    }

    #[test]
    fn test_clear_resets() {
        let mut d = Deltoid::<u64, AwareHash, 4>::with_seed(2, 16, 1).unwrap();
        d.update(&key(1), 50);
        d.clear();
        assert_eq!(d.total(), 0);
        assert_eq!(d.query(&key(1)), 0);
        assert!(d.heavy_hitters(1).is_empty());
    }
}
