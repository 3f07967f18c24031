//! FastSketch: quotient-based reversible counter table
//!
//! FastSketch splits the integer value of a flow key into a quotient and a
//! remainder modulo the (power-of-two) row count. The remainder XORs with a
//! hash of the quotient to pick a row; column 0 counts everything landing in
//! the row and column `j` counts only flows whose quotient bit `j - 1` is
//! set. Reading a row back is therefore a bit-by-bit hypothesis test on the
//! quotient, and each hash function offers one way to map the recovered
//! quotient to a concrete key.
//!
//! Keys wider than 8 bytes participate through their low 8 bytes; shorter
//! keys are zero-padded (see [`FlowKey::low_u64`]).

use crate::common::{
    invalid_capacity, with_process_rng, Counter, FlowHasher, FlowKey, HashFamily, KeyedSketch,
    Result, SeededHasher, Sketch,
};
use crate::common::table::CounterTable;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

/// Reversible quotient/remainder sketch with per-bit counters
///
/// # Examples
/// ```
/// use flowsketch::reversible::FastSketch;
/// use flowsketch::{AwareHash, FlowKey};
///
/// let mut fs = FastSketch::<u64, AwareHash, 4>::with_seed(64, 2, 1).unwrap();
/// let heavy = FlowKey::<4>::from(0x12345678u32);
/// fs.update(&heavy, 300);
/// assert!(fs.query(&heavy) >= 300);
/// assert!(fs.heavy_hitters(100).contains_key(&heavy));
/// ```
#[derive(Clone, Debug)]
pub struct FastSketch<T, H, const N: usize> {
    depth: usize,
    log2_depth: u32,
    width: usize,
    num_hash: usize,
    sum: i64,
    hashes: HashFamily<H>,
    table: CounterTable<T>,
}

impl<T: Counter, H: SeededHasher, const N: usize> FastSketch<T, H, N> {
    /// Build a sketch seeded from the process-wide PRNG
    ///
    /// `depth` is rounded up to a power of two; the row width follows as
    /// `1 + key_bits - log2(depth)` where `key_bits` caps at the 64 bits a
    /// key contributes through its low bytes.
    ///
    /// # Errors
    /// Returns `InvalidCapacity` if `depth` or `num_hash` is zero, or if
    /// `depth` consumes all key bits.
    pub fn new(depth: usize, num_hash: usize) -> Result<Self> {
        with_process_rng(|rng| Self::with_rng(depth, num_hash, rng))
    }

    /// Build a sketch with a private deterministic seed
    pub fn with_seed(depth: usize, num_hash: usize, seed: u64) -> Result<Self> {
        Self::with_rng(depth, num_hash, &mut StdRng::seed_from_u64(seed))
    }

    /// Build a sketch drawing hash state from `rng`
    pub fn with_rng<R: Rng + ?Sized>(depth: usize, num_hash: usize, rng: &mut R) -> Result<Self> {
        if depth == 0 {
            return Err(invalid_capacity("depth", depth, "must be > 0"));
        }
        let depth = depth.next_power_of_two();
        let log2_depth = depth.trailing_zeros();
        let key_bits = (N * 8).min(64) as u32;
        if log2_depth >= key_bits {
            return Err(invalid_capacity(
                "depth",
                depth,
                "must leave at least one quotient bit of the key",
            ));
        }
        let width = 1 + (key_bits - log2_depth) as usize;
        Ok(Self {
            depth,
            log2_depth,
            width,
            num_hash,
            sum: 0,
            hashes: HashFamily::with_rng(num_hash, rng)?,
            table: CounterTable::new(depth, width)?,
        })
    }

    /// Number of rows (power of two)
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Counters per row
    pub fn width(&self) -> usize {
        self.width
    }

    /// Total value folded into the sketch
    pub fn total(&self) -> i64 {
        self.sum
    }

    /// Hash a quotient the way keys hash: over its low key-length bytes
    #[inline]
    fn hash_quotient(&self, i: usize, quotient: u64) -> u64 {
        let bytes = quotient.to_le_bytes();
        self.hashes[i].hash(&bytes[..N.min(8)])
    }

    #[inline]
    fn split(&self, key_val: u64) -> (u64, u64) {
        (
            key_val >> self.log2_depth,
            key_val & (self.depth as u64 - 1),
        )
    }

    #[inline]
    fn row_of(&self, i: usize, quotient: u64, remainder: u64) -> usize {
        (remainder ^ (self.hash_quotient(i, quotient) % self.depth as u64)) as usize
    }

    /// Add `val` to the row total and the set-quotient-bit counters
    pub fn update(&mut self, key: &FlowKey<N>, val: T) {
        self.sum += val.to_i64();
        let (quotient, remainder) = self.split(key.low_u64());
        for i in 0..self.num_hash {
            let row = self.row_of(i, quotient, remainder);
            self.table.add(row, 0, val);
            for j in 1..self.width {
                if quotient & (1u64 << (j - 1)) != 0 {
                    self.table.add(row, j, val);
                }
            }
        }
    }

    /// Minimum over hashes of the row total and the set-bit counters
    pub fn query(&self, key: &FlowKey<N>) -> T {
        let (quotient, remainder) = self.split(key.low_u64());
        let mut result = T::MAX;
        for i in 0..self.num_hash {
            let row = self.row_of(i, quotient, remainder);
            result = result.min(self.table.at(row, 0));
            for j in 1..self.width {
                if quotient & (1u64 << (j - 1)) != 0 {
                    result = result.min(self.table.at(row, j));
                }
            }
        }
        result
    }

    /// Recover flows whose aggregate exceeds `threshold`
    pub fn heavy_hitters(&self, threshold: T) -> BTreeMap<FlowKey<N>, T> {
        self.detect(self.table.as_slice(), threshold.to_i64())
    }

    /// Recover flows whose aggregate changed by more than `threshold`
    /// between `self` and `other`, by detecting over the absolute
    /// difference of the two counter tables
    ///
    /// # Panics
    /// Panics if the two sketches were built with different shapes.
    pub fn heavy_changers(&self, threshold: T, other: &Self) -> BTreeMap<FlowKey<N>, T> {
        assert_eq!(self.depth, other.depth, "depth mismatch");
        assert_eq!(self.num_hash, other.num_hash, "num_hash mismatch");
        let diff: Vec<T> = self
            .table
            .as_slice()
            .iter()
            .zip(other.table.as_slice())
            .map(|(&a, &b)| T::from_i64((a.to_i64() - b.to_i64()).abs()))
            .collect();
        self.detect(&diff, threshold.to_i64())
    }

    /// Sum the counter tables of `others` into this sketch
    ///
    /// Used to combine per-shard sketches built with identical seeds before
    /// decoding.
    ///
    /// # Panics
    /// Panics if any sketch has a different shape.
    pub fn merge<'a, I>(&mut self, others: I)
    where
        I: IntoIterator<Item = &'a Self>,
        T: 'a,
        H: 'a,
    {
        for other in others {
            assert_eq!(self.depth, other.depth, "depth mismatch");
            assert_eq!(self.num_hash, other.num_hash, "num_hash mismatch");
            for (a, &b) in self
                .table
                .as_mut_slice()
                .iter_mut()
                .zip(other.table.as_slice())
            {
                *a = a.saturating_add(b);
            }
        }
    }

    /// Guess the quotient encoded in `row`, or `None` if the row's bit
    /// counters are ambiguous against `thresh`
    fn guess_quotient(&self, table: &[T], row: usize, thresh: i64) -> Option<u64> {
        let base = row * self.width;
        let count0 = table[base].to_i64();
        if count0 < thresh {
            return None;
        }
        let mut quotient = 0u64;
        for k in 1..self.width {
            let count_k = table[base + k].to_i64();
            let rest = count0 - count_k;
            // exactly one of (bit set, bit clear) may carry the heavy mass
            if (rest < thresh && count_k < thresh) || (rest > thresh && count_k > thresh) {
                return None;
            }
            if count_k > thresh {
                quotient |= 1u64 << (k - 1);
            }
        }
        Some(quotient)
    }

    /// Write `val`'s low bytes into a key, zero-filling beyond 8 bytes
    fn key_from_u64(val: u64) -> FlowKey<N> {
        let mut bytes = [0u8; N];
        let n = N.min(8);
        bytes[..n].copy_from_slice(&val.to_le_bytes()[..n]);
        FlowKey::new(bytes)
    }

    /// Row-by-row anomaly detection over `table` (own counters or a diff)
    fn detect(&self, table: &[T], thresh: i64) -> BTreeMap<FlowKey<N>, T> {
        let mut candidates: BTreeMap<FlowKey<N>, T> = BTreeMap::new();
        for row in 0..self.depth {
            let Some(quotient) = self.guess_quotient(table, row, thresh) else {
                continue;
            };
            // each hash function offers one mapping of the quotient back to
            // a concrete key; verify the round trip before accepting
            for j in 0..self.num_hash {
                let hashed = self.hash_quotient(j, quotient) % self.depth as u64;
                let guess_val = (quotient << self.log2_depth) | (row as u64 ^ hashed);
                let guess = Self::key_from_u64(guess_val);
                let (guess_q, guess_rem) = self.split(guess.low_u64());
                if guess_q != quotient || self.row_of(j, guess_q, guess_rem) != row {
                    continue;
                }

                let mut passes = 0;
                let mut degree = i64::MAX;
                for k in 0..self.num_hash {
                    let bucket = self.row_of(k, guess_q, guess_rem);
                    let base = bucket * self.width;
                    let deg = table[base].to_i64();
                    if deg > thresh {
                        passes += 1;
                        degree = degree.min(deg);
                        for t in 1..self.width {
                            if guess_q & (1u64 << (t - 1)) != 0 {
                                degree = degree.min(table[base + t].to_i64());
                            }
                        }
                    }
                }
                if passes == self.num_hash {
                    let estimate = T::from_i64(degree);
                    candidates
                        .entry(guess)
                        .and_modify(|e| *e = (*e).min(estimate))
                        .or_insert(estimate);
                }
            }
        }
        candidates
    }
}

impl<T: Counter, H: SeededHasher, const N: usize> Sketch for FastSketch<T, H, N> {
    fn clear(&mut self) {
        self.sum = 0;
        self.table.clear();
    }

    fn byte_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.hashes.byte_size() + self.table.heap_bytes()
    }
}

impl<T: Counter, H: SeededHasher, const N: usize> KeyedSketch<T, N> for FastSketch<T, H, N> {
    fn update(&mut self, key: &FlowKey<N>, val: T) {
        FastSketch::update(self, key, val);
    }

    fn query(&self, key: &FlowKey<N>) -> T {
        FastSketch::query(self, key)
    }
}
