//! LD-Sketch: dynamic candidate buckets with error floors
//!
//! LD-Sketch (Huang & Lee, 2014) hashes each flow into one bucket per row.
//! A bucket carries its running sum `V`, an error floor `e`, a capacity
//! bound `l`, and a small associative array of tracked candidates. When the
//! array is full the bucket either subtracts the current minimum from
//! everyone (raising the error floor) or, if `V` justifies it, grows the
//! bound following `l = (k+1)(k+2) - 1` with `k = floor(V / (eps * theta))`.
//! Tracked values bracket the truth: the real count of a key lies between
//! its array value and that value plus `e`.

use crate::common::{
    invalid_capacity, util, with_process_rng, Counter, FlowHasher, FlowKey, HashFamily,
    KeyedSketch, Result, SeededHasher, Sketch,
};
use crate::reversible::Bounds;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

#[derive(Clone, Debug)]
struct Bucket<T, const N: usize> {
    total: i64,
    error: T,
    bound: usize,
    tracked: BTreeMap<FlowKey<N>, T>,
}

impl<T: Counter, const N: usize> Bucket<T, N> {
    fn new() -> Self {
        Self {
            total: 0,
            error: T::ZERO,
            bound: 0,
            tracked: BTreeMap::new(),
        }
    }

    fn update(&mut self, key: &FlowKey<N>, val: T, expansion: f64) {
        self.total += val.to_i64();

        if let Some(entry) = self.tracked.get_mut(key) {
            *entry = entry.saturating_add(val);
            return;
        }
        if self.tracked.len() < self.bound {
            self.tracked.insert(*key, val);
            return;
        }

        let k = (self.total as f64 / expansion) as i64;
        let grown = ((k + 1) * (k + 2) - 1) as usize;
        if grown <= self.bound {
            // no headroom to grow: charge the minimum to everyone
            let charge = self
                .tracked
                .values()
                .copied()
                .min()
                .map_or(val, |m| m.min(val));
            self.error = self.error.saturating_add(charge);
            for entry in self.tracked.values_mut() {
                *entry = entry.saturating_sub(charge);
            }
            self.tracked.retain(|_, v| *v > T::ZERO);
            let residue = val.saturating_sub(charge);
            if residue > T::ZERO {
                self.tracked.insert(*key, residue);
            }
        } else {
            self.bound = grown;
            self.tracked.insert(*key, val);
        }
    }

    fn query(&self, key: &FlowKey<N>) -> Bounds<T> {
        match self.tracked.get(key) {
            Some(&v) => Bounds {
                lower: v,
                upper: v.saturating_add(self.error),
            },
            None => Bounds {
                lower: T::ZERO,
                upper: self.error,
            },
        }
    }

    fn clear(&mut self) {
        self.total = 0;
        self.error = T::ZERO;
        self.bound = 0;
        self.tracked.clear();
    }

    fn byte_size(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.tracked.len() * (std::mem::size_of::<FlowKey<N>>() + std::mem::size_of::<T>())
    }
}

/// Bucket sketch with per-bucket candidate arrays and error floors
///
/// The detection threshold `theta` and tolerance `eps` are fixed at
/// construction; together they set the bucket expansion step `eps * theta`.
#[derive(Clone, Debug)]
pub struct LDSketch<T, H, const N: usize> {
    depth: usize,
    width: usize,
    threshold: T,
    expansion: f64,
    hashes: HashFamily<H>,
    buckets: Vec<Bucket<T, N>>,
}

impl<T: Counter, H: SeededHasher, const N: usize> LDSketch<T, H, N> {
    /// Build a sketch seeded from the process-wide PRNG
    ///
    /// `width` is rounded up to the next prime.
    ///
    /// # Errors
    /// Returns `InvalidCapacity` if `depth` or `width` is zero, `threshold`
    /// is zero, or `eps <= 0`.
    pub fn new(depth: usize, width: usize, threshold: T, eps: f64) -> Result<Self> {
        with_process_rng(|rng| Self::with_rng(depth, width, threshold, eps, rng))
    }

    /// Build a sketch with a private deterministic seed
    pub fn with_seed(
        depth: usize,
        width: usize,
        threshold: T,
        eps: f64,
        seed: u64,
    ) -> Result<Self> {
        Self::with_rng(depth, width, threshold, eps, &mut StdRng::seed_from_u64(seed))
    }

    /// Build a sketch drawing hash state from `rng`
    pub fn with_rng<R: Rng + ?Sized>(
        depth: usize,
        width: usize,
        threshold: T,
        eps: f64,
        rng: &mut R,
    ) -> Result<Self> {
        if depth == 0 {
            return Err(invalid_capacity("depth", depth, "must be > 0"));
        }
        if width == 0 {
            return Err(invalid_capacity("width", width, "must be > 0"));
        }
        if threshold <= T::ZERO {
            return Err(invalid_capacity("threshold", "<= 0", "must be > 0"));
        }
        if eps <= 0.0 || !eps.is_finite() {
            return Err(invalid_capacity("eps", eps, "must be > 0"));
        }
        let width = util::next_prime(width);
        Ok(Self {
            depth,
            width,
            threshold,
            expansion: eps * threshold.to_f64(),
            hashes: HashFamily::with_rng(depth, rng)?,
            buckets: vec![Bucket::new(); depth * width],
        })
    }

    /// Number of rows
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Buckets per row (prime)
    pub fn width(&self) -> usize {
        self.width
    }

    /// Detection threshold fixed at construction
    pub fn threshold(&self) -> T {
        self.threshold
    }

    #[inline]
    fn bucket_index(&self, row: usize, key: &FlowKey<N>) -> usize {
        row * self.width + (self.hashes[row].hash_key(key) % self.width as u64) as usize
    }

    /// Fold a weighted update into one bucket per row
    pub fn update(&mut self, key: &FlowKey<N>, val: T) {
        let expansion = self.expansion;
        for row in 0..self.depth {
            let idx = self.bucket_index(row, key);
            self.buckets[idx].update(key, val, expansion);
        }
    }

    /// Bracket the flow's true count: tightest bounds across rows
    pub fn query_bounds(&self, key: &FlowKey<N>) -> Bounds<T> {
        let mut lower = T::ZERO;
        let mut upper = T::MAX;
        for row in 0..self.depth {
            let b = self.buckets[self.bucket_index(row, key)].query(key);
            lower = lower.max(b.lower);
            upper = upper.min(b.upper);
        }
        Bounds { lower, upper }
    }

    /// Flows whose upper-bound estimate reaches the construction threshold
    pub fn heavy_hitters(&self) -> BTreeMap<FlowKey<N>, T> {
        let mut hitters = BTreeMap::new();
        for bucket in &self.buckets {
            if bucket.total < self.threshold.to_i64() {
                continue;
            }
            for key in bucket.tracked.keys() {
                if hitters.contains_key(key) {
                    continue;
                }
                let upper = self.query_bounds(key).upper;
                if upper >= self.threshold {
                    hitters.insert(*key, upper);
                }
            }
        }
        hitters
    }

    /// Flows whose bracketed change between `self` and `other` reaches the
    /// construction threshold
    ///
    /// The change estimate for a key is the row-wise minimum of
    /// `max(self.upper - other.lower, other.upper - self.lower)`.
    ///
    /// # Panics
    /// Panics if the two sketches were built with different shapes.
    pub fn heavy_changers(&self, other: &Self) -> BTreeMap<FlowKey<N>, T> {
        assert_eq!(self.depth, other.depth, "depth mismatch");
        assert_eq!(self.width, other.width, "width mismatch");

        let threshold = self.threshold.to_i64();
        let change = |key: &FlowKey<N>| -> i64 {
            (0..self.depth)
                .map(|row| {
                    let idx = self.bucket_index(row, key);
                    let other_idx = other.bucket_index(row, key);
                    let a = self.buckets[idx].query(key);
                    let b = other.buckets[other_idx].query(key);
                    (a.upper.to_i64() - b.lower.to_i64())
                        .max(b.upper.to_i64() - a.lower.to_i64())
                })
                .min()
                .unwrap_or(0)
        };

        let mut changers = BTreeMap::new();
        let mut scan = |buckets: &[Bucket<T, N>]| {
            for bucket in buckets {
                if bucket.total < threshold {
                    continue;
                }
                for key in bucket.tracked.keys() {
                    if changers.contains_key(key) {
                        continue;
                    }
                    let delta = change(key);
                    if delta >= threshold {
                        changers.insert(*key, T::from_i64(delta));
                    }
                }
            }
        };
        scan(&self.buckets);
        scan(&other.buckets);
        changers
    }
}

impl<T: Counter, H: SeededHasher, const N: usize> Sketch for LDSketch<T, H, N> {
    fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
    }

    fn byte_size(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.hashes.byte_size()
            + self.buckets.iter().map(Bucket::byte_size).sum::<usize>()
    }
}

impl<T: Counter, H: SeededHasher, const N: usize> KeyedSketch<T, N> for LDSketch<T, H, N> {
    fn update(&mut self, key: &FlowKey<N>, val: T) {
        LDSketch::update(self, key, val);
    }

    /// Upper-bound point estimate (the heavy-hitter decision value)
    fn query(&self, key: &FlowKey<N>) -> T {
        self.query_bounds(key).upper
    }
}
