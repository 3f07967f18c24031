//! MV-Sketch: majority-vote candidate buckets
//!
//! MV-Sketch (Tang, Huang & Lee, INFOCOM 2019) stores per bucket the total
//! `V`, a candidate key `K`, and a Boyer-Moore style vote counter `C`:
//! matching updates add to `C`, mismatches subtract, and a negative vote
//! flips the candidate. The bucket majority flow always ends as `K`, and
//! `(V + C) / 2` / `(V - C) / 2` bound its count from above for matching and
//! non-matching keys respectively.

use crate::common::{
    invalid_capacity, util, with_process_rng, Counter, FlowHasher, FlowKey, HashFamily,
    KeyedSketch, Result, SeededHasher, SignedCounter, Sketch,
};
use crate::reversible::Bounds;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug)]
struct Bucket<T, const N: usize> {
    total: T,
    key: FlowKey<N>,
    votes: T,
}

/// Majority-vote bucket sketch with upper/lower count bounds
///
/// Bucket invariant: `0 <= C <= V`.
///
/// # Examples
/// ```
/// use flowsketch::reversible::MVSketch;
/// use flowsketch::{AwareHash, FlowKey};
///
/// let mut mv = MVSketch::<i64, AwareHash, 4>::with_seed(3, 64, 1).unwrap();
/// let heavy = FlowKey::<4>::from(1u32);
/// mv.update(&heavy, 50);
/// assert!(mv.query(&heavy) >= 50);
/// ```
#[derive(Clone, Debug)]
pub struct MVSketch<T, H, const N: usize> {
    depth: usize,
    width: usize,
    hashes: HashFamily<H>,
    buckets: Vec<Bucket<T, N>>,
}

impl<T: SignedCounter, H: SeededHasher, const N: usize> MVSketch<T, H, N> {
    /// Build a sketch seeded from the process-wide PRNG
    ///
    /// `width` is rounded up to the next prime.
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
            buckets: vec![
                Bucket {
                    total: T::ZERO,
                    key: FlowKey::default(),
                    votes: T::ZERO,
                };
                depth * width
            ],
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

    #[inline]
    fn bucket_index(&self, row: usize, key: &FlowKey<N>) -> usize {
        row * self.width + (self.hashes[row].hash_key(key) % self.width as u64) as usize
    }

    /// Fold a weighted update into one bucket per row
    pub fn update(&mut self, key: &FlowKey<N>, val: T) {
        for row in 0..self.depth {
            let idx = self.bucket_index(row, key);
            let bucket = &mut self.buckets[idx];
            bucket.total = bucket.total.saturating_add(val);
            if bucket.key == *key {
                bucket.votes = bucket.votes.saturating_add(val);
            } else {
                bucket.votes = bucket.votes.saturating_sub(val);
                if bucket.votes < T::ZERO {
                    bucket.key = *key;
                    bucket.votes = bucket.votes.abs_value();
                }
            }
        }
    }

    /// Minimum over rows of the bucket estimate; an upper bound on the truth
    pub fn query(&self, key: &FlowKey<N>) -> T {
        let mut result = i64::MAX;
        for row in 0..self.depth {
            let bucket = &self.buckets[self.bucket_index(row, key)];
            let est = if bucket.key == *key {
                (bucket.total.to_i64() + bucket.votes.to_i64()) / 2
            } else {
                (bucket.total.to_i64() - bucket.votes.to_i64()) / 2
            };
            result = result.min(est);
        }
        T::from_i64(result)
    }

    /// Bracket the flow's true count
    ///
    /// The lower bound is the best matching vote count across rows; the
    /// upper bound is the point estimate.
    pub fn query_bounds(&self, key: &FlowKey<N>) -> Bounds<T> {
        let mut lower = T::ZERO;
        for row in 0..self.depth {
            let bucket = &self.buckets[self.bucket_index(row, key)];
            if bucket.key == *key {
                lower = lower.max(bucket.votes);
            }
        }
        Bounds {
            lower,
            upper: self.query(key),
        }
    }

    /// Flows whose estimate reaches `threshold`
    ///
    /// Only bucket candidates are examined; a flow heavy enough to pass the
    /// threshold holds the majority of some bucket with high probability.
    pub fn heavy_hitters(&self, threshold: T) -> BTreeMap<FlowKey<N>, T> {
        let mut hitters = BTreeMap::new();
        for bucket in &self.buckets {
            if bucket.total < threshold || hitters.contains_key(&bucket.key) {
                continue;
            }
            let estimate = self.query(&bucket.key);
            if estimate >= threshold {
                hitters.insert(bucket.key, estimate);
            }
        }
        hitters
    }

    /// Flows whose bracketed change between `self` and `other` reaches
    /// `threshold`
    ///
    /// # Panics
    /// Panics if the two sketches were built with different shapes.
    pub fn heavy_changers(&self, threshold: T, other: &Self) -> BTreeMap<FlowKey<N>, T> {
        assert_eq!(self.depth, other.depth, "depth mismatch");
        assert_eq!(self.width, other.width, "width mismatch");

        let thresh = threshold.to_i64();
        let change = |key: &FlowKey<N>| -> i64 {
            let a = self.query_bounds(key);
            let b = other.query_bounds(key);
            (a.upper.to_i64() - b.lower.to_i64())
                .abs()
                .max((a.lower.to_i64() - b.upper.to_i64()).abs())
        };

        let mut changers = BTreeMap::new();
        let mut scan = |buckets: &[Bucket<T, N>]| {
            for bucket in buckets {
                if bucket.total.to_i64() < thresh || changers.contains_key(&bucket.key) {
                    continue;
                }
                let delta = change(&bucket.key);
                if delta >= thresh {
                    changers.insert(bucket.key, T::from_i64(delta));
                }
            }
        };
        scan(&self.buckets);
        scan(&other.buckets);
        changers
    }
}

impl<T: SignedCounter, H: SeededHasher, const N: usize> Sketch for MVSketch<T, H, N> {
    fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.total = T::ZERO;
            bucket.key = FlowKey::default();
            bucket.votes = T::ZERO;
        }
    }

    fn byte_size(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.hashes.byte_size()
            + self.buckets.len() * std::mem::size_of::<Bucket<T, N>>()
    }
}

impl<T: SignedCounter, H: SeededHasher, const N: usize> KeyedSketch<T, N> for MVSketch<T, H, N> {
    fn update(&mut self, key: &FlowKey<N>, val: T) {
        MVSketch::update(self, key, val);
    }

    fn query(&self, key: &FlowKey<N>) -> T {
        MVSketch::query(self, key)
    }
}
