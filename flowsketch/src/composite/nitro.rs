//! NitroSketch: sampled CountSketch updates at line rate
//!
//! NitroSketch (Liu et al., SIGCOMM 2019) keeps a CountSketch table but
//! decouples update cost from packet rate: instead of flipping a coin per
//! row, a geometric skip tells the sketch which `(packet, row)` pair to
//! touch next, and each applied update is scaled by `1 / p` to stay
//! unbiased. The "always correct" mode applies unsampled updates until the
//! per-row squared-mass median crosses a variance threshold, then switches
//! permanently to sampled mode.

use crate::common::table::CounterTable;
use crate::common::{
    invalid_capacity, util, with_process_rng, Counter, FlowHasher, FlowKey, HashFamily,
    KeyedSketch, Result, SeededHasher, SignedCounter, Sketch,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Sampling probabilities selectable by `adjust_update_prob`
const UPDATE_PROBS: [f64; 8] = [
    1.0,
    1.0 / 2.0,
    1.0 / 4.0,
    1.0 / 8.0,
    1.0 / 16.0,
    1.0 / 32.0,
    1.0 / 64.0,
    1.0 / 128.0,
];

/// Geometric-skip sampled CountSketch
///
/// # Examples
/// ```
/// use flowsketch::composite::NitroSketch;
/// use flowsketch::{AwareHash, FlowKey};
///
/// let mut ns = NitroSketch::<i64, AwareHash>::with_seed(5, 128, 1).unwrap();
/// let flow = FlowKey::<4>::from(1u32);
/// for _ in 0..100 {
///     ns.update(&flow, 1);
/// }
/// assert!(ns.query(&flow) > 0);
/// ```
#[derive(Clone, Debug)]
pub struct NitroSketch<T, H> {
    depth: usize,
    width: usize,
    index_hashes: HashFamily<H>,
    sign_hashes: HashFamily<H>,
    table: CounterTable<T>,
    square_sum: Vec<f64>,
    next_packet: i64,
    next_bucket: i64,
    update_prob: f64,
    line_rate: bool,
    switch_thresh: f64,
    sampler: StdRng,
}

impl<T: SignedCounter, H: SeededHasher> NitroSketch<T, H> {
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

    /// Build a sketch drawing hash and sampler state from `rng`
    pub fn with_rng<R: Rng + ?Sized>(depth: usize, width: usize, rng: &mut R) -> Result<Self> {
        if depth == 0 {
            return Err(invalid_capacity("depth", depth, "must be > 0"));
        }
        if width == 0 {
            return Err(invalid_capacity("width", width, "must be > 0"));
        }
        let width = util::next_prime(width);
        let switch_thresh = (1.0 + (11.0 / width as f64).sqrt()) * (width as f64) * (width as f64);
        Ok(Self {
            depth,
            width,
            index_hashes: HashFamily::with_rng(depth, rng)?,
            sign_hashes: HashFamily::with_rng(depth, rng)?,
            table: CounterTable::new(depth, width)?,
            square_sum: vec![0.0; depth],
            next_packet: 1,
            next_bucket: 0,
            update_prob: 1.0,
            line_rate: false,
            switch_thresh,
            sampler: StdRng::seed_from_u64(rng.random()),
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

    /// Current sampling probability
    pub fn update_prob(&self) -> f64 {
        self.update_prob
    }

    /// True once the sketch switched to sampled updates permanently
    pub fn line_rate_enabled(&self) -> bool {
        self.line_rate
    }

    /// Pick the sampling probability from the observed traffic rate
    ///
    /// `p = 2^-clamp(floor(log2(rate)), 0, 7)`.
    pub fn adjust_update_prob(&mut self, traffic_rate: f64) {
        let log_rate = traffic_rate.log2() as i64;
        let idx = log_rate.clamp(0, 7) as usize;
        self.update_prob = UPDATE_PROBS[idx];
    }

    /// Adaptive update: exact until the variance threshold trips, sampled
    /// afterwards
    pub fn update<const N: usize>(&mut self, key: &FlowKey<N>, val: T) {
        self.always_correct_update(key, val);
    }

    /// Sampled update at the current probability
    pub fn always_line_rate_update<const N: usize>(&mut self, key: &FlowKey<N>, val: T) {
        let prob = self.update_prob;
        self.do_update(key, val, prob);
    }

    /// Unsampled until the squared-mass median crosses the switch threshold,
    /// then sampled permanently
    pub fn always_correct_update<const N: usize>(&mut self, key: &FlowKey<N>, val: T) {
        let prob = if self.check_line_rate() {
            self.update_prob
        } else {
            1.0
        };
        self.do_update(key, val, prob);
    }

    fn do_update<const N: usize>(&mut self, key: &FlowKey<N>, val: T, prob: f64) {
        self.next_packet -= 1;
        if self.next_packet != 0 {
            return;
        }
        loop {
            let row = self.next_bucket as usize;
            let idx = (self.index_hashes[row].hash_key(key) % self.width as u64) as usize;
            let sign = if self.sign_hashes[row].hash_key(key) & 1 == 1 {
                1.0
            } else {
                -1.0
            };
            let delta = val.to_f64() / prob * sign;
            let current = self.table.at(row, idx).to_f64();
            self.square_sum[row] += (2.0 * current + delta) * delta;
            self.table.add(row, idx, T::from_f64(delta));

            self.advance_cursor(prob);
            if self.next_packet > 0 {
                break;
            }
        }
    }

    /// Move the `(packet, row)` cursor by a geometric skip
    fn advance_cursor(&mut self, prob: f64) {
        let skip = if prob < 1.0 {
            // inverse-transform geometric: failures before the next success
            let u: f64 = self.sampler.random();
            let u = u.max(f64::MIN_POSITIVE);
            1 + (u.ln() / (1.0 - prob).ln()).floor() as i64
        } else {
            1
        };
        self.next_bucket += skip;
        self.next_packet = self.next_bucket / self.depth as i64;
        self.next_bucket %= self.depth as i64;
    }

    /// One-way switch into sampled mode once the variance budget is spent
    fn check_line_rate(&mut self) -> bool {
        if self.line_rate {
            return true;
        }
        let mut sums = self.square_sum.clone();
        let median = util::median_f64(&mut sums);
        if median >= self.switch_thresh {
            log::debug!(
                "nitro sketch switching to line-rate updates (median {:.1} >= {:.1})",
                median,
                self.switch_thresh
            );
            self.line_rate = true;
        }
        self.line_rate
    }

    /// Absolute median of the per-row estimators, as in CountSketch
    pub fn query<const N: usize>(&self, key: &FlowKey<N>) -> T {
        let mut values: Vec<T> = (0..self.depth)
            .map(|row| {
                let idx = (self.index_hashes[row].hash_key(key) % self.width as u64) as usize;
                let c = self.table.at(row, idx);
                if self.sign_hashes[row].hash_key(key) & 1 == 1 {
                    c
                } else {
                    T::from_i64(-c.to_i64())
                }
            })
            .collect();
        util::abs_median(&mut values)
    }
}

impl<T: SignedCounter, H: SeededHasher> Sketch for NitroSketch<T, H> {
    fn clear(&mut self) {
        self.table.clear();
        self.square_sum.fill(0.0);
        self.next_packet = 1;
        self.next_bucket = 0;
        self.update_prob = 1.0;
        self.line_rate = false;
    }

    fn byte_size(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.index_hashes.byte_size()
            + self.sign_hashes.byte_size()
            + self.table.heap_bytes()
            + self.square_sum.len() * std::mem::size_of::<f64>()
    }
}

impl<T: SignedCounter, H: SeededHasher, const N: usize> KeyedSketch<T, N> for NitroSketch<T, H> {
    fn update(&mut self, key: &FlowKey<N>, val: T) {
        NitroSketch::update(self, key, val);
    }

    fn query(&self, key: &FlowKey<N>) -> T {
        NitroSketch::query(self, key)
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
    fn test_unsampled_mode_matches_count_sketch_exactness() {
        let mut ns = NitroSketch::<i64, AwareHash>::with_seed(5, 64, 1).unwrap();
        for _ in 0..40 {
            ns.update(&key(1), 1);
        }
        assert_eq!(ns.query(&key(1)), 40);
    }

    #[test]
    fn test_adjust_update_prob_clamps() {
        let mut ns = NitroSketch::<i64, AwareHash>::with_seed(3, 32, 1).unwrap();
        ns.adjust_update_prob(0.5);
        assert_eq!(ns.update_prob(), 1.0);
        ns.adjust_update_prob(4.0);
        assert_eq!(ns.update_prob(), 0.25);
        ns.adjust_update_prob(1e9);
        assert_eq!(ns.update_prob(), 1.0 / 128.0);
    }

    #[test]
    fn test_sampled_mode_stays_near_truth() {
        let mut ns = NitroSketch::<i64, AwareHash>::with_seed(5, 128, 2).unwrap();
        ns.adjust_update_prob(4.0); // p = 1/4
        for _ in 0..4000 {
            ns.always_line_rate_update(&key(1), 1);
        }
        let est = ns.query(&key(1));
        assert!((2000..=6000).contains(&est), "estimate {} far off", est);
    }

    #[test]
    fn test_mode_switch_is_one_way() {
        let mut ns = NitroSketch::<i64, AwareHash>::with_seed(3, 4, 3).unwrap();
        ns.adjust_update_prob(16.0);
        assert!(!ns.line_rate_enabled());
        // tiny table: the squared-mass median trips quickly
        for v in 0..20_000u32 {
            ns.update(&key(v % 97), 5);
        }
        assert!(ns.line_rate_enabled());
        ns.update(&key(1), 1);
        assert!(ns.line_rate_enabled());
    }

    #[test]
    fn test_clear_restores_construction_state() {
        let mut ns = NitroSketch::<i64, AwareHash>::with_seed(3, 4, 3).unwrap();
        ns.adjust_update_prob(64.0);
        for v in 0..20_000u32 {
            ns.update(&key(v % 97), 5);
        }
        ns.clear();
        assert!(!ns.line_rate_enabled());
        assert_eq!(ns.update_prob(), 1.0);
        assert_eq!(ns.query(&key(1)), 0);
    }
}
