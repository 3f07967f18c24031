//! Elastic sketch: exact heavy part over an embedded Count-Min light part
//!
//! Elastic sketch (Yang et al., SIGCOMM 2018) splits flows by weight. The
//! heavy part is a small key-carrying bucket table whose last slot per
//! bucket is a guard counter tracking eviction pressure; a flow only swaps
//! in once the guard exceeds eight times the resident minimum. Everything
//! displaced (or refused) lands in the light part, an embedded Count-Min of
//! a narrower counter type. Flows that stay in the heavy part un-evicted are
//! counted exactly.

use crate::common::{
    invalid_capacity, util, with_process_rng, Counter, FlowHasher, FlowKey, KeyedSketch, Result,
    SeededHasher, Sketch,
};
use crate::frequency::CountMinSketch;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// swap once guard pressure exceeds eight times the resident minimum
const SWAP_PRESSURE_SHIFT: u32 = 3;

#[derive(Clone, Copy, Debug)]
struct HeavyEntry<T, const N: usize> {
    key: FlowKey<N>,
    val: T,
    evicted: bool,
}

impl<T: Counter, const N: usize> HeavyEntry<T, N> {
    fn empty() -> Self {
        Self {
            key: FlowKey::default(),
            val: T::ZERO,
            evicted: false,
        }
    }

    fn is_empty(&self) -> bool {
        self.key.is_zero()
    }
}

/// Heavy/light split sketch with guard-gated eviction
///
/// `T` is the heavy-part counter, `U` the (narrower) light-part counter.
/// Light-part increments that would overflow `U` are skipped, so the light
/// part never wraps.
///
/// # Examples
/// ```
/// use flowsketch::composite::ElasticSketch;
/// use flowsketch::{AwareHash, FlowKey};
///
/// let mut es = ElasticSketch::<u64, u16, AwareHash, 4>::with_seed(64, 4, 3, 256, 1).unwrap();
/// let flow = FlowKey::<4>::from(1u32);
/// es.update(&flow, 10);
/// assert!(es.query(&flow) >= 10);
/// ```
#[derive(Clone, Debug)]
pub struct ElasticSketch<T, U, H, const N: usize> {
    num_buckets: usize,
    num_per_bucket: usize,
    heavy: Vec<HeavyEntry<T, N>>,
    heavy_hash: H,
    light: CountMinSketch<U, H>,
}

impl<T: Counter, U: Counter, H: SeededHasher, const N: usize> ElasticSketch<T, U, H, N> {
    /// Build a sketch seeded from the process-wide PRNG
    ///
    /// The heavy part holds `num_buckets` (primed) buckets of
    /// `num_per_bucket` slots, the last slot of each being the guard
    /// counter. The light part is a `light_depth x light_width` Count-Min.
    ///
    /// # Errors
    /// Returns `InvalidCapacity` if `num_buckets` is zero,
    /// `num_per_bucket < 2`, or the light shape is degenerate.
    pub fn new(
        num_buckets: usize,
        num_per_bucket: usize,
        light_depth: usize,
        light_width: usize,
    ) -> Result<Self> {
        with_process_rng(|rng| {
            Self::with_rng(num_buckets, num_per_bucket, light_depth, light_width, rng)
        })
    }

    /// Build a sketch with a private deterministic seed
    pub fn with_seed(
        num_buckets: usize,
        num_per_bucket: usize,
        light_depth: usize,
        light_width: usize,
        seed: u64,
    ) -> Result<Self> {
        Self::with_rng(
            num_buckets,
            num_per_bucket,
            light_depth,
            light_width,
            &mut StdRng::seed_from_u64(seed),
        )
    }

    /// Build a sketch drawing hash state from `rng`
    pub fn with_rng<R: Rng + ?Sized>(
        num_buckets: usize,
        num_per_bucket: usize,
        light_depth: usize,
        light_width: usize,
        rng: &mut R,
    ) -> Result<Self> {
        if num_buckets == 0 {
            return Err(invalid_capacity("num_buckets", num_buckets, "must be > 0"));
        }
        if num_per_bucket < 2 {
            return Err(invalid_capacity(
                "num_per_bucket",
                num_per_bucket,
                "must be >= 2 (one slot plus the guard)",
            ));
        }
        let num_buckets = util::next_prime(num_buckets);
        Ok(Self {
            num_buckets,
            num_per_bucket,
            heavy: vec![HeavyEntry::empty(); num_buckets * num_per_bucket],
            heavy_hash: H::from_rng(rng),
            light: CountMinSketch::with_rng(light_depth, light_width, rng)?,
        })
    }

    /// Heavy-part buckets (prime)
    pub fn num_buckets(&self) -> usize {
        self.num_buckets
    }

    /// Slots per bucket including the guard
    pub fn num_per_bucket(&self) -> usize {
        self.num_per_bucket
    }

    /// Add into the light part only if the result fits `U`
    fn light_insert(&mut self, key: &FlowKey<N>, val: T) {
        let projected = self.light.query(key).to_i64() + val.to_i64();
        if projected <= U::MAX.to_i64() {
            self.light.update(key, U::from_i64(val.to_i64()));
        }
    }

    /// Fold a weighted update into the heavy part, spilling to the light part
    pub fn update(&mut self, key: &FlowKey<N>, val: T) {
        let bucket = (self.heavy_hash.hash_key(key) % self.num_buckets as u64) as usize;
        let base = bucket * self.num_per_bucket;
        let guard = base + self.num_per_bucket - 1;

        let mut min_slot = base;
        let mut min_val = self.heavy[base].val;
        for slot in base..guard {
            let entry = &mut self.heavy[slot];
            if entry.key == *key {
                entry.val = entry.val.saturating_add(val);
                return;
            }
            if entry.is_empty() {
                *entry = HeavyEntry {
                    key: *key,
                    val,
                    evicted: false,
                };
                return;
            }
            if entry.val < min_val {
                min_slot = slot;
                min_val = entry.val;
            }
        }

        let guard_val = self.heavy[guard].val.saturating_add(T::from_i64(1));
        let pressure_limit = min_val.to_i64() << SWAP_PRESSURE_SHIFT;
        if guard_val.to_i64() <= pressure_limit {
            // swap refused: remember the pressure, push the incomer down
            self.heavy[guard].val = guard_val;
            self.light_insert(key, val);
        } else {
            // swap: evict the resident minimum to the light part
            let (evicted_key, evicted_val) = (self.heavy[min_slot].key, self.heavy[min_slot].val);
            self.heavy[guard].val = T::ZERO;
            self.heavy[min_slot] = HeavyEntry {
                key: *key,
                val,
                evicted: true,
            };
            self.light_insert(&evicted_key, evicted_val);
        }
    }

    /// Point estimate combining the heavy and light parts
    ///
    /// A heavy entry that never evicted is exact; one marked evicted adds
    /// the light estimate to recover mass pushed down earlier. Keys absent
    /// from the heavy part read the light part alone.
    pub fn query(&self, key: &FlowKey<N>) -> T {
        let bucket = (self.heavy_hash.hash_key(key) % self.num_buckets as u64) as usize;
        let base = bucket * self.num_per_bucket;
        for slot in base..base + self.num_per_bucket - 1 {
            let entry = &self.heavy[slot];
            if entry.key == *key {
                return if entry.evicted {
                    entry.val.saturating_add(T::from_i64(self.light.query(key).to_i64()))
                } else {
                    entry.val
                };
            }
        }
        T::from_i64(self.light.query(key).to_i64())
    }
}

impl<T: Counter, U: Counter, H: SeededHasher, const N: usize> Sketch
    for ElasticSketch<T, U, H, N>
{
    fn clear(&mut self) {
        for entry in &mut self.heavy {
            *entry = HeavyEntry::empty();
        }
        self.light.clear();
    }

    fn byte_size(&self) -> usize {
        std::mem::size_of::<Self>()
            + std::mem::size_of::<H>()
            + self.heavy.len() * std::mem::size_of::<HeavyEntry<T, N>>()
            + self.light.byte_size()
    }
}

impl<T: Counter, U: Counter, H: SeededHasher, const N: usize> KeyedSketch<T, N>
    for ElasticSketch<T, U, H, N>
{
    fn update(&mut self, key: &FlowKey<N>, val: T) {
        ElasticSketch::update(self, key, val);
    }

    fn query(&self, key: &FlowKey<N>) -> T {
        ElasticSketch::query(self, key)
    }
}
