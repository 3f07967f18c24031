//! HashPipe: pipelined heavy-hitter tables
//!
//! HashPipe (Sivaraman et al., SOSR 2017) chains `depth` stages of
//! `(key, value)` slots. A new key always lands in stage 0, evicting the
//! resident, which then cascades through later stages and only displaces
//! entries smaller than itself. Heavy flows therefore settle early in the
//! pipe while mice fall off the end. A flow's count may be split across
//! stages, so queries sum every matching slot.

use crate::common::{
    invalid_capacity, util, with_process_rng, Counter, FlowHasher, FlowKey, HashFamily,
    KeyedSketch, Result, SeededHasher, Sketch,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Copy, Debug)]
struct Slot<T, const N: usize> {
    key: FlowKey<N>,
    val: T,
}

/// Multi-stage eviction pipeline for heavy-hitter tracking
///
/// The all-zero key marks an empty slot.
#[derive(Clone, Debug)]
pub struct HashPipe<T, H, const N: usize> {
    depth: usize,
    width: usize,
    hashes: HashFamily<H>,
    slots: Vec<Slot<T, N>>,
}

impl<T: Counter, H: SeededHasher, const N: usize> HashPipe<T, H, N> {
    /// Build a pipe seeded from the process-wide PRNG
    ///
    /// `width` is rounded up to the next prime.
    ///
    /// # Errors
    /// Returns `InvalidCapacity` if `depth` or `width` is zero.
    pub fn new(depth: usize, width: usize) -> Result<Self> {
        with_process_rng(|rng| Self::with_rng(depth, width, rng))
    }

    /// Build a pipe with a private deterministic seed
    pub fn with_seed(depth: usize, width: usize, seed: u64) -> Result<Self> {
        Self::with_rng(depth, width, &mut StdRng::seed_from_u64(seed))
    }

    /// Build a pipe drawing hash state from `rng`
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
            slots: vec![
                Slot {
                    key: FlowKey::default(),
                    val: T::ZERO,
                };
                depth * width
            ],
        })
    }

    /// Number of stages
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Slots per stage (prime)
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    fn slot_index(&self, stage: usize, key: &FlowKey<N>) -> usize {
        stage * self.width + (self.hashes[stage].hash_key(key) % self.width as u64) as usize
    }

    /// Push `(key, val)` through the pipe
    ///
    /// The carried pair terminates by matching a resident, filling an empty
    /// slot, or dropping off the last stage.
    pub fn update(&mut self, key: &FlowKey<N>, val: T) {
        // stage 0 always admits the incoming key
        let idx = self.slot_index(0, key);
        if self.slots[idx].key == *key {
            self.slots[idx].val = self.slots[idx].val.saturating_add(val);
            return;
        }
        if self.slots[idx].key.is_zero() {
            self.slots[idx] = Slot { key: *key, val };
            return;
        }
        let mut carried = self.slots[idx];
        self.slots[idx] = Slot { key: *key, val };

        for stage in 1..self.depth {
            let idx = self.slot_index(stage, &carried.key);
            let resident = self.slots[idx];
            if resident.key == carried.key {
                self.slots[idx].val = resident.val.saturating_add(carried.val);
                return;
            }
            if resident.key.is_zero() {
                self.slots[idx] = carried;
                return;
            }
            if resident.val < carried.val {
                self.slots[idx] = carried;
                carried = resident;
            }
        }
        // carried pair dropped off the last stage
    }

    /// Sum of every slot holding `key` across the stages
    pub fn query(&self, key: &FlowKey<N>) -> T {
        let mut sum = T::ZERO;
        for stage in 0..self.depth {
            let slot = &self.slots[self.slot_index(stage, key)];
            if slot.key == *key {
                sum = sum.saturating_add(slot.val);
            }
        }
        sum
    }

    /// All resident flows whose summed estimate reaches `threshold`
    pub fn heavy_hitters(&self, threshold: T) -> BTreeMap<FlowKey<N>, T> {
        let mut hitters = BTreeMap::new();
        let mut checked = BTreeSet::new();
        for slot in &self.slots {
            if slot.key.is_zero() || !checked.insert(slot.key) {
                continue;
            }
            let estimate = self.query(&slot.key);
            if estimate >= threshold {
                hitters.insert(slot.key, estimate);
            }
        }
        hitters
    }
}

impl<T: Counter, H: SeededHasher, const N: usize> Sketch for HashPipe<T, H, N> {
    fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.key = FlowKey::default();
            slot.val = T::ZERO;
        }
    }

    fn byte_size(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.hashes.byte_size()
            + self.slots.len() * std::mem::size_of::<Slot<T, N>>()
    }
}

impl<T: Counter, H: SeededHasher, const N: usize> KeyedSketch<T, N> for HashPipe<T, H, N> {
    fn update(&mut self, key: &FlowKey<N>, val: T) {
        HashPipe::update(self, key, val);
    }

    fn query(&self, key: &FlowKey<N>) -> T {
        HashPipe::query(self, key)
    }
}
