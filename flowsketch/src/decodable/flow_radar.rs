//! FlowRadar: XOR-encoded flow sets with singleton peeling
//!
//! FlowRadar (Li et al., NSDI 2016) pairs a Bloom filter over the flow set
//! with three parallel arrays: how many distinct flows hashed into a cell,
//! the sizes accumulated there, and the XOR of the flow keys. A cell touched
//! by exactly one flow names that flow outright; peeling it removes the flow
//! from its other cells, often exposing new singletons until the whole flow
//! set is recovered.

use crate::common::{
    invalid_capacity, util, with_process_rng, Counter, FlowHasher, FlowKey, HashFamily, Result,
    SeededHasher, Sketch,
};
use crate::membership::BloomFilter;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

/// XOR-accumulator flow encoder with peeling decode
///
/// # Examples
/// ```
/// use flowsketch::decodable::FlowRadar;
/// use flowsketch::{AwareHash, FlowKey};
///
/// let mut fr = FlowRadar::<u64, AwareHash, 4>::with_seed(2048, 4, 101, 4, 1).unwrap();
/// for v in 1..=10u32 {
///     fr.update(&FlowKey::<4>::from(v), 7);
/// }
/// let decoded = fr.decode();
/// assert_eq!(decoded.len(), 10);
/// ```
#[derive(Clone, Debug)]
pub struct FlowRadar<T, H, const N: usize> {
    n_cells: usize,
    num_hash: usize,
    num_flows: usize,
    bloom: BloomFilter<H>,
    flow_count: Vec<T>,
    size_count: Vec<T>,
    keys: Vec<FlowKey<N>>,
    hashes: HashFamily<H>,
}

impl<T: Counter, H: SeededHasher, const N: usize> FlowRadar<T, H, N> {
    /// Build an encoder seeded from the process-wide PRNG
    ///
    /// `n_cells` is rounded up to the next prime; the Bloom filter gets
    /// `bloom_bits` bits (also primed) and `bloom_hashes` probes.
    ///
    /// # Errors
    /// Returns `InvalidCapacity` if any dimension is zero.
    pub fn new(
        bloom_bits: usize,
        bloom_hashes: usize,
        n_cells: usize,
        num_hash: usize,
    ) -> Result<Self> {
        with_process_rng(|rng| Self::with_rng(bloom_bits, bloom_hashes, n_cells, num_hash, rng))
    }

    /// Build an encoder with a private deterministic seed
    pub fn with_seed(
        bloom_bits: usize,
        bloom_hashes: usize,
        n_cells: usize,
        num_hash: usize,
        seed: u64,
    ) -> Result<Self> {
        Self::with_rng(
            bloom_bits,
            bloom_hashes,
            n_cells,
            num_hash,
            &mut StdRng::seed_from_u64(seed),
        )
    }

    /// Build an encoder drawing hash state from `rng`
    pub fn with_rng<R: Rng + ?Sized>(
        bloom_bits: usize,
        bloom_hashes: usize,
        n_cells: usize,
        num_hash: usize,
        rng: &mut R,
    ) -> Result<Self> {
        if n_cells == 0 {
            return Err(invalid_capacity("n_cells", n_cells, "must be > 0"));
        }
        let n_cells = util::next_prime(n_cells);
        Ok(Self {
            n_cells,
            num_hash,
            num_flows: 0,
            bloom: BloomFilter::with_rng(bloom_bits, bloom_hashes, rng)?,
            flow_count: vec![T::ZERO; n_cells],
            size_count: vec![T::ZERO; n_cells],
            keys: vec![FlowKey::default(); n_cells],
            hashes: HashFamily::with_rng(num_hash, rng)?,
        })
    }

    /// Cells in each parallel array (prime)
    pub fn n_cells(&self) -> usize {
        self.n_cells
    }

    /// Distinct flows seen since the last clear (per the Bloom filter)
    pub fn num_flows(&self) -> usize {
        self.num_flows
    }

    /// Fold a packet of `size` for `key` into the encoder
    ///
    /// First-seen keys (per the Bloom filter) join the per-cell flow counts
    /// and XOR accumulators; sizes accumulate on every update.
    pub fn update(&mut self, key: &FlowKey<N>, size: T) {
        let exists = self.bloom.query(key);
        if !exists {
            self.bloom.insert(key);
            self.num_flows += 1;
        }
        for i in 0..self.num_hash {
            let idx = (self.hashes[i].hash_key(key) % self.n_cells as u64) as usize;
            if !exists {
                self.flow_count[idx] = self.flow_count[idx].saturating_add(T::from_i64(1));
                self.keys[idx] ^= *key;
            }
            self.size_count[idx] = self.size_count[idx].saturating_add(size);
        }
    }

    /// Peel singleton cells until none remain, returning the recovered flows
    ///
    /// Decoding consumes the array state: each recovered flow is subtracted
    /// from all its cells (sizes saturating at zero, with the carried size
    /// lowered to the cell remainder when the cell holds less). A
    /// non-peelable residue is left in place and simply not reported.
    pub fn decode(&mut self) -> BTreeMap<FlowKey<N>, T> {
        let one = T::from_i64(1);
        let mut decoded = BTreeMap::new();
        loop {
            let Some(cell) = (0..self.n_cells).find(|&i| self.flow_count[i] == one) else {
                break;
            };
            let key = self.keys[cell];
            let mut size = self.size_count[cell];
            for i in 0..self.num_hash {
                let idx = (self.hashes[i].hash_key(&key) % self.n_cells as u64) as usize;
                self.flow_count[idx] = self.flow_count[idx].saturating_sub(one);
                if self.size_count[idx] >= size {
                    self.size_count[idx] = self.size_count[idx].saturating_sub(size);
                } else {
                    size = self.size_count[idx];
                    self.size_count[idx] = T::ZERO;
                }
                self.keys[idx] ^= key;
            }
            decoded.insert(key, size);
        }
        log::debug!(
            "flow radar decoded {} of {} flows",
            decoded.len(),
            self.num_flows
        );
        decoded
    }
}

impl<T: Counter, H: SeededHasher, const N: usize> Sketch for FlowRadar<T, H, N> {
    fn clear(&mut self) {
        self.num_flows = 0;
        self.bloom.clear();
        self.flow_count.fill(T::ZERO);
        self.size_count.fill(T::ZERO);
        self.keys.fill(FlowKey::default());
    }

    fn byte_size(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.hashes.byte_size()
            + self.bloom.byte_size()
            + 2 * self.n_cells * std::mem::size_of::<T>()
            + self.n_cells * N
    }
}
