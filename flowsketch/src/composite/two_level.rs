//! Two-level super-spreader detector
//!
//! A super-spreader is a source talking to more than `w` distinct
//! destinations. The detector (after Venkataraman et al., NDSS 2005) first
//! deduplicates `(src, dst)` pairs with a Bloom filter, then pushes
//! surviving pairs through two sampling levels: level 1 admits sources at
//! rate `r1`, level 2 spreads each admitted source over `table_count` Bloom
//! filters at rate `1 / gamma`. A source whose per-table presence count
//! reaches `w` is promoted into a linear-probed reservoir of unique
//! sources.

use crate::common::{
    invalid_capacity, util, with_process_rng, FlowHasher, FlowKey, HashFamily, Result,
    SeededHasher, Sketch,
};
use crate::membership::BloomFilter;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Per-mille gates derive from the sampling ratios
const GATE_SCALE: f64 = 1000.0;

/// Shape and sampling parameters for [`TwoLevel`]
#[derive(Clone, Copy, Debug)]
pub struct TwoLevelConfig {
    /// Bits of the distinct-pair Bloom filter
    pub distinct_bits: usize,
    /// Hashes of the distinct-pair Bloom filter
    pub distinct_hashes: usize,
    /// Bits of the level-1 source Bloom filter
    pub level1_bits: usize,
    /// Hashes of the level-1 source Bloom filter
    pub level1_hashes: usize,
    /// Number of level-2 Bloom filters
    pub table_count: usize,
    /// Bits per level-2 Bloom filter
    pub table_bits: usize,
    /// Hashes per level-2 Bloom filter
    pub table_hashes: usize,
    /// Slots in the super-spreader reservoir
    pub reservoir_width: usize,
    /// Level-1 sampling ratio in `(0, 1]`
    pub r1: f64,
    /// Level-2 admission ratio in `(0, 1]`
    pub r2: f64,
    /// Per-table sampling divisor (`>= 1`)
    pub gamma: f64,
    /// Distinct-destination threshold promoting a source
    pub promote_threshold: usize,
}

/// Distinct-pair filter, two sampling levels, and a source reservoir
///
/// Source `0` cannot be stored: the reservoir uses zero as its empty-slot
/// sentinel.
#[derive(Clone, Debug)]
pub struct TwoLevel<H> {
    table_count: usize,
    reservoir_width: usize,
    edge1: u64,
    edge2: u64,
    edge3: u64,
    promote_threshold: usize,
    hashes: HashFamily<H>,
    distinct: BloomFilter<H>,
    level1: BloomFilter<H>,
    level2: Vec<BloomFilter<H>>,
    reservoir: Vec<u32>,
}

impl<H: SeededHasher> TwoLevel<H> {
    /// Build a detector seeded from the process-wide PRNG
    ///
    /// # Errors
    /// Returns `InvalidCapacity` for zero table counts or widths, ratios
    /// outside `(0, 1]`, or `gamma < 1`.
    pub fn new(config: &TwoLevelConfig) -> Result<Self> {
        with_process_rng(|rng| Self::with_rng(config, rng))
    }

    /// Build a detector with a private deterministic seed
    pub fn with_seed(config: &TwoLevelConfig, seed: u64) -> Result<Self> {
        Self::with_rng(config, &mut StdRng::seed_from_u64(seed))
    }

    /// Build a detector drawing hash state from `rng`
    pub fn with_rng<R: Rng + ?Sized>(config: &TwoLevelConfig, rng: &mut R) -> Result<Self> {
        if config.table_count == 0 {
            return Err(invalid_capacity("table_count", config.table_count, "must be > 0"));
        }
        if config.reservoir_width == 0 {
            return Err(invalid_capacity(
                "reservoir_width",
                config.reservoir_width,
                "must be > 0",
            ));
        }
        if !(0.0..=1.0).contains(&config.r1) || config.r1 <= 0.0 {
            return Err(invalid_capacity("r1", config.r1, "must be in (0, 1]"));
        }
        if !(0.0..=1.0).contains(&config.r2) || config.r2 <= 0.0 {
            return Err(invalid_capacity("r2", config.r2, "must be in (0, 1]"));
        }
        if config.gamma < 1.0 {
            return Err(invalid_capacity("gamma", config.gamma, "must be >= 1"));
        }

        let level2 = (0..config.table_count)
            .map(|_| BloomFilter::with_rng(config.table_bits, config.table_hashes, rng))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            table_count: config.table_count,
            reservoir_width: util::next_prime(config.reservoir_width),
            edge1: (config.r1 * GATE_SCALE) as u64,
            edge2: (config.r2 * GATE_SCALE) as u64,
            edge3: (GATE_SCALE / config.gamma) as u64,
            promote_threshold: config.promote_threshold,
            hashes: HashFamily::with_rng(config.table_count + 2, rng)?,
            distinct: BloomFilter::with_rng(config.distinct_bits, config.distinct_hashes, rng)?,
            level1: BloomFilter::with_rng(config.level1_bits, config.level1_hashes, rng)?,
            level2,
            reservoir: vec![0u32; util::next_prime(config.reservoir_width)],
        })
    }

    /// Observe one `(src, dst)` packet
    ///
    /// Repeated pairs are ignored via the distinct filter. Gates are hash
    /// comparisons against the per-mille edges, so sampling is deterministic
    /// per pair.
    pub fn insert(&mut self, src: u32, dst: u32) {
        let pair = FlowKey::<8>::from((src, dst));
        if self.distinct.query(&pair) {
            return;
        }
        let src_key = FlowKey::<4>::from(src);
        let h1 = self.hashes[0].hash_key(&pair) % GATE_SCALE as u64;
        let h2 = self.hashes[1].hash_key(&pair) % GATE_SCALE as u64;

        if h2 < self.edge2 && self.level1.query(&src_key) {
            let mut count = 0usize;
            for (i, table) in self.level2.iter_mut().enumerate() {
                let h3 = self.hashes[i + 2].hash_key(&pair) % GATE_SCALE as u64;
                if h3 < self.edge3 {
                    table.insert(&src_key);
                    count += 1;
                } else {
                    count += usize::from(table.query(&src_key));
                }
            }
            if count >= self.promote_threshold {
                self.promote(src, &src_key);
            }
        }

        if h1 < self.edge1 {
            self.level1.insert(&src_key);
        }
        self.distinct.insert(&pair);
    }

    /// Linear-probe the source into the reservoir, deduplicating
    fn promote(&mut self, src: u32, src_key: &FlowKey<4>) {
        let start = (self.hashes[0].hash_key(src_key) % self.reservoir_width as u64) as usize;
        for offset in 0..self.reservoir_width {
            let slot = (start + offset) % self.reservoir_width;
            if self.reservoir[slot] == 0 {
                self.reservoir[slot] = src;
                break;
            }
            if self.reservoir[slot] == src {
                break;
            }
        }
    }

    /// Sources promoted as super-spreaders
    pub fn super_spreaders(&self) -> Vec<u32> {
        self.reservoir.iter().copied().filter(|&s| s != 0).collect()
    }
}

impl<H: SeededHasher> Sketch for TwoLevel<H> {
    fn clear(&mut self) {
        self.distinct.clear();
        self.level1.clear();
        for table in &mut self.level2 {
            table.clear();
        }
        self.reservoir.fill(0);
    }

    fn byte_size(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.hashes.byte_size()
            + self.distinct.byte_size()
            + self.level1.byte_size()
            + self.level2.iter().map(Sketch::byte_size).sum::<usize>()
            + self.reservoir.len() * std::mem::size_of::<u32>()
    }
}
