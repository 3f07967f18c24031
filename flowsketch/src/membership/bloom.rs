//! Bloom filter over flow keys
//!
//! Classic Bloom filter (Bloom, 1970): a prime-sized bit array probed by
//! `num_hash` independent hashes. Membership answers have no false negatives
//! and a tunable false-positive rate. No removals. The decodable and
//! super-spreader sketches embed this filter for their flow-set tests.

use crate::common::{
    invalid_capacity, util, with_process_rng, FlowHasher, FlowKey, HashFamily, Result,
    SeededHasher, Sketch,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Bloom filter: prime bit count, `num_hash` probes per key
///
/// # Examples
/// ```
/// use flowsketch::membership::BloomFilter;
/// use flowsketch::{AwareHash, FlowKey};
///
/// let mut bf = BloomFilter::<AwareHash>::with_seed(1024, 4, 1).unwrap();
/// let flow = FlowKey::<4>::from(1u32);
/// bf.insert(&flow);
/// assert!(bf.query(&flow));
/// ```
#[derive(Clone, Debug)]
pub struct BloomFilter<H> {
    nbits: usize,
    num_hash: usize,
    bits: Vec<u8>,
    hashes: HashFamily<H>,
}

impl<H: SeededHasher> BloomFilter<H> {
    /// Build a filter seeded from the process-wide PRNG
    ///
    /// `nbits` is rounded up to the next prime.
    ///
    /// # Errors
    /// Returns `InvalidCapacity` if `nbits` or `num_hash` is zero.
    pub fn new(nbits: usize, num_hash: usize) -> Result<Self> {
        with_process_rng(|rng| Self::with_rng(nbits, num_hash, rng))
    }

    /// Build a filter with a private deterministic seed
    pub fn with_seed(nbits: usize, num_hash: usize, seed: u64) -> Result<Self> {
        Self::with_rng(nbits, num_hash, &mut StdRng::seed_from_u64(seed))
    }

    /// Build a filter drawing hash state from `rng`
    pub fn with_rng<R: Rng + ?Sized>(nbits: usize, num_hash: usize, rng: &mut R) -> Result<Self> {
        if nbits == 0 {
            return Err(invalid_capacity("nbits", nbits, "must be > 0"));
        }
        let nbits = util::next_prime(nbits);
        Ok(Self {
            nbits,
            num_hash,
            bits: vec![0u8; nbits.div_ceil(8)],
            hashes: HashFamily::with_rng(num_hash, rng)?,
        })
    }

    /// Number of bits (prime)
    pub fn nbits(&self) -> usize {
        self.nbits
    }

    #[inline]
    fn set_bit(&mut self, pos: usize) {
        self.bits[pos >> 3] |= 1 << (pos & 7);
    }

    #[inline]
    fn get_bit(&self, pos: usize) -> bool {
        (self.bits[pos >> 3] >> (pos & 7)) & 1 == 1
    }

    /// Set the key's `num_hash` probe bits
    pub fn insert<const N: usize>(&mut self, key: &FlowKey<N>) {
        for i in 0..self.num_hash {
            let pos = (self.hashes[i].hash_key(key) % self.nbits as u64) as usize;
            self.set_bit(pos);
        }
    }

    /// True iff every probe bit is set; no false negatives
    pub fn query<const N: usize>(&self, key: &FlowKey<N>) -> bool {
        (0..self.num_hash).all(|i| {
            let pos = (self.hashes[i].hash_key(key) % self.nbits as u64) as usize;
            self.get_bit(pos)
        })
    }
}

impl<H: SeededHasher> Sketch for BloomFilter<H> {
    fn clear(&mut self) {
        self.bits.fill(0);
    }

    fn byte_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.bits.len() + self.hashes.byte_size()
    }
}
