//! HyperLogLog cardinality estimator
//!
//! HyperLogLog (Flajolet, Fusy, Gandouet & Meunier, 2007) hashes each key to
//! 32 bits, indexes one of `m` registers with the low `log2(m)` bits, and
//! records the position of the lowest set bit of the rest. The harmonic-mean
//! estimator with the published alpha constants and small/large range
//! corrections turns the registers into a cardinality estimate with relative
//! error around `1.04 / sqrt(m)`.

use crate::common::{
    invalid_capacity, with_process_rng, FlowHasher, FlowKey, Result, SeededHasher, Sketch,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Bias-correction constant for `m` registers
fn alpha(m: usize) -> f64 {
    match m {
        16 => 0.673,
        32 => 0.697,
        64 => 0.709,
        _ => 0.7213 / (1.0 + 1.079 / m as f64),
    }
}

/// Position of the lowest set bit of `s` over a `k`-bit domain, counting
/// from 1; `k + 1` when `s` is zero
fn rank(s: u32, k: u32) -> u8 {
    if s == 0 {
        (k + 1) as u8
    } else {
        (s.trailing_zeros() + 1) as u8
    }
}

/// HyperLogLog with `m` registers, `m` a power of two in `16..=65536`
///
/// # Examples
/// ```
/// use flowsketch::cardinality::HyperLogLog;
/// use flowsketch::{AwareHash, FlowKey};
///
/// let mut hll = HyperLogLog::<AwareHash>::with_seed(1024, 1).unwrap();
/// for v in 0..500u32 {
///     hll.update(&FlowKey::<4>::from(v));
/// }
/// let est = hll.cardinality();
/// assert!(est > 350.0 && est < 650.0);
/// ```
#[derive(Clone, Debug)]
pub struct HyperLogLog<H> {
    registers: usize,
    log2_registers: u32,
    alpha: f64,
    hash: H,
    max_rank: Vec<u8>,
}

impl<H: SeededHasher> HyperLogLog<H> {
    /// Build an estimator seeded from the process-wide PRNG
    ///
    /// `registers` is rounded up to a power of two and clamped into
    /// `16..=65536`.
    ///
    /// # Errors
    /// Returns `InvalidCapacity` if `registers` is zero.
    pub fn new(registers: usize) -> Result<Self> {
        with_process_rng(|rng| Self::with_rng(registers, rng))
    }

    /// Build an estimator with a private deterministic seed
    pub fn with_seed(registers: usize, seed: u64) -> Result<Self> {
        Self::with_rng(registers, &mut StdRng::seed_from_u64(seed))
    }

    /// Build an estimator drawing hash state from `rng`
    pub fn with_rng<R: Rng + ?Sized>(registers: usize, rng: &mut R) -> Result<Self> {
        if registers == 0 {
            return Err(invalid_capacity("registers", registers, "must be > 0"));
        }
        let mut log2_registers = 4u32;
        while log2_registers < 16 && registers > (1 << log2_registers) {
            log2_registers += 1;
        }
        let registers = 1usize << log2_registers;
        Ok(Self {
            registers,
            log2_registers,
            alpha: alpha(registers),
            hash: H::from_rng(rng),
            max_rank: vec![0u8; registers],
        })
    }

    /// Number of registers (power of two)
    pub fn registers(&self) -> usize {
        self.registers
    }

    /// Fold one key occurrence into the registers
    ///
    /// Values are ignored: only key identity matters for cardinality.
    pub fn update<const N: usize>(&mut self, key: &FlowKey<N>) {
        let hashed = self.hash.hash_key(key) as u32;
        let idx = (hashed & ((1 << self.log2_registers) - 1)) as usize;
        let rest = hashed >> self.log2_registers;
        let rho = rank(rest, 32 - self.log2_registers);
        if rho > self.max_rank[idx] {
            self.max_rank[idx] = rho;
        }
    }

    /// Estimated number of distinct keys
    pub fn cardinality(&self) -> f64 {
        let m = self.registers as f64;
        let harmonic: f64 = self
            .max_rank
            .iter()
            .map(|&r| 2f64.powi(-i32::from(r)))
            .sum();
        let raw = self.alpha * m * m / harmonic;

        if raw <= 2.5 * m {
            // small-range correction: linear counting over empty registers
            let zeros = self.max_rank.iter().filter(|&&r| r == 0).count();
            if zeros > 0 {
                return m * (m / zeros as f64).ln();
            }
            raw
        } else if raw <= 2f64.powi(32) / 30.0 {
            raw
        } else {
            // large-range correction for hash saturation
            -(2f64.powi(32)) * (1.0 - raw / 2f64.powi(32)).ln()
        }
    }
}

impl<H: SeededHasher> Sketch for HyperLogLog<H> {
    fn clear(&mut self) {
        self.max_rank.fill(0);
    }

    fn byte_size(&self) -> usize {
        std::mem::size_of::<Self>() + std::mem::size_of::<H>() + self.max_rank.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::AwareHash;

    #[test]
    fn test_register_count_rounds_to_power_of_two() {
        let hll = HyperLogLog::<AwareHash>::with_seed(1000, 1).unwrap();
        assert_eq!(hll.registers(), 1024);
        let hll = HyperLogLog::<AwareHash>::with_seed(1, 1).unwrap();
        assert_eq!(hll.registers(), 16);
        let hll = HyperLogLog::<AwareHash>::with_seed(1 << 20, 1).unwrap();
        assert_eq!(hll.registers(), 65536);
    }

    #[test]
    fn test_empty_estimates_zero() {
        let hll = HyperLogLog::<AwareHash>::with_seed(1024, 1).unwrap();
        assert_eq!(hll.cardinality(), 0.0);
    }

    #[test]
    fn test_duplicates_do_not_inflate() {
        let mut hll = HyperLogLog::<AwareHash>::with_seed(1024, 2).unwrap();
        let key = FlowKey::<4>::from(1u32);
        for _ in 0..10_000 {
            hll.update(&key);
        }
        assert!(hll.cardinality() < 10.0);
    }

    #[test]
    fn test_rank_of_zero_is_domain_plus_one() {
        assert_eq!(rank(0, 22), 23);
        assert_eq!(rank(1, 22), 1);
        assert_eq!(rank(0b1000, 22), 4);
    }

    #[test]
    fn test_clear_resets() {
        let mut hll = HyperLogLog::<AwareHash>::with_seed(64, 1).unwrap();
        hll.update(&FlowKey::<4>::from(1u32));
        hll.clear();
        assert_eq!(hll.cardinality(), 0.0);
    }
}
