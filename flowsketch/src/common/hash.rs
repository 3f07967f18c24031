//! Universal hash functions for traffic sketches
//!
//! Every sketch owns a family of independently seeded hash functions over
//! flow keys. Independence comes from per-instance random state drawn from a
//! process-wide seeding PRNG (see [`seed_entropy`]); reusing one seed across
//! a family is an error the [`HashFamily`] constructor cannot make.
//!
//! None of these functions carry cryptographic guarantees. They are
//! universal-family hashes chosen for speed and distribution quality on
//! short keys (4 to 13 bytes).

use crate::common::error::invalid_capacity;
use crate::common::{FlowKey, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::Index;
use std::sync::{Mutex, OnceLock};

/// Hash function over byte strings, flow keys, and 32-bit values
///
/// All three entry points are pure queries; hashing never mutates the
/// function object.
pub trait FlowHasher {
    /// Hash a byte string to 64 bits
    fn hash(&self, data: &[u8]) -> u64;

    /// Hash a flow key (its raw bytes)
    #[inline]
    fn hash_key<const N: usize>(&self, key: &FlowKey<N>) -> u64 {
        self.hash(key.as_bytes())
    }

    /// Hash a 32-bit value (its little-endian bytes)
    #[inline]
    fn hash_u32(&self, val: u32) -> u64 {
        self.hash(&val.to_le_bytes())
    }
}

/// Hash function that can be drawn at random from its family
pub trait SeededHasher: FlowHasher + Clone {
    /// Draw an independent instance, randomizing per-instance state
    fn from_rng<R: Rng + ?Sized>(rng: &mut R) -> Self;
}

// ---------------------------------------------------------------------------
// Process-wide seeding PRNG
// ---------------------------------------------------------------------------

static SEED_RNG: OnceLock<Mutex<StdRng>> = OnceLock::new();

fn seed_rng() -> &'static Mutex<StdRng> {
    SEED_RNG.get_or_init(|| Mutex::new(StdRng::from_os_rng()))
}

/// Re-seed the process-wide PRNG used to randomize hash families
///
/// Tests call this before building any sketch to make hash layouts
/// reproducible. Sketches built afterwards draw their per-instance state from
/// the deterministic stream; sketches built earlier are unaffected.
pub fn seed_entropy(seed: u64) {
    *seed_rng().lock().expect("seed RNG poisoned") = StdRng::seed_from_u64(seed);
}

/// Run a closure against the process-wide seeding PRNG
pub(crate) fn with_process_rng<T>(f: impl FnOnce(&mut StdRng) -> T) -> T {
    let mut guard = seed_rng().lock().expect("seed RNG poisoned");
    f(&mut guard)
}

// ---------------------------------------------------------------------------
// AwareHash
// ---------------------------------------------------------------------------

const MANGLE_MAGIC: u64 = 2_083_697_005;

/// Byte-swap then multiply; spreads a sequential counter before it is hashed
fn mangle(v: u64) -> u64 {
    v.swap_bytes().wrapping_mul(MANGLE_MAGIC)
}

/// Multiply-accumulate hash with per-instance `(init, scale, hardener)` state
///
/// The accumulator starts at `init`, is multiplied by `scale` and bumped by
/// each input byte, and is finally XORed with `hardener`. Fresh instances
/// derive their three constants by hashing a mangled counter through a fixed
/// generator instance, so a family of `AwareHash` is pairwise independent.
#[derive(Clone, Debug)]
pub struct AwareHash {
    init: u64,
    scale: u64,
    hardener: u64,
}

impl AwareHash {
    const GEN_INIT: u64 = 388650253;
    const GEN_SCALE: u64 = 388650319;
    const GEN_HARDENER: u64 = 1176845762;

    /// Build an instance with explicit constants (the generator instance and
    /// tests use this; everyone else goes through the family constructors)
    pub const fn with_params(init: u64, scale: u64, hardener: u64) -> Self {
        Self {
            init,
            scale,
            hardener,
        }
    }
}

impl FlowHasher for AwareHash {
    fn hash(&self, data: &[u8]) -> u64 {
        let mut result = self.init;
        for &b in data {
            result = result.wrapping_mul(self.scale).wrapping_add(u64::from(b));
        }
        result ^ self.hardener
    }
}

impl SeededHasher for AwareHash {
    fn from_rng<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let generator =
            AwareHash::with_params(Self::GEN_INIT, Self::GEN_SCALE, Self::GEN_HARDENER);
        let seed: u64 = rng.random();
        let draw = |i: u64| generator.hash(&mangle(seed.wrapping_add(i)).to_le_bytes());
        Self {
            init: draw(0),
            scale: draw(1),
            hardener: draw(2),
        }
    }
}

// ---------------------------------------------------------------------------
// MurmurHash
// ---------------------------------------------------------------------------

/// MurmurHash2, 64-bit variant, with a per-instance random seed
///
/// Follows the published 64-bit MurmurHash2 (Austin Appleby): 8-byte
/// little-endian blocks, multiply/shift scrambling, and a three-step
/// finalizer.
#[derive(Clone, Debug)]
pub struct MurmurHash {
    seed: u64,
}

impl MurmurHash {
    const MUL: u64 = 0xc6a4a793_5bd1e995;
    const SHIFT: u32 = 47;

    /// Build an instance with an explicit seed
    pub const fn with_seed(seed: u64) -> Self {
        Self { seed }
    }
}

impl FlowHasher for MurmurHash {
    fn hash(&self, data: &[u8]) -> u64 {
        let m = Self::MUL;
        let r = Self::SHIFT;
        let mut h = self.seed ^ (data.len() as u64).wrapping_mul(m);

        let mut chunks = data.chunks_exact(8);
        for chunk in chunks.by_ref() {
            let mut k = u64::from_le_bytes(chunk.try_into().expect("8-byte chunk"));
            k = k.wrapping_mul(m);
            k ^= k >> r;
            k = k.wrapping_mul(m);
            h ^= k;
            h = h.wrapping_mul(m);
        }

        let tail = chunks.remainder();
        if !tail.is_empty() {
            for (i, &b) in tail.iter().enumerate() {
                h ^= u64::from(b) << (8 * i);
            }
            h = h.wrapping_mul(m);
        }

        h ^= h >> r;
        h = h.wrapping_mul(m);
        h ^= h >> r;
        h
    }
}

impl SeededHasher for MurmurHash {
    fn from_rng<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self { seed: rng.random() }
    }
}

// ---------------------------------------------------------------------------
// BobHash
// ---------------------------------------------------------------------------

static SMALL_PRIMES: OnceLock<Vec<u32>> = OnceLock::new();

/// Primes below 10000, used as per-instance salts for [`BobHash`]
fn small_primes() -> &'static [u32] {
    SMALL_PRIMES.get_or_init(|| {
        let limit = 10_000usize;
        let mut sieve = vec![true; limit];
        sieve[0] = false;
        sieve[1] = false;
        let mut i = 2;
        while i * i < limit {
            if sieve[i] {
                let mut j = i * i;
                while j < limit {
                    sieve[j] = false;
                    j += i;
                }
            }
            i += 1;
        }
        (0..limit).filter(|&n| sieve[n]).map(|n| n as u32).collect()
    })
}

/// Bob Jenkins' 32-bit lookup hash over 12-byte blocks, widened to 64 bits
///
/// Per-instance state is a prime salt in place of the "previous hash value"
/// of the original formulation.
#[derive(Clone, Debug)]
pub struct BobHash {
    salt: u32,
}

impl BobHash {
    const GOLDEN_RATIO: u32 = 0x9e3779b9;

    /// Build an instance with an explicit salt
    pub const fn with_salt(salt: u32) -> Self {
        Self { salt }
    }

    /// Jenkins' reversible three-word mix
    fn mix(mut a: u32, mut b: u32, mut c: u32) -> u32 {
        a = a.wrapping_sub(b).wrapping_sub(c) ^ (c >> 13);
        b = b.wrapping_sub(c).wrapping_sub(a) ^ (a << 8);
        c = c.wrapping_sub(a).wrapping_sub(b) ^ (b >> 13);
        a = a.wrapping_sub(b).wrapping_sub(c) ^ (c >> 12);
        b = b.wrapping_sub(c).wrapping_sub(a) ^ (a << 16);
        c = c.wrapping_sub(a).wrapping_sub(b) ^ (b >> 5);
        a = a.wrapping_sub(b).wrapping_sub(c) ^ (c >> 3);
        b = b.wrapping_sub(c).wrapping_sub(a) ^ (a << 10);
        c = c.wrapping_sub(a).wrapping_sub(b) ^ (b >> 15);
        c
    }
}

impl FlowHasher for BobHash {
    fn hash(&self, data: &[u8]) -> u64 {
        let word = |s: &[u8]| {
            u32::from(s[0])
                | (u32::from(s[1]) << 8)
                | (u32::from(s[2]) << 16)
                | (u32::from(s[3]) << 24)
        };

        let mut a = Self::GOLDEN_RATIO;
        let mut b = Self::GOLDEN_RATIO;
        let mut c = self.salt;

        let mut rest = data;
        while rest.len() >= 12 {
            a = a.wrapping_add(word(&rest[0..4]));
            b = b.wrapping_add(word(&rest[4..8]));
            c = c.wrapping_add(word(&rest[8..12]));
            c = Self::mix(a, b, c);
            rest = &rest[12..];
        }

        c = c.wrapping_add(rest.len() as u32);
        for (i, &byte) in rest.iter().enumerate() {
            let v = u32::from(byte);
            match i {
                // first byte of c is reserved for the length
                0..=3 => a = a.wrapping_add(v << (8 * i)),
                4..=7 => b = b.wrapping_add(v << (8 * (i - 4))),
                _ => c = c.wrapping_add(v << (8 * (i - 7))),
            }
        }
        u64::from(Self::mix(a, b, c))
    }
}

impl SeededHasher for BobHash {
    fn from_rng<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let primes = small_primes();
        Self {
            salt: primes[rng.random_range(0..primes.len())],
        }
    }
}

// ---------------------------------------------------------------------------
// DjbHash
// ---------------------------------------------------------------------------

/// Deterministic djb2 hash (`h = h * 33 + byte`, starting from 5381)
///
/// Carries no per-instance state, so a family of `DjbHash` degenerates to a
/// single function. Useful as a fixed reference hash, never as a family
/// member.
#[derive(Clone, Copy, Debug, Default)]
pub struct DjbHash;

impl FlowHasher for DjbHash {
    fn hash(&self, data: &[u8]) -> u64 {
        let mut hash: u64 = 5381;
        for &b in data {
            hash = (hash << 5).wrapping_add(hash).wrapping_add(u64::from(b));
        }
        hash
    }
}

impl SeededHasher for DjbHash {
    fn from_rng<R: Rng + ?Sized>(_rng: &mut R) -> Self {
        DjbHash
    }
}

// ---------------------------------------------------------------------------
// CrcHash
// ---------------------------------------------------------------------------

/// The nine CRC-32 variants of the bank, selectable by id 0..=8
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CrcVariant {
    /// CRC-32 (IEEE 802.3, reflected)
    Crc32,
    /// CRC-32C (Castagnoli, reflected)
    Crc32C,
    /// CRC-32D (reflected)
    Crc32D,
    /// CRC-32Q (aviation, unreflected)
    Crc32Q,
    /// CRC-32/BZIP2 (unreflected)
    Bzip2,
    /// CRC-32/MPEG-2 (unreflected, no final XOR)
    Mpeg2,
    /// CRC-32/POSIX (cksum, unreflected)
    Posix,
    /// CRC-32/XFER (unreflected, polynomial 0xAF)
    Xfer,
    /// JAMCRC (reflected, no final XOR)
    JamCrc,
}

impl CrcVariant {
    /// All variants, indexed by their bank id
    const BANK: [CrcVariant; 9] = [
        CrcVariant::Crc32,
        CrcVariant::Crc32C,
        CrcVariant::Crc32D,
        CrcVariant::Crc32Q,
        CrcVariant::Bzip2,
        CrcVariant::Mpeg2,
        CrcVariant::Posix,
        CrcVariant::Xfer,
        CrcVariant::JamCrc,
    ];

    /// `(polynomial, initial value, reflected, final XOR)`
    fn params(self) -> (u32, u32, bool, u32) {
        match self {
            CrcVariant::Crc32 => (0x04C11DB7, 0xFFFFFFFF, true, 0xFFFFFFFF),
            CrcVariant::Crc32C => (0x1EDC6F41, 0xFFFFFFFF, true, 0xFFFFFFFF),
            CrcVariant::Crc32D => (0xA833982B, 0xFFFFFFFF, true, 0xFFFFFFFF),
            CrcVariant::Crc32Q => (0x814141AB, 0x00000000, false, 0x00000000),
            CrcVariant::Bzip2 => (0x04C11DB7, 0xFFFFFFFF, false, 0xFFFFFFFF),
            CrcVariant::Mpeg2 => (0x04C11DB7, 0xFFFFFFFF, false, 0x00000000),
            CrcVariant::Posix => (0x04C11DB7, 0x00000000, false, 0xFFFFFFFF),
            CrcVariant::Xfer => (0x000000AF, 0x00000000, false, 0x00000000),
            CrcVariant::JamCrc => (0x04C11DB7, 0xFFFFFFFF, true, 0x00000000),
        }
    }
}

/// Bank of nine CRC-32 functions distinguished by polynomial, initial value,
/// reflection, and final XOR
///
/// The 256-entry lookup table is built once at construction. CRC output is
/// 32 bits, widened to `u64`.
#[derive(Clone)]
pub struct CrcHash {
    variant: CrcVariant,
    init: u32,
    reflected: bool,
    xorout: u32,
    table: [u32; 256],
}

impl CrcHash {
    /// Select a bank member by id
    ///
    /// # Errors
    /// Returns [`SketchError::InvalidCapacity`](crate::SketchError) for ids
    /// outside `0..=8`.
    pub fn new(hashid: u32) -> Result<Self> {
        let variant = CrcVariant::BANK
            .get(hashid as usize)
            .copied()
            .ok_or_else(|| invalid_capacity("hashid", hashid, "must be in 0..=8"))?;
        Ok(Self::with_variant(variant))
    }

    /// Build a bank member directly from its variant
    pub fn with_variant(variant: CrcVariant) -> Self {
        let (poly, init, reflected, xorout) = variant.params();
        let mut table = [0u32; 256];
        if reflected {
            let poly = poly.reverse_bits();
            for (i, slot) in table.iter_mut().enumerate() {
                let mut crc = i as u32;
                for _ in 0..8 {
                    crc = if crc & 1 == 1 { (crc >> 1) ^ poly } else { crc >> 1 };
                }
                *slot = crc;
            }
        } else {
            for (i, slot) in table.iter_mut().enumerate() {
                let mut crc = (i as u32) << 24;
                for _ in 0..8 {
                    crc = if crc & 0x8000_0000 != 0 {
                        (crc << 1) ^ poly
                    } else {
                        crc << 1
                    };
                }
                *slot = crc;
            }
        }
        Self {
            variant,
            init,
            reflected,
            xorout,
            table,
        }
    }

    /// The bank member this instance computes
    pub fn variant(&self) -> CrcVariant {
        self.variant
    }
}

impl std::fmt::Debug for CrcHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrcHash")
            .field("variant", &self.variant)
            .finish()
    }
}

impl FlowHasher for CrcHash {
    fn hash(&self, data: &[u8]) -> u64 {
        let mut crc = self.init;
        if self.reflected {
            for &b in data {
                crc = (crc >> 8) ^ self.table[((crc ^ u32::from(b)) & 0xFF) as usize];
            }
        } else {
            for &b in data {
                crc = (crc << 8) ^ self.table[(((crc >> 24) ^ u32::from(b)) & 0xFF) as usize];
            }
        }
        u64::from(crc ^ self.xorout)
    }
}

// ---------------------------------------------------------------------------
// HashFamily
// ---------------------------------------------------------------------------

/// Family of `k` independently seeded hash functions
///
/// Per-instance random state keeps the members probabilistically independent;
/// the family constructor is the only way to build one, so sketches cannot
/// accidentally reuse a seed across rows.
#[derive(Clone, Debug)]
pub struct HashFamily<H> {
    fns: Vec<H>,
}

impl<H: SeededHasher> HashFamily<H> {
    /// Draw `k` members from the process-wide seeding PRNG
    ///
    /// # Errors
    /// Returns `InvalidCapacity` when `k == 0`.
    pub fn new(k: usize) -> Result<Self> {
        with_process_rng(|rng| Self::with_rng(k, rng))
    }

    /// Draw `k` members from a caller-provided PRNG
    ///
    /// # Errors
    /// Returns `InvalidCapacity` when `k == 0`.
    pub fn with_rng<R: Rng + ?Sized>(k: usize, rng: &mut R) -> Result<Self> {
        if k == 0 {
            return Err(invalid_capacity("num_hash", k, "must be > 0"));
        }
        Ok(Self {
            fns: (0..k).map(|_| H::from_rng(rng)).collect(),
        })
    }
}

impl<H> HashFamily<H> {
    /// Number of members
    pub fn len(&self) -> usize {
        self.fns.len()
    }

    /// True if the family has no members (never the case after construction)
    pub fn is_empty(&self) -> bool {
        self.fns.is_empty()
    }

    /// Iterate over the members in id order
    pub fn iter(&self) -> std::slice::Iter<'_, H> {
        self.fns.iter()
    }

    /// Self-reported memory footprint of the member functions
    pub fn byte_size(&self) -> usize {
        self.fns.len() * std::mem::size_of::<H>()
    }
}

impl<H> Index<usize> for HashFamily<H> {
    type Output = H;

    fn index(&self, i: usize) -> &H {
        &self.fns[i]
    }
}
