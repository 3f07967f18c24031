//! flowsketch: streaming traffic sketches for network telemetry
//!
//! Compact, sublinear summaries of keyed update streams `(flow_key, value)`:
//! per-flow frequency, set membership, cardinality, heavy hitters, heavy
//! changers, flow-size distributions, and fully decodable flow sets, all
//! under fixed memory budgets chosen at construction.
//!
//! Sketches share one machinery: fixed-width [`FlowKey`]s, families of
//! independently seeded universal hashes, and contiguous counter tables that
//! `clear` re-zeros without reallocating. A sketch instance belongs to a
//! single producer; shard per thread for multi-producer deployments.
//!
//! # Example
//! ```
//! use flowsketch::frequency::CountMinSketch;
//! use flowsketch::{AwareHash, FlowKey, KeyedSketch};
//!
//! let mut cm = CountMinSketch::<u32, AwareHash>::new(4, 1024).unwrap();
//! let flow =
//!     FlowKey::<13>::try_from_slice(&[10, 0, 0, 1, 10, 0, 0, 2, 6, 0x1f, 0x90, 0xd4, 0x31])
//!         .unwrap();
//! cm.update(&flow, 1500);
//! assert!(cm.query(&flow) >= 1500);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cardinality;
pub mod common;
pub mod composite;
pub mod decodable;
pub mod frequency;
pub mod heavy_hitters;
pub mod membership;
pub mod reversible;

// Re-export the shared machinery at the crate root
pub use common::{
    seed_entropy, AwareHash, BobHash, Counter, CrcHash, CrcVariant, DjbHash, FlowHasher, FlowKey,
    HashFamily, KeyedSketch, MurmurHash, Result, SeededHasher, SignedCounter, Sketch, SketchError,
};

// Re-export the sketch catalog for convenience
pub use cardinality::{FlajoletMartin, HyperLogLog};
pub use composite::{ElasticSketch, NitroSketch, TwoLevel, TwoLevelConfig};
pub use decodable::{CounterBraids, FlowRadar, LayerConfig};
pub use frequency::{ConservativeCountMin, CountMinSketch, CountSketch, KarySketch, Mrac};
pub use heavy_hitters::{HashPipe, LossyCount, MisraGries, SpaceSaving};
pub use membership::{BloomFilter, CountingBloomFilter};
pub use reversible::{Bounds, Deltoid, FastSketch, LDSketch, MVSketch};
