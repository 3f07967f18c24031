//! Shared machinery: flow keys, hash families, counter tables, errors

mod counter;
mod error;
mod flow_key;
pub mod hash;
pub mod table;
mod traits;
pub mod util;

pub use counter::{Counter, SignedCounter};
pub use error::{Result, SketchError};
pub use flow_key::FlowKey;
pub use hash::{
    seed_entropy, AwareHash, BobHash, CrcHash, CrcVariant, DjbHash, FlowHasher, HashFamily,
    MurmurHash, SeededHasher,
};
pub use traits::{KeyedSketch, Sketch};

pub(crate) use error::invalid_capacity;
pub(crate) use hash::with_process_rng;
