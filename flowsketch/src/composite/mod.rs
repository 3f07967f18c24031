//! Composite sketches built from the simpler parts
//!
//! Composition happens at construction: Elastic embeds a Count-Min light
//! part, NitroSketch wraps a CountSketch table in a sampling cursor, and the
//! two-level detector stacks Bloom filters under a reservoir.

mod elastic;
mod nitro;
mod two_level;

pub use elastic::ElasticSketch;
pub use nitro::NitroSketch;
pub use two_level::{TwoLevel, TwoLevelConfig};
