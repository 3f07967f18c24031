//! Decodable sketches: full per-flow maps recovered offline
//!
//! Unlike point-query sketches, these encode enough structure that an
//! offline pass can recover every (key, count) pair: Counter Braids through
//! layered message passing, FlowRadar through XOR singleton peeling. Both
//! decoders are total but may return partial results when the residual graph
//! is not peelable.

mod counter_braids;
mod flow_radar;

pub use counter_braids::{CounterBraids, LayerConfig};
pub use flow_radar::FlowRadar;
