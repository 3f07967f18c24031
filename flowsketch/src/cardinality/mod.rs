//! Distinct-count (cardinality) sketches

mod flajolet_martin;
mod hyperloglog;

pub use flajolet_martin::FlajoletMartin;
pub use hyperloglog::HyperLogLog;
