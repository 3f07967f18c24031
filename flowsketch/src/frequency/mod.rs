//! Per-flow frequency estimation sketches

mod conservative_update;
mod count_min;
mod count_sketch;
mod kary;
mod mrac;

pub use conservative_update::ConservativeCountMin;
pub use count_min::CountMinSketch;
pub use count_sketch::CountSketch;
pub use kary::KarySketch;
pub use mrac::Mrac;
