//! Heavy-hitter detection sketches
//!
//! Four takes on the same problem with different trade-offs: deterministic
//! guarantees (Misra-Gries), strict overestimates (Space-Saving), pipelined
//! tables for line-rate hardware (HashPipe), and epoch-based sweeping
//! (Lossy Counting).

mod hash_pipe;
mod lossy_count;
mod misra_gries;
mod space_saving;

pub use hash_pipe::HashPipe;
pub use lossy_count::LossyCount;
pub use misra_gries::MisraGries;
pub use space_saving::SpaceSaving;
