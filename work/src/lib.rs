//! Anti-spam proof-of-work.
//!
//! Not mining — a lightweight computational cost that makes flooding the
//! network prohibitively expensive while keeping legitimate use free. Each
//! block carries a nonce whose difficulty against the block's root must clear
//! a threshold chosen from the block's resulting details (epoch, direction).

pub mod difficulty;
pub mod generator;
pub mod thresholds;

pub use difficulty::work_difficulty;
pub use generator::generate_work;
pub use thresholds::WorkThresholds;
