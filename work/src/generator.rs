//! Work generation for tests and the dev network.
//!
//! A plain sequential nonce search. Production-grade generation (GPU, work
//! servers, precompute queues) lives outside this crate; dev thresholds are
//! low enough that this loop finds a nonce in a few hundred attempts.

use crate::difficulty::work_difficulty;
use lattis_types::Root;

/// Find the lowest nonce at or above `start` whose difficulty against `root`
/// clears `threshold`. Deterministic for a given (root, start, threshold).
pub fn generate_work(root: &Root, threshold: u64, start: u64) -> u64 {
    let mut nonce = start;
    loop {
        if work_difficulty(root, nonce) >= threshold {
            return nonce;
        }
        nonce = nonce.wrapping_add(1);
    }
}
