//! Work difficulty evaluation.
//!
//! The difficulty of a nonce against a root is the first eight bytes
//! (little-endian) of `Blake2b-256(nonce_le ++ root)`. A nonce is valid when
//! its difficulty is at or above the required threshold — higher values are
//! rarer, so a larger threshold means more expected hashing.

use lattis_crypto::blake2b_256_multi;
use lattis_types::Root;

/// Compute the difficulty of a work nonce against a root.
///
/// The root is the previous block hash, or the account for a first block.
pub fn work_difficulty(root: &Root, nonce: u64) -> u64 {
    let digest = blake2b_256_multi(&[&nonce.to_le_bytes(), root.as_bytes()]);
    let mut value = [0u8; 8];
    value.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(value)
}
