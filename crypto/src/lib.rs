//! Cryptographic primitives for the Lattis ledger.
//!
//! - **Ed25519** for block signing and signature verification
//! - **Blake2b-256** for content addressing (block hashes) and work difficulty

pub mod hash;
pub mod keys;
pub mod sign;

pub use hash::{blake2b_256, blake2b_256_multi};
pub use keys::{generate_keypair, keypair_from_private, keypair_from_seed, public_from_private};
pub use sign::{sign_message, verify_signature};
