//! Fundamental types for the Lattis ledger.
//!
//! This crate defines the core value types shared across every other crate in
//! the workspace: accounts, hashes, amounts, keys, epochs and timestamps.

pub mod account;
pub mod amount;
pub mod epoch;
pub mod hash;
pub mod keys;
pub mod network;
pub mod time;

pub use account::Account;
pub use amount::Amount;
pub use epoch::{BlockDetails, Epoch, Epochs};
pub use hash::{BlockHash, Link, Root};
pub use keys::{KeyPair, PrivateKey, PublicKey, Signature};
pub use network::NetworkId;
pub use time::Timestamp;
