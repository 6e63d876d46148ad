//! LMDB storage backend for the Lattis ledger.
//!
//! Implements the `lattis-store` contract using the `heed` LMDB bindings.
//! Each named table maps to one LMDB database inside a single environment;
//! transactions map directly onto LMDB read/write transactions.

pub mod environment;
pub mod error;
pub mod txn;

pub use environment::LmdbStore;
pub use error::LmdbError;
pub use txn::{LmdbReadTxn, LmdbWriteTxn};
