//! Block-lattice ledger.
//!
//! Each account has its own hash-linked chain of blocks; send/receive pairs
//! link chains into a global DAG. This crate owns the block data model and
//! wire codecs, the validation/apply state machine, rollback, representative
//! weights, the ledger counter cache, network constants and pruning.

pub mod block;
pub mod cache;
pub mod constants;
pub mod error;
pub mod ledger;
pub mod processor;
pub mod pruning;
pub mod rep_weights;
pub mod rollback;
pub mod sideband;

pub use block::{Block, BlockType, ChangeBlock, OpenBlock, ReceiveBlock, SendBlock, StateBlock};
pub use cache::LedgerCache;
pub use constants::{LedgerConstants, DEV_GENESIS_SEED};
pub use error::FatalError;
pub use ledger::Ledger;
pub use processor::{ProcessResult, ProcessReturn, SignatureVerification};
pub use pruning::PruningConfig;
pub use rep_weights::RepWeightCache;
pub use sideband::BlockSideband;
