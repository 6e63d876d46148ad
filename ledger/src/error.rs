//! Fatal invariant violations.
//!
//! Ordinary validation failures are `ProcessResult` codes, returned as
//! values. The variants here are different in kind: each one means the
//! single-writer or validate-then-write discipline was broken somewhere, and
//! continuing would persist incorrect state. Call sites `debug_assert!`
//! before constructing one, so debug builds abort at the violation site.

use lattis_store::StoreError;
use lattis_types::{Account, BlockHash};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FatalError {
    #[error("block {0} expected to exist is missing from storage")]
    MissingBlock(BlockHash),

    #[error("account record for {0} expected to exist is missing")]
    MissingAccount(Account),

    #[error("block {0} reached a write path without a sideband")]
    MissingSideband(BlockHash),

    #[error(
        "rollback of block {hash} at height {height} would cross confirmation height {confirmed}"
    )]
    RollbackPastConfirmation {
        hash: BlockHash,
        height: u64,
        confirmed: u64,
    },

    #[error("pruning reached uncemented block {0}")]
    PruningUncemented(BlockHash),

    #[error("storage fault during a write: {0}")]
    Store(#[from] StoreError),
}
