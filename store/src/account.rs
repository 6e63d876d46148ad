//! Per-account ledger record.

use lattis_types::{Account, Amount, BlockHash, Epoch, Timestamp};
use serde::{Deserialize, Serialize};

/// The live record of an opened account.
///
/// Exactly one per opened account; deleted when the chain is fully rolled
/// back to empty. Mutated only inside a write transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Hash of the latest block in this account's chain.
    pub head: BlockHash,
    /// Consensus representative the account's balance is delegated to.
    pub representative: Account,
    /// Hash of the first (open) block.
    pub open_block: BlockHash,
    /// Balance after the head block.
    pub balance: Amount,
    /// Wall-clock time of the last modification.
    pub modified: Timestamp,
    /// Number of blocks in this account's chain.
    pub block_count: u64,
    /// Ledger-rule version, upgraded by epoch blocks.
    pub epoch: Epoch,
}
