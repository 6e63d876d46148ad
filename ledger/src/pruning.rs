//! Pruning — discard cemented block bodies, keep existence markers.
//!
//! Walks a chain backward deleting bodies and recording hashes in the pruned
//! table, committing every `batch_size` deletions to bound transaction size.
//! Only cemented history is ever eligible. Once a send's body is gone, the
//! owner of its hash can no longer be answered exactly — dependent lookups
//! degrade to the zero account, a defined and accepted loss.

use lattis_store::{ReadTxn, WriteTxn};
use lattis_types::BlockHash;

use crate::error::FatalError;
use crate::ledger::Ledger;

/// Configuration for the pruning loop.
#[derive(Clone, Copy, Debug)]
pub struct PruningConfig {
    /// Whether pruning runs at all.
    pub enabled: bool,
    /// How many blocks below the cemented frontier stay un-pruned.
    pub depth: u64,
    /// Deletions per write-transaction batch.
    pub batch_size: u64,
}

impl Default for PruningConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            depth: 128,
            batch_size: 1024,
        }
    }
}

impl Ledger {
    /// Prune the chain ending at `hash` back toward genesis.
    ///
    /// Stops at genesis or at an already-pruned block; a missing ancestor
    /// that is not pruned means the caller handed in unvalidated history and
    /// is fatal. Returns the number of blocks pruned.
    pub fn pruning_action(
        &self,
        txn: &mut dyn WriteTxn,
        hash: &BlockHash,
        batch_size: u64,
    ) -> Result<u64, FatalError> {
        let mut pruned = 0u64;
        let mut current = *hash;
        let genesis = self.constants().genesis_block.hash();

        while !current.is_zero() && current != genesis {
            if txn.pruned_exists(&current)? {
                break;
            }
            let block = self.get_block(txn.as_read(), &current)?.ok_or_else(|| {
                debug_assert!(false, "pruning walked into a missing block");
                FatalError::MissingBlock(current)
            })?;
            let sideband = block
                .sideband()
                .ok_or(FatalError::MissingSideband(current))?;
            let confirmed = self.confirmation_height(txn.as_read(), &sideband.account)?;
            if sideband.height > confirmed.height {
                tracing::error!(hash = %current, "pruning reached uncemented history");
                return Err(FatalError::PruningUncemented(current));
            }

            txn.del_block(&current)?;
            txn.put_pruned(&current)?;
            self.cache.inc_pruned_count();
            pruned += 1;
            if batch_size > 0 && pruned % batch_size == 0 {
                txn.renew()?;
            }
            current = block.previous();
        }

        if pruned > 0 {
            tracing::debug!(from = %hash, count = pruned, "pruned block bodies");
        }
        Ok(pruned)
    }
}
