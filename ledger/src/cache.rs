//! In-memory atomic counters for frequently-queried ledger statistics.
//!
//! Avoids repeated storage reads for values requested on every status query.
//! Seeded by a full scan at startup and kept in sync by every mutation;
//! mutations happen only inside an active write transaction.

use std::sync::atomic::{AtomicU64, Ordering};

use lattis_store::{ReadTxn, StoreError};

/// Atomic cache of ledger counters.
pub struct LedgerCache {
    block_count: AtomicU64,
    account_count: AtomicU64,
    cemented_count: AtomicU64,
    pruned_count: AtomicU64,
}

impl LedgerCache {
    pub fn new(
        block_count: u64,
        account_count: u64,
        cemented_count: u64,
        pruned_count: u64,
    ) -> Self {
        Self {
            block_count: AtomicU64::new(block_count),
            account_count: AtomicU64::new(account_count),
            cemented_count: AtomicU64::new(cemented_count),
            pruned_count: AtomicU64::new(pruned_count),
        }
    }

    /// Rebuild all counters by scanning storage.
    pub fn load(txn: &dyn ReadTxn) -> Result<Self, StoreError> {
        Ok(Self::new(
            // Pruned blocks keep counting toward the chain totals; only
            // their bodies are gone.
            txn.block_count()? + txn.pruned_count()?,
            txn.account_count()?,
            txn.cemented_count()?,
            txn.pruned_count()?,
        ))
    }

    pub fn block_count(&self) -> u64 {
        self.block_count.load(Ordering::Relaxed)
    }

    pub fn account_count(&self) -> u64 {
        self.account_count.load(Ordering::Relaxed)
    }

    pub fn cemented_count(&self) -> u64 {
        self.cemented_count.load(Ordering::Relaxed)
    }

    pub fn pruned_count(&self) -> u64 {
        self.pruned_count.load(Ordering::Relaxed)
    }

    pub fn inc_block_count(&self) {
        self.block_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_block_count(&self) {
        self.block_count.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn inc_account_count(&self) {
        self.account_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_account_count(&self) {
        self.account_count.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn add_cemented(&self, count: u64) {
        self.cemented_count.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_pruned_count(&self) {
        self.pruned_count.fetch_add(1, Ordering::Relaxed);
    }
}
