//! Transaction traits — the table contract every backend implements.
//!
//! Reads are snapshot isolated and may run concurrently with the single
//! active writer. Writers are serialized externally (the node's write queue);
//! this crate only defines what a transaction can do, not who may hold one.

use crate::account::AccountInfo;
use crate::confirmation_height::ConfirmationHeightInfo;
use crate::pending::{PendingInfo, PendingKey};
use crate::StoreError;
use lattis_types::{Account, Amount, BlockHash};

/// A read snapshot over all tables.
pub trait ReadTxn {
    // ── blocks ──────────────────────────────────────────────────────────
    /// Raw stored bytes for a block (type tag + block wire + sideband wire).
    fn get_block(&self, hash: &BlockHash) -> Result<Option<Vec<u8>>, StoreError>;
    fn block_exists(&self, hash: &BlockHash) -> Result<bool, StoreError>;
    fn block_count(&self) -> Result<u64, StoreError>;

    // ── accounts ────────────────────────────────────────────────────────
    fn get_account(&self, account: &Account) -> Result<Option<AccountInfo>, StoreError>;
    fn account_exists(&self, account: &Account) -> Result<bool, StoreError>;
    fn account_count(&self) -> Result<u64, StoreError>;
    /// All account records, account-ordered. Used for startup scans
    /// (rep-weight rebuild, cache seeding).
    fn iter_accounts(&self) -> Result<Vec<(Account, AccountInfo)>, StoreError>;

    // ── pending ─────────────────────────────────────────────────────────
    fn get_pending(&self, key: &PendingKey) -> Result<Option<PendingInfo>, StoreError>;
    /// Whether any pending entry exists for the account — a range probe over
    /// `[key(account, 0), key(account + 1, 0))`.
    fn pending_any(&self, account: &Account) -> Result<bool, StoreError>;
    /// All pending entries for one account, key-ordered.
    fn iter_pending(&self, account: &Account)
        -> Result<Vec<(PendingKey, PendingInfo)>, StoreError>;

    // ── confirmation height ─────────────────────────────────────────────
    fn get_confirmation_height(
        &self,
        account: &Account,
    ) -> Result<Option<ConfirmationHeightInfo>, StoreError>;
    /// Total cemented blocks across all accounts (sum of heights).
    fn cemented_count(&self) -> Result<u64, StoreError>;

    // ── pruned ──────────────────────────────────────────────────────────
    fn pruned_exists(&self, hash: &BlockHash) -> Result<bool, StoreError>;
    fn pruned_count(&self) -> Result<u64, StoreError>;

    // ── frontiers (legacy head hash → account) ──────────────────────────
    fn get_frontier(&self, hash: &BlockHash) -> Result<Option<Account>, StoreError>;

    // ── representative weights ──────────────────────────────────────────
    fn get_rep_weight(&self, representative: &Account) -> Result<Option<Amount>, StoreError>;
    fn iter_rep_weights(&self) -> Result<Vec<(Account, Amount)>, StoreError>;

    // ── online weight samples ───────────────────────────────────────────
    /// Samples in descending timestamp order (newest first), up to `limit`.
    fn get_online_weight_samples(&self, limit: usize) -> Result<Vec<(u64, Amount)>, StoreError>;

    // ── peers ───────────────────────────────────────────────────────────
    fn peer_exists(&self, endpoint: &[u8; 18]) -> Result<bool, StoreError>;
    fn peer_count(&self) -> Result<u64, StoreError>;

    // ── final votes ─────────────────────────────────────────────────────
    fn get_final_vote(&self, root: &[u8; 32]) -> Result<Option<BlockHash>, StoreError>;
    fn final_vote_count(&self) -> Result<u64, StoreError>;

    // ── meta ────────────────────────────────────────────────────────────
    fn get_version(&self) -> Result<Option<u64>, StoreError>;

    /// Drop and reopen the snapshot. Long-running scans call this to avoid
    /// pinning old pages.
    fn renew(&mut self) -> Result<(), StoreError>;
}

/// A write transaction. Sees its own uncommitted writes through the
/// `ReadTxn` supertrait.
pub trait WriteTxn: ReadTxn {
    // ── blocks ──────────────────────────────────────────────────────────
    fn put_block(&mut self, hash: &BlockHash, bytes: &[u8]) -> Result<(), StoreError>;
    fn del_block(&mut self, hash: &BlockHash) -> Result<(), StoreError>;

    // ── accounts ────────────────────────────────────────────────────────
    fn put_account(&mut self, account: &Account, info: &AccountInfo) -> Result<(), StoreError>;
    fn del_account(&mut self, account: &Account) -> Result<(), StoreError>;

    // ── pending ─────────────────────────────────────────────────────────
    fn put_pending(&mut self, key: &PendingKey, info: &PendingInfo) -> Result<(), StoreError>;
    fn del_pending(&mut self, key: &PendingKey) -> Result<(), StoreError>;

    // ── confirmation height ─────────────────────────────────────────────
    fn put_confirmation_height(
        &mut self,
        account: &Account,
        info: &ConfirmationHeightInfo,
    ) -> Result<(), StoreError>;
    fn del_confirmation_height(&mut self, account: &Account) -> Result<(), StoreError>;

    // ── pruned ──────────────────────────────────────────────────────────
    fn put_pruned(&mut self, hash: &BlockHash) -> Result<(), StoreError>;
    fn del_pruned(&mut self, hash: &BlockHash) -> Result<(), StoreError>;

    // ── frontiers ───────────────────────────────────────────────────────
    fn put_frontier(&mut self, hash: &BlockHash, account: &Account) -> Result<(), StoreError>;
    fn del_frontier(&mut self, hash: &BlockHash) -> Result<(), StoreError>;

    // ── representative weights ──────────────────────────────────────────
    fn put_rep_weight(
        &mut self,
        representative: &Account,
        weight: Amount,
    ) -> Result<(), StoreError>;
    fn del_rep_weight(&mut self, representative: &Account) -> Result<(), StoreError>;

    // ── online weight samples ───────────────────────────────────────────
    fn put_online_weight_sample(&mut self, timestamp: u64, weight: Amount)
        -> Result<(), StoreError>;
    fn del_online_weight_sample(&mut self, timestamp: u64) -> Result<(), StoreError>;

    // ── peers ───────────────────────────────────────────────────────────
    fn put_peer(&mut self, endpoint: &[u8; 18]) -> Result<(), StoreError>;
    fn del_peer(&mut self, endpoint: &[u8; 18]) -> Result<(), StoreError>;

    // ── final votes ─────────────────────────────────────────────────────
    fn put_final_vote(&mut self, root: &[u8; 32], hash: &BlockHash) -> Result<(), StoreError>;
    fn del_final_vote(&mut self, root: &[u8; 32]) -> Result<(), StoreError>;

    // ── meta ────────────────────────────────────────────────────────────
    fn put_version(&mut self, version: u64) -> Result<(), StoreError>;

    /// Commit everything written so far. The transaction is finished after
    /// this; use [`ReadTxn::renew`] instead to commit and keep writing.
    fn commit(&mut self) -> Result<(), StoreError>;

    /// View this write transaction as a read snapshot (it sees its own
    /// uncommitted writes).
    fn as_read(&self) -> &dyn ReadTxn;
}

/// A storage backend: ordered tables with transactional snapshots.
pub trait Store: Send + Sync {
    fn begin_read(&self) -> Result<Box<dyn ReadTxn + '_>, StoreError>;
    fn begin_write(&self) -> Result<Box<dyn WriteTxn + '_>, StoreError>;
}
