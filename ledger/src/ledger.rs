//! The ledger — owns validation/apply, rollback, balance and weight queries,
//! and receivable bookkeeping. Depends only on the storage contract.

use std::sync::{Arc, RwLock};

use lattis_store::{
    AccountInfo, ConfirmationHeightInfo, ReadTxn, Store, StoreError, WriteTxn,
};
use lattis_types::{Account, Amount, BlockHash, Link, Timestamp};

use crate::block::{Block, BlockType};
use crate::cache::LedgerCache;
use crate::constants::LedgerConstants;
use crate::error::FatalError;
use crate::processor::{self, ProcessReturn, SignatureVerification};
use crate::rep_weights::RepWeightCache;
use crate::rollback;
use crate::sideband::{legacy_details, BlockSideband};

/// Current storage schema version.
const STORE_VERSION: u64 = 1;

/// The accounting core: validates and applies blocks, undoes them above the
/// confirmation height, and answers balance/weight/receivable queries.
pub struct Ledger {
    store: Arc<dyn Store>,
    pub cache: LedgerCache,
    rep_weights: RwLock<RepWeightCache>,
    constants: LedgerConstants,
}

impl Ledger {
    /// Open a ledger over a storage backend, seeding genesis on first run
    /// and rebuilding the in-memory caches by full scan.
    ///
    /// Runs before any worker threads exist, so it writes without the write
    /// queue.
    pub fn new(store: Arc<dyn Store>, constants: LedgerConstants) -> Result<Self, StoreError> {
        {
            let mut txn = store.begin_write()?;
            if txn.block_count()? == 0 {
                seed_genesis(&mut *txn, &constants)?;
                txn.commit()?;
            }
        }

        let (cache, rep_weights) = {
            let txn = store.begin_read()?;
            let cache = LedgerCache::load(&*txn)?;
            let mut weights = RepWeightCache::new();
            weights.rebuild(
                txn.iter_accounts()?
                    .into_iter()
                    .map(|(_, info)| (info.representative, info.balance)),
            );
            (cache, weights)
        };

        Ok(Self {
            store,
            cache,
            rep_weights: RwLock::new(rep_weights),
            constants,
        })
    }

    pub fn store(&self) -> &dyn Store {
        &*self.store
    }

    pub fn constants(&self) -> &LedgerConstants {
        &self.constants
    }

    // ── state machine ───────────────────────────────────────────────────

    /// Validate and apply one block. Validation failures come back as
    /// [`crate::processor::ProcessResult`] codes; `Err` means an invariant
    /// was violated mid-write and nothing further may be trusted.
    pub fn process(
        &self,
        txn: &mut dyn WriteTxn,
        block: &mut Block,
        verification: SignatureVerification,
    ) -> Result<ProcessReturn, FatalError> {
        processor::process(self, txn, block, verification)
    }

    /// Undo `hash` and every block that causally depends on it, in
    /// dependency order. Touching a cemented block is fatal.
    pub fn rollback(
        &self,
        txn: &mut dyn WriteTxn,
        hash: &BlockHash,
    ) -> Result<Vec<Block>, FatalError> {
        rollback::rollback(self, txn, hash)
    }

    // ── block access ────────────────────────────────────────────────────

    pub fn get_block(
        &self,
        txn: &dyn ReadTxn,
        hash: &BlockHash,
    ) -> Result<Option<Block>, StoreError> {
        match txn.get_block(hash)? {
            Some(bytes) => Ok(Some(Block::from_storage_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Whether the block exists at all — with a body, or pruned down to its
    /// existence marker.
    pub fn block_or_pruned_exists(
        &self,
        txn: &dyn ReadTxn,
        hash: &BlockHash,
    ) -> Result<bool, StoreError> {
        Ok(txn.pruned_exists(hash)? || txn.block_exists(hash)?)
    }

    /// Resulting balance of the block at `hash`.
    pub fn balance(
        &self,
        txn: &dyn ReadTxn,
        hash: &BlockHash,
    ) -> Result<Option<Amount>, StoreError> {
        Ok(self.get_block(txn, hash)?.and_then(|block| block.balance()))
    }

    /// The account owning `hash`. `None` when the block is unknown or its
    /// body was pruned — callers needing a value fall back to the zero
    /// account, a deliberate precision loss.
    pub fn account(
        &self,
        txn: &dyn ReadTxn,
        hash: &BlockHash,
    ) -> Result<Option<Account>, StoreError> {
        Ok(self.get_block(txn, hash)?.and_then(|block| block.account()))
    }

    /// Head block of an account's chain.
    pub fn latest(
        &self,
        txn: &dyn ReadTxn,
        account: &Account,
    ) -> Result<Option<BlockHash>, StoreError> {
        Ok(txn.get_account(account)?.map(|info| info.head))
    }

    pub fn account_balance(
        &self,
        txn: &dyn ReadTxn,
        account: &Account,
    ) -> Result<Amount, StoreError> {
        Ok(txn
            .get_account(account)?
            .map(|info| info.balance)
            .unwrap_or(Amount::ZERO))
    }

    // ── confirmation ────────────────────────────────────────────────────

    /// Confirmation height record, zero if the account has never cemented.
    pub fn confirmation_height(
        &self,
        txn: &dyn ReadTxn,
        account: &Account,
    ) -> Result<ConfirmationHeightInfo, StoreError> {
        Ok(txn.get_confirmation_height(account)?.unwrap_or_default())
    }

    /// Whether a block is at or below its account's confirmation height.
    /// Pruned blocks are always confirmed — only cemented history is pruned.
    pub fn block_confirmed(
        &self,
        txn: &dyn ReadTxn,
        hash: &BlockHash,
    ) -> Result<bool, StoreError> {
        if txn.pruned_exists(hash)? {
            return Ok(true);
        }
        let Some(block) = self.get_block(txn, hash)? else {
            return Ok(false);
        };
        let Some(sideband) = block.sideband() else {
            return Ok(false);
        };
        let confirmed = self.confirmation_height(txn, &sideband.account)?;
        Ok(sideband.height <= confirmed.height)
    }

    // ── dependencies ────────────────────────────────────────────────────

    /// The 0–2 blocks this block causally requires: its previous, and its
    /// link-as-source for receiving blocks.
    pub fn dependent_blocks(
        &self,
        txn: &dyn ReadTxn,
        block: &Block,
    ) -> Result<Vec<BlockHash>, StoreError> {
        let mut deps = Vec::with_capacity(2);
        let previous = block.previous();
        if !previous.is_zero() {
            deps.push(previous);
        }
        match block {
            Block::Receive(b) => deps.push(b.source),
            Block::Open(b) => deps.push(b.source),
            Block::State(b) => {
                if !b.link.is_zero() && !self.is_epoch_link(&b.link) {
                    let is_send = match block.sideband() {
                        Some(sideband) => sideband.details.is_send,
                        None => match self.balance(txn, &b.previous)? {
                            Some(previous_balance) => b.balance < previous_balance,
                            None => false,
                        },
                    };
                    if !is_send {
                        deps.push(b.link.as_block_hash());
                    }
                }
            }
            Block::Send(_) | Block::Change(_) => {}
        }
        Ok(deps)
    }

    /// All dependencies exist (possibly pruned).
    pub fn could_fit(&self, txn: &dyn ReadTxn, block: &Block) -> Result<bool, StoreError> {
        for hash in self.dependent_blocks(txn, block)? {
            if !self.block_or_pruned_exists(txn, &hash)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// All dependencies are cemented.
    pub fn dependents_confirmed(
        &self,
        txn: &dyn ReadTxn,
        block: &Block,
    ) -> Result<bool, StoreError> {
        for hash in self.dependent_blocks(txn, block)? {
            if !self.block_confirmed(txn, &hash)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    // ── receivable ──────────────────────────────────────────────────────

    /// Sum of pending entries for an account, optionally restricted to
    /// entries whose send is already cemented.
    pub fn account_receivable(
        &self,
        txn: &dyn ReadTxn,
        account: &Account,
        only_confirmed: bool,
    ) -> Result<Amount, StoreError> {
        let mut total = Amount::ZERO;
        for (key, info) in txn.iter_pending(account)? {
            if only_confirmed && !self.block_confirmed(txn, &key.send_hash)? {
                continue;
            }
            total = total.saturating_add(info.amount);
        }
        Ok(total)
    }

    // ── weights ─────────────────────────────────────────────────────────

    /// Voting weight of a representative. While fewer blocks have been
    /// processed than the bootstrap cutoff, published bootstrap weights
    /// stand in for locally computed ones.
    pub fn weight(&self, representative: &Account) -> Amount {
        if self.cache.block_count() < self.constants.bootstrap_weight_max_blocks {
            if let Some(weight) = self.constants.bootstrap_weights.get(representative) {
                return *weight;
            }
        }
        self.weight_exact(representative)
    }

    /// Locally computed weight, ignoring bootstrap overrides.
    pub fn weight_exact(&self, representative: &Account) -> Amount {
        self.rep_weights
            .read()
            .expect("rep weight lock poisoned")
            .weight(representative)
    }

    pub fn total_weight(&self) -> Amount {
        self.rep_weights
            .read()
            .expect("rep weight lock poisoned")
            .total_weight()
    }

    pub(crate) fn weight_add(
        &self,
        txn: &mut dyn WriteTxn,
        representative: &Account,
        amount: Amount,
    ) -> Result<(), StoreError> {
        let mut weights = self.rep_weights.write().expect("rep weight lock poisoned");
        weights.add_weight(representative, amount);
        let updated = weights.weight(representative);
        txn.put_rep_weight(representative, updated)
    }

    pub(crate) fn weight_sub(
        &self,
        txn: &mut dyn WriteTxn,
        representative: &Account,
        amount: Amount,
    ) -> Result<(), StoreError> {
        let mut weights = self.rep_weights.write().expect("rep weight lock poisoned");
        weights.remove_weight(representative, amount);
        let updated = weights.weight(representative);
        if updated.is_zero() {
            txn.del_rep_weight(representative)
        } else {
            txn.put_rep_weight(representative, updated)
        }
    }

    // ── epochs ──────────────────────────────────────────────────────────

    pub fn is_epoch_link(&self, link: &Link) -> bool {
        self.constants.epochs.is_epoch_link(link)
    }

    // ── write helpers (processor/rollback internals) ────────────────────

    /// Store a block (sideband required) and attach it as its predecessor's
    /// successor.
    pub(crate) fn write_block(
        &self,
        txn: &mut dyn WriteTxn,
        block: &Block,
    ) -> Result<(), FatalError> {
        let bytes = block.to_storage_bytes().ok_or_else(|| {
            debug_assert!(false, "block stored without sideband");
            FatalError::MissingSideband(block.hash())
        })?;
        txn.put_block(&block.hash(), &bytes)?;
        let previous = block.previous();
        if !previous.is_zero() {
            self.write_successor(txn, &previous, block.hash())?;
        }
        Ok(())
    }

    /// Rewrite a stored block's sideband successor pointer.
    pub(crate) fn write_successor(
        &self,
        txn: &mut dyn WriteTxn,
        hash: &BlockHash,
        successor: BlockHash,
    ) -> Result<(), FatalError> {
        let mut block = self.get_block(txn.as_read(), hash)?.ok_or_else(|| {
            debug_assert!(false, "successor target missing");
            FatalError::MissingBlock(*hash)
        })?;
        let mut sideband = *block
            .sideband()
            .ok_or(FatalError::MissingSideband(*hash))?;
        sideband.successor = successor;
        block.set_sideband(sideband);
        let bytes = block
            .to_storage_bytes()
            .ok_or(FatalError::MissingSideband(*hash))?;
        txn.put_block(hash, &bytes)?;
        Ok(())
    }

    /// Persist an account transition, maintaining the account counter.
    /// A zero head means the chain emptied; the record is deleted.
    pub(crate) fn update_account(
        &self,
        txn: &mut dyn WriteTxn,
        account: &Account,
        old_info: &AccountInfo,
        new_info: &AccountInfo,
    ) -> Result<(), StoreError> {
        if !new_info.head.is_zero() {
            let mut record = new_info.clone();
            record.modified = Timestamp::now();
            txn.put_account(account, &record)?;
            if old_info.head.is_zero() {
                self.cache.inc_account_count();
            }
        } else {
            txn.del_account(account)?;
            self.cache.dec_account_count();
        }
        Ok(())
    }

    /// The representative in effect at `hash`: walks back to the nearest
    /// block that declares one (legacy sends/receives do not).
    pub(crate) fn representative_of(
        &self,
        txn: &dyn ReadTxn,
        hash: &BlockHash,
    ) -> Result<Account, FatalError> {
        let mut current = *hash;
        loop {
            let block = self.get_block(txn, &current)?.ok_or_else(|| {
                debug_assert!(false, "representative walk hit missing block");
                FatalError::MissingBlock(current)
            })?;
            if let Some(representative) = block.representative_field() {
                return Ok(representative);
            }
            current = block.previous();
        }
    }
}

fn seed_genesis(txn: &mut dyn WriteTxn, constants: &LedgerConstants) -> Result<(), StoreError> {
    let mut genesis = constants.genesis_block.clone();
    let hash = genesis.hash();
    genesis.set_sideband(BlockSideband::new(
        constants.genesis_account,
        BlockHash::ZERO,
        constants.genesis_amount,
        1,
        Timestamp::now(),
        legacy_details(BlockType::Open),
        lattis_types::Epoch::Epoch0,
    ));
    let bytes = genesis
        .to_storage_bytes()
        .expect("genesis sideband just attached");
    txn.put_block(&hash, &bytes)?;

    let info = AccountInfo {
        head: hash,
        representative: constants.genesis_account,
        open_block: hash,
        balance: constants.genesis_amount,
        modified: Timestamp::now(),
        block_count: 1,
        epoch: lattis_types::Epoch::Epoch0,
    };
    txn.put_account(&constants.genesis_account, &info)?;
    // Genesis is born cemented.
    txn.put_confirmation_height(
        &constants.genesis_account,
        &ConfirmationHeightInfo::new(1, hash),
    )?;
    txn.put_frontier(&hash, &constants.genesis_account)?;
    txn.put_rep_weight(&constants.genesis_account, constants.genesis_amount)?;
    txn.put_version(STORE_VERSION)?;
    tracing::info!(genesis = %hash, "seeded empty ledger");
    Ok(())
}
