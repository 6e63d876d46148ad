//! LMDB transactions implementing the store contract.
//!
//! Read transactions wrap an LMDB snapshot; write transactions wrap the
//! single LMDB write transaction and see their own uncommitted writes.
//! `renew` on a write transaction commits and immediately reopens — the
//! batched-commit primitive cementing and pruning rely on.

use std::ops::Bound;

use heed::RoTxn;

use lattis_store::{
    AccountInfo, ConfirmationHeightInfo, PendingInfo, PendingKey, ReadTxn, StoreError, WriteTxn,
};
use lattis_types::{Account, Amount, BlockHash};

use crate::environment::LmdbStore;
use crate::LmdbError;

/// Upper bound for a pending-entry range scan: the first key of the next
/// account, or `None` when the account is the lexicographic maximum.
fn pending_upper_bound(account: &Account) -> Option<[u8; 64]> {
    let mut next = *account.as_bytes();
    for byte in next.iter_mut().rev() {
        if *byte == 0xFF {
            *byte = 0;
        } else {
            *byte += 1;
            return Some(PendingKey::new(Account::new(next), BlockHash::ZERO).to_bytes());
        }
    }
    None
}

fn decode_account_info(bytes: &[u8]) -> Result<AccountInfo, StoreError> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Corruption(e.to_string()))
}

fn decode_pending_info(bytes: &[u8]) -> Result<PendingInfo, StoreError> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Corruption(e.to_string()))
}

fn decode_amount(bytes: &[u8]) -> Result<Amount, StoreError> {
    let arr: [u8; 16] = bytes
        .try_into()
        .map_err(|_| StoreError::Corruption("amount record is not 16 bytes".into()))?;
    Ok(Amount::from_be_bytes(arr))
}

fn decode_hash(bytes: &[u8]) -> Result<BlockHash, StoreError> {
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| StoreError::Corruption("hash record is not 32 bytes".into()))?;
    Ok(BlockHash::new(arr))
}

fn decode_account(bytes: &[u8]) -> Result<Account, StoreError> {
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| StoreError::Corruption("account record is not 32 bytes".into()))?;
    Ok(Account::new(arr))
}

// ── shared read paths ───────────────────────────────────────────────────
//
// Both transaction types answer reads through these; the write transaction
// passes its own RwTxn (deref-coerced), so it observes uncommitted writes.

fn read_block(store: &LmdbStore, txn: &RoTxn, hash: &BlockHash) -> Result<Option<Vec<u8>>, StoreError> {
    let value = store
        .blocks_db
        .get(txn, hash.as_bytes())
        .map_err(LmdbError::from)?;
    Ok(value.map(|v| v.to_vec()))
}

fn read_account(
    store: &LmdbStore,
    txn: &RoTxn,
    account: &Account,
) -> Result<Option<AccountInfo>, StoreError> {
    let value = store
        .accounts_db
        .get(txn, account.as_bytes())
        .map_err(LmdbError::from)?;
    value.map(decode_account_info).transpose()
}

fn read_pending(
    store: &LmdbStore,
    txn: &RoTxn,
    key: &PendingKey,
) -> Result<Option<PendingInfo>, StoreError> {
    let value = store
        .pending_db
        .get(txn, &key.to_bytes())
        .map_err(LmdbError::from)?;
    value.map(decode_pending_info).transpose()
}

fn read_pending_range(
    store: &LmdbStore,
    txn: &RoTxn,
    account: &Account,
    stop_at_first: bool,
) -> Result<Vec<(PendingKey, PendingInfo)>, StoreError> {
    let lower = PendingKey::new(*account, BlockHash::ZERO).to_bytes();
    let upper = pending_upper_bound(account);
    let bounds: (Bound<&[u8]>, Bound<&[u8]>) = (
        Bound::Included(lower.as_slice()),
        match &upper {
            Some(u) => Bound::Excluded(u.as_slice()),
            None => Bound::Unbounded,
        },
    );

    let iter = store
        .pending_db
        .range(txn, &bounds)
        .map_err(LmdbError::from)?;
    let mut results = Vec::new();
    for entry in iter {
        let (key_bytes, value) = entry.map_err(LmdbError::from)?;
        let key = PendingKey::from_bytes(key_bytes)
            .ok_or_else(|| StoreError::Corruption("pending key is not 64 bytes".into()))?;
        results.push((key, decode_pending_info(value)?));
        if stop_at_first {
            break;
        }
    }
    Ok(results)
}

fn read_confirmation_height(
    store: &LmdbStore,
    txn: &RoTxn,
    account: &Account,
) -> Result<Option<ConfirmationHeightInfo>, StoreError> {
    let value = store
        .confirmation_height_db
        .get(txn, account.as_bytes())
        .map_err(LmdbError::from)?;
    value.map(ConfirmationHeightInfo::from_bytes).transpose()
}

fn read_cemented_count(store: &LmdbStore, txn: &RoTxn) -> Result<u64, StoreError> {
    let iter = store
        .confirmation_height_db
        .iter(txn)
        .map_err(LmdbError::from)?;
    let mut total = 0u64;
    for entry in iter {
        let (_key, value) = entry.map_err(LmdbError::from)?;
        total += ConfirmationHeightInfo::from_bytes(value)?.height;
    }
    Ok(total)
}

fn read_frontier(
    store: &LmdbStore,
    txn: &RoTxn,
    hash: &BlockHash,
) -> Result<Option<Account>, StoreError> {
    let value = store
        .frontiers_db
        .get(txn, hash.as_bytes())
        .map_err(LmdbError::from)?;
    value.map(decode_account).transpose()
}

fn read_rep_weight(
    store: &LmdbStore,
    txn: &RoTxn,
    representative: &Account,
) -> Result<Option<Amount>, StoreError> {
    let value = store
        .rep_weights_db
        .get(txn, representative.as_bytes())
        .map_err(LmdbError::from)?;
    value.map(decode_amount).transpose()
}

fn read_online_weight_samples(
    store: &LmdbStore,
    txn: &RoTxn,
    limit: usize,
) -> Result<Vec<(u64, Amount)>, StoreError> {
    let iter = store
        .online_weight_db
        .rev_iter(txn)
        .map_err(LmdbError::from)?;
    let mut results = Vec::new();
    for entry in iter.take(limit) {
        let (key, value) = entry.map_err(LmdbError::from)?;
        let ts: [u8; 8] = key
            .try_into()
            .map_err(|_| StoreError::Corruption("online weight key is not 8 bytes".into()))?;
        results.push((u64::from_be_bytes(ts), decode_amount(value)?));
    }
    Ok(results)
}

fn read_final_vote(
    store: &LmdbStore,
    txn: &RoTxn,
    root: &[u8; 32],
) -> Result<Option<BlockHash>, StoreError> {
    let value = store
        .final_votes_db
        .get(txn, root)
        .map_err(LmdbError::from)?;
    value.map(decode_hash).transpose()
}

fn read_version(store: &LmdbStore, txn: &RoTxn) -> Result<Option<u64>, StoreError> {
    let value = store
        .meta_db
        .get(txn, b"version")
        .map_err(LmdbError::from)?;
    value
        .map(|v| {
            let arr: [u8; 8] = v
                .try_into()
                .map_err(|_| StoreError::Corruption("version record is not 8 bytes".into()))?;
            Ok(u64::from_be_bytes(arr))
        })
        .transpose()
}

fn read_accounts(
    store: &LmdbStore,
    txn: &RoTxn,
) -> Result<Vec<(Account, AccountInfo)>, StoreError> {
    let iter = store.accounts_db.iter(txn).map_err(LmdbError::from)?;
    let mut results = Vec::new();
    for entry in iter {
        let (key, value) = entry.map_err(LmdbError::from)?;
        results.push((decode_account(key)?, decode_account_info(value)?));
    }
    Ok(results)
}

fn read_rep_weights(
    store: &LmdbStore,
    txn: &RoTxn,
) -> Result<Vec<(Account, Amount)>, StoreError> {
    let iter = store.rep_weights_db.iter(txn).map_err(LmdbError::from)?;
    let mut results = Vec::new();
    for entry in iter {
        let (key, value) = entry.map_err(LmdbError::from)?;
        results.push((decode_account(key)?, decode_amount(value)?));
    }
    Ok(results)
}

// ── read transaction ────────────────────────────────────────────────────

pub struct LmdbReadTxn<'env> {
    store: &'env LmdbStore,
    txn: RoTxn<'env>,
}

impl<'env> LmdbReadTxn<'env> {
    pub(crate) fn new(store: &'env LmdbStore) -> Result<Self, StoreError> {
        let txn = store.env.read_txn().map_err(LmdbError::from)?;
        Ok(Self { store, txn })
    }
}

macro_rules! impl_read_txn {
    ($txn_expr:ident) => {
        fn get_block(&self, hash: &BlockHash) -> Result<Option<Vec<u8>>, StoreError> {
            read_block(self.store, self.$txn_expr()?, hash)
        }

        fn block_exists(&self, hash: &BlockHash) -> Result<bool, StoreError> {
            Ok(read_block(self.store, self.$txn_expr()?, hash)?.is_some())
        }

        fn block_count(&self) -> Result<u64, StoreError> {
            Ok(self
                .store
                .blocks_db
                .len(self.$txn_expr()?)
                .map_err(LmdbError::from)?)
        }

        fn get_account(&self, account: &Account) -> Result<Option<AccountInfo>, StoreError> {
            read_account(self.store, self.$txn_expr()?, account)
        }

        fn account_exists(&self, account: &Account) -> Result<bool, StoreError> {
            Ok(read_account(self.store, self.$txn_expr()?, account)?.is_some())
        }

        fn account_count(&self) -> Result<u64, StoreError> {
            Ok(self
                .store
                .accounts_db
                .len(self.$txn_expr()?)
                .map_err(LmdbError::from)?)
        }

        fn iter_accounts(&self) -> Result<Vec<(Account, AccountInfo)>, StoreError> {
            read_accounts(self.store, self.$txn_expr()?)
        }

        fn get_pending(&self, key: &PendingKey) -> Result<Option<PendingInfo>, StoreError> {
            read_pending(self.store, self.$txn_expr()?, key)
        }

        fn pending_any(&self, account: &Account) -> Result<bool, StoreError> {
            Ok(!read_pending_range(self.store, self.$txn_expr()?, account, true)?.is_empty())
        }

        fn iter_pending(
            &self,
            account: &Account,
        ) -> Result<Vec<(PendingKey, PendingInfo)>, StoreError> {
            read_pending_range(self.store, self.$txn_expr()?, account, false)
        }

        fn get_confirmation_height(
            &self,
            account: &Account,
        ) -> Result<Option<ConfirmationHeightInfo>, StoreError> {
            read_confirmation_height(self.store, self.$txn_expr()?, account)
        }

        fn cemented_count(&self) -> Result<u64, StoreError> {
            read_cemented_count(self.store, self.$txn_expr()?)
        }

        fn pruned_exists(&self, hash: &BlockHash) -> Result<bool, StoreError> {
            Ok(self
                .store
                .pruned_db
                .get(self.$txn_expr()?, hash.as_bytes())
                .map_err(LmdbError::from)?
                .is_some())
        }

        fn pruned_count(&self) -> Result<u64, StoreError> {
            Ok(self
                .store
                .pruned_db
                .len(self.$txn_expr()?)
                .map_err(LmdbError::from)?)
        }

        fn get_frontier(&self, hash: &BlockHash) -> Result<Option<Account>, StoreError> {
            read_frontier(self.store, self.$txn_expr()?, hash)
        }

        fn get_rep_weight(
            &self,
            representative: &Account,
        ) -> Result<Option<Amount>, StoreError> {
            read_rep_weight(self.store, self.$txn_expr()?, representative)
        }

        fn iter_rep_weights(&self) -> Result<Vec<(Account, Amount)>, StoreError> {
            read_rep_weights(self.store, self.$txn_expr()?)
        }

        fn get_online_weight_samples(
            &self,
            limit: usize,
        ) -> Result<Vec<(u64, Amount)>, StoreError> {
            read_online_weight_samples(self.store, self.$txn_expr()?, limit)
        }

        fn peer_exists(&self, endpoint: &[u8; 18]) -> Result<bool, StoreError> {
            Ok(self
                .store
                .peers_db
                .get(self.$txn_expr()?, endpoint)
                .map_err(LmdbError::from)?
                .is_some())
        }

        fn peer_count(&self) -> Result<u64, StoreError> {
            Ok(self
                .store
                .peers_db
                .len(self.$txn_expr()?)
                .map_err(LmdbError::from)?)
        }

        fn get_final_vote(&self, root: &[u8; 32]) -> Result<Option<BlockHash>, StoreError> {
            read_final_vote(self.store, self.$txn_expr()?, root)
        }

        fn final_vote_count(&self) -> Result<u64, StoreError> {
            Ok(self
                .store
                .final_votes_db
                .len(self.$txn_expr()?)
                .map_err(LmdbError::from)?)
        }

        fn get_version(&self) -> Result<Option<u64>, StoreError> {
            read_version(self.store, self.$txn_expr()?)
        }
    };
}

impl<'env> LmdbReadTxn<'env> {
    fn ro(&self) -> Result<&RoTxn<'env>, StoreError> {
        Ok(&self.txn)
    }
}

impl ReadTxn for LmdbReadTxn<'_> {
    impl_read_txn!(ro);

    fn renew(&mut self) -> Result<(), StoreError> {
        self.txn = self.store.env.read_txn().map_err(LmdbError::from)?;
        Ok(())
    }
}

// ── write transaction ───────────────────────────────────────────────────

pub struct LmdbWriteTxn<'env> {
    store: &'env LmdbStore,
    txn: Option<heed::RwTxn<'env>>,
}

impl<'env> LmdbWriteTxn<'env> {
    pub(crate) fn new(store: &'env LmdbStore) -> Result<Self, StoreError> {
        let txn = store.env.write_txn().map_err(LmdbError::from)?;
        Ok(Self {
            store,
            txn: Some(txn),
        })
    }

    fn ro(&self) -> Result<&RoTxn<'env>, StoreError> {
        match &self.txn {
            Some(txn) => Ok(txn),
            None => Err(LmdbError::Committed.into()),
        }
    }

    fn rw(&mut self) -> Result<&mut heed::RwTxn<'env>, StoreError> {
        match &mut self.txn {
            Some(txn) => Ok(txn),
            None => Err(LmdbError::Committed.into()),
        }
    }
}

impl ReadTxn for LmdbWriteTxn<'_> {
    impl_read_txn!(ro);

    fn renew(&mut self) -> Result<(), StoreError> {
        let txn = self.txn.take().ok_or(LmdbError::Committed)?;
        txn.commit().map_err(LmdbError::from)?;
        self.txn = Some(self.store.env.write_txn().map_err(LmdbError::from)?);
        Ok(())
    }
}

impl WriteTxn for LmdbWriteTxn<'_> {
    fn put_block(&mut self, hash: &BlockHash, bytes: &[u8]) -> Result<(), StoreError> {
        let store = self.store;
        store
            .blocks_db
            .put(self.rw()?, hash.as_bytes(), bytes)
            .map_err(LmdbError::from)?;
        Ok(())
    }

    fn del_block(&mut self, hash: &BlockHash) -> Result<(), StoreError> {
        let store = self.store;
        store
            .blocks_db
            .delete(self.rw()?, hash.as_bytes())
            .map_err(LmdbError::from)?;
        Ok(())
    }

    fn put_account(&mut self, account: &Account, info: &AccountInfo) -> Result<(), StoreError> {
        let bytes = bincode::serialize(info).map_err(LmdbError::from)?;
        let store = self.store;
        store
            .accounts_db
            .put(self.rw()?, account.as_bytes(), &bytes)
            .map_err(LmdbError::from)?;
        Ok(())
    }

    fn del_account(&mut self, account: &Account) -> Result<(), StoreError> {
        let store = self.store;
        store
            .accounts_db
            .delete(self.rw()?, account.as_bytes())
            .map_err(LmdbError::from)?;
        Ok(())
    }

    fn put_pending(&mut self, key: &PendingKey, info: &PendingInfo) -> Result<(), StoreError> {
        let bytes = bincode::serialize(info).map_err(LmdbError::from)?;
        let store = self.store;
        store
            .pending_db
            .put(self.rw()?, &key.to_bytes(), &bytes)
            .map_err(LmdbError::from)?;
        Ok(())
    }

    fn del_pending(&mut self, key: &PendingKey) -> Result<(), StoreError> {
        let store = self.store;
        store
            .pending_db
            .delete(self.rw()?, &key.to_bytes())
            .map_err(LmdbError::from)?;
        Ok(())
    }

    fn put_confirmation_height(
        &mut self,
        account: &Account,
        info: &ConfirmationHeightInfo,
    ) -> Result<(), StoreError> {
        let store = self.store;
        store
            .confirmation_height_db
            .put(self.rw()?, account.as_bytes(), &info.to_bytes())
            .map_err(LmdbError::from)?;
        Ok(())
    }

    fn del_confirmation_height(&mut self, account: &Account) -> Result<(), StoreError> {
        let store = self.store;
        store
            .confirmation_height_db
            .delete(self.rw()?, account.as_bytes())
            .map_err(LmdbError::from)?;
        Ok(())
    }

    fn put_pruned(&mut self, hash: &BlockHash) -> Result<(), StoreError> {
        let store = self.store;
        store
            .pruned_db
            .put(self.rw()?, hash.as_bytes(), &[])
            .map_err(LmdbError::from)?;
        Ok(())
    }

    fn del_pruned(&mut self, hash: &BlockHash) -> Result<(), StoreError> {
        let store = self.store;
        store
            .pruned_db
            .delete(self.rw()?, hash.as_bytes())
            .map_err(LmdbError::from)?;
        Ok(())
    }

    fn put_frontier(&mut self, hash: &BlockHash, account: &Account) -> Result<(), StoreError> {
        let store = self.store;
        store
            .frontiers_db
            .put(self.rw()?, hash.as_bytes(), account.as_bytes())
            .map_err(LmdbError::from)?;
        Ok(())
    }

    fn del_frontier(&mut self, hash: &BlockHash) -> Result<(), StoreError> {
        let store = self.store;
        store
            .frontiers_db
            .delete(self.rw()?, hash.as_bytes())
            .map_err(LmdbError::from)?;
        Ok(())
    }

    fn put_rep_weight(
        &mut self,
        representative: &Account,
        weight: Amount,
    ) -> Result<(), StoreError> {
        let store = self.store;
        store
            .rep_weights_db
            .put(self.rw()?, representative.as_bytes(), &weight.to_be_bytes())
            .map_err(LmdbError::from)?;
        Ok(())
    }

    fn del_rep_weight(&mut self, representative: &Account) -> Result<(), StoreError> {
        let store = self.store;
        store
            .rep_weights_db
            .delete(self.rw()?, representative.as_bytes())
            .map_err(LmdbError::from)?;
        Ok(())
    }

    fn put_online_weight_sample(
        &mut self,
        timestamp: u64,
        weight: Amount,
    ) -> Result<(), StoreError> {
        let store = self.store;
        store
            .online_weight_db
            .put(self.rw()?, &timestamp.to_be_bytes(), &weight.to_be_bytes())
            .map_err(LmdbError::from)?;
        Ok(())
    }

    fn del_online_weight_sample(&mut self, timestamp: u64) -> Result<(), StoreError> {
        let store = self.store;
        store
            .online_weight_db
            .delete(self.rw()?, &timestamp.to_be_bytes())
            .map_err(LmdbError::from)?;
        Ok(())
    }

    fn put_peer(&mut self, endpoint: &[u8; 18]) -> Result<(), StoreError> {
        let store = self.store;
        store
            .peers_db
            .put(self.rw()?, endpoint, &[])
            .map_err(LmdbError::from)?;
        Ok(())
    }

    fn del_peer(&mut self, endpoint: &[u8; 18]) -> Result<(), StoreError> {
        let store = self.store;
        store
            .peers_db
            .delete(self.rw()?, endpoint)
            .map_err(LmdbError::from)?;
        Ok(())
    }

    fn put_final_vote(&mut self, root: &[u8; 32], hash: &BlockHash) -> Result<(), StoreError> {
        let store = self.store;
        store
            .final_votes_db
            .put(self.rw()?, root, hash.as_bytes())
            .map_err(LmdbError::from)?;
        Ok(())
    }

    fn del_final_vote(&mut self, root: &[u8; 32]) -> Result<(), StoreError> {
        let store = self.store;
        store
            .final_votes_db
            .delete(self.rw()?, root)
            .map_err(LmdbError::from)?;
        Ok(())
    }

    fn put_version(&mut self, version: u64) -> Result<(), StoreError> {
        let store = self.store;
        store
            .meta_db
            .put(self.rw()?, b"version", &version.to_be_bytes())
            .map_err(LmdbError::from)?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        let txn = self.txn.take().ok_or(LmdbError::Committed)?;
        txn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn as_read(&self) -> &dyn ReadTxn {
        self
    }
}
