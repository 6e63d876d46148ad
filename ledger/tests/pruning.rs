//! Pruning: cemented bodies are discarded, markers remain, and the
//! pending-source precision loss is preserved behavior.

mod common;

use common::*;

use lattis_ledger::{FatalError, PruningConfig};
use lattis_store::{ConfirmationHeightInfo, PendingKey, ReadTxn, WriteTxn};
use lattis_types::{Account, Amount, BlockHash, Link};

#[test]
fn pruning_config_defaults() {
    let config = PruningConfig::default();
    assert!(!config.enabled);
    assert!(config.depth > 0);
    assert!(config.batch_size > 0);
}

#[test]
fn pruning_discards_cemented_bodies_and_keeps_markers() {
    let (_dir, ledger) = open_ledger();
    let gkey = genesis_key();
    let genesis = account_of(&gkey);
    let genesis_hash = ledger.constants().genesis_block.hash();

    let mut s1 = state_block(
        &ledger,
        &gkey,
        genesis_hash,
        genesis,
        Amount::MAX - Amount::new(10),
        Link::from(account_of(&key(4))),
    );
    process_ok(&ledger, &mut s1);
    let mut s2 = state_block(
        &ledger,
        &gkey,
        s1.hash(),
        genesis,
        Amount::MAX - Amount::new(20),
        Link::from(account_of(&key(4))),
    );
    process_ok(&ledger, &mut s2);

    {
        let mut txn = ledger.store().begin_write().unwrap();
        txn.put_confirmation_height(&genesis, &ConfirmationHeightInfo::new(3, s2.hash()))
            .unwrap();
        txn.commit().unwrap();
    }

    let pruned = {
        let mut txn = ledger.store().begin_write().unwrap();
        let count = ledger.pruning_action(&mut *txn, &s1.hash(), 1).unwrap();
        txn.commit().unwrap();
        count
    };
    assert_eq!(pruned, 1, "stops at genesis");

    let txn = ledger.store().begin_read().unwrap();
    assert!(!txn.block_exists(&s1.hash()).unwrap());
    assert!(txn.pruned_exists(&s1.hash()).unwrap());
    assert!(ledger.block_or_pruned_exists(&*txn, &s1.hash()).unwrap());
    // Genesis and the head survive.
    assert!(txn.block_exists(&genesis_hash).unwrap());
    assert!(txn.block_exists(&s2.hash()).unwrap());
    assert_eq!(ledger.cache.pruned_count(), 1);
    // The body is gone, so the balance question has no answer any more.
    assert_eq!(ledger.balance(&*txn, &s1.hash()).unwrap(), None);
    // A pruned block reads as confirmed.
    assert!(ledger.block_confirmed(&*txn, &s1.hash()).unwrap());
}

#[test]
fn pruning_stops_at_already_pruned_history() {
    let (_dir, ledger) = open_ledger();
    let gkey = genesis_key();
    let genesis = account_of(&gkey);
    let genesis_hash = ledger.constants().genesis_block.hash();

    let mut previous = genesis_hash;
    let mut hashes = Vec::new();
    for i in 1..=4u64 {
        let mut send = state_block(
            &ledger,
            &gkey,
            previous,
            genesis,
            Amount::MAX - Amount::new(i as u128 * 10),
            Link::from(account_of(&key(4))),
        );
        process_ok(&ledger, &mut send);
        previous = send.hash();
        hashes.push(send.hash());
    }
    {
        let mut txn = ledger.store().begin_write().unwrap();
        txn.put_confirmation_height(&genesis, &ConfirmationHeightInfo::new(5, hashes[3]))
            .unwrap();
        txn.commit().unwrap();
    }

    // Prune the first two, then prune from the third: the walk stops at the
    // already-pruned boundary instead of re-walking to genesis.
    {
        let mut txn = ledger.store().begin_write().unwrap();
        assert_eq!(
            ledger.pruning_action(&mut *txn, &hashes[1], 16).unwrap(),
            2
        );
        assert_eq!(
            ledger.pruning_action(&mut *txn, &hashes[2], 16).unwrap(),
            1
        );
        txn.commit().unwrap();
    }
    let txn = ledger.store().begin_read().unwrap();
    assert_eq!(txn.pruned_count().unwrap(), 3);
    assert_eq!(ledger.cache.pruned_count(), 3);
    assert!(txn.block_exists(&hashes[3]).unwrap());
}

#[test]
fn pruning_uncemented_history_is_fatal() {
    let (_dir, ledger) = open_ledger();
    let gkey = genesis_key();
    let genesis = account_of(&gkey);
    let genesis_hash = ledger.constants().genesis_block.hash();

    let mut send = state_block(
        &ledger,
        &gkey,
        genesis_hash,
        genesis,
        Amount::MAX - Amount::new(10),
        Link::from(account_of(&key(4))),
    );
    process_ok(&ledger, &mut send);

    let mut txn = ledger.store().begin_write().unwrap();
    let error = ledger
        .pruning_action(&mut *txn, &send.hash(), 16)
        .expect_err("uncemented history must not prune");
    assert!(matches!(error, FatalError::PruningUncemented(_)));
}

/// Once a send's body is pruned, re-creating its pending entry (receive
/// rollback) can no longer name the exact source account. The entry comes
/// back with the zero account — deliberately preserved behavior.
#[test]
fn pending_source_degrades_to_unknown_after_pruning() {
    let (_dir, ledger) = open_ledger();
    let gkey = genesis_key();
    let genesis = account_of(&gkey);
    let genesis_hash = ledger.constants().genesis_block.hash();
    let akey = key(2);
    let a = account_of(&akey);
    let amount = Amount::new(100);

    let mut send = state_block(
        &ledger,
        &gkey,
        genesis_hash,
        genesis,
        Amount::MAX - amount,
        Link::from(a),
    );
    process_ok(&ledger, &mut send);
    let mut open = state_block(
        &ledger,
        &akey,
        BlockHash::ZERO,
        a,
        amount,
        Link::from(send.hash()),
    );
    process_ok(&ledger, &mut open);

    // Cement and prune the send; the open stays uncemented.
    {
        let mut txn = ledger.store().begin_write().unwrap();
        txn.put_confirmation_height(&genesis, &ConfirmationHeightInfo::new(2, send.hash()))
            .unwrap();
        txn.commit().unwrap();
    }
    {
        let mut txn = ledger.store().begin_write().unwrap();
        assert_eq!(ledger.pruning_action(&mut *txn, &send.hash(), 16).unwrap(), 1);
        txn.commit().unwrap();
    }

    // Roll the receive back: the pending entry returns, minus its source.
    {
        let mut txn = ledger.store().begin_write().unwrap();
        ledger.rollback(&mut *txn, &open.hash()).unwrap();
        txn.commit().unwrap();
    }

    let txn = ledger.store().begin_read().unwrap();
    let pending = txn
        .get_pending(&PendingKey::new(a, send.hash()))
        .unwrap()
        .expect("pending entry restored");
    assert_eq!(pending.amount, amount);
    assert_eq!(pending.source, Account::ZERO, "source is unknown after pruning");
    // The pruned send still counts as a confirmed source.
    assert_eq!(
        ledger.account_receivable(&*txn, &a, true).unwrap(),
        amount
    );
}

#[test]
fn receivable_can_be_scoped_to_confirmed_sources() {
    let (_dir, ledger) = open_ledger();
    let gkey = genesis_key();
    let genesis = account_of(&gkey);
    let genesis_hash = ledger.constants().genesis_block.hash();
    let a = account_of(&key(2));
    let amount = Amount::new(40);

    let mut send = state_block(
        &ledger,
        &gkey,
        genesis_hash,
        genesis,
        Amount::MAX - amount,
        Link::from(a),
    );
    process_ok(&ledger, &mut send);

    {
        let txn = ledger.store().begin_read().unwrap();
        assert_eq!(ledger.account_receivable(&*txn, &a, false).unwrap(), amount);
        assert_eq!(
            ledger.account_receivable(&*txn, &a, true).unwrap(),
            Amount::ZERO
        );
    }

    let mut txn = ledger.store().begin_write().unwrap();
    txn.put_confirmation_height(&genesis, &ConfirmationHeightInfo::new(2, send.hash()))
        .unwrap();
    txn.commit().unwrap();

    let txn = ledger.store().begin_read().unwrap();
    assert_eq!(ledger.account_receivable(&*txn, &a, true).unwrap(), amount);
}
