#![allow(dead_code)]

use std::sync::Arc;

use lattis_crypto::keypair_from_seed;
use lattis_ledger::{
    Block, Ledger, LedgerConstants, ProcessResult, SignatureVerification, StateBlock,
    DEV_GENESIS_SEED,
};
use lattis_store::{Store, WriteTxn};
use lattis_store_lmdb::LmdbStore;
use lattis_types::{Account, Amount, BlockHash, KeyPair, Link, Root};
use lattis_work::{generate_work, work_difficulty};

pub fn open_ledger() -> (tempfile::TempDir, Ledger) {
    let dir = tempfile::tempdir().expect("temp dir");
    let store: Arc<dyn Store> =
        Arc::new(LmdbStore::open(dir.path(), 64 * 1024 * 1024).expect("open store"));
    let ledger = Ledger::new(store, LedgerConstants::dev()).expect("open ledger");
    (dir, ledger)
}

pub fn genesis_key() -> KeyPair {
    keypair_from_seed(&DEV_GENESIS_SEED)
}

pub fn key(byte: u8) -> KeyPair {
    keypair_from_seed(&[byte; 32])
}

pub fn account_of(kp: &KeyPair) -> Account {
    Account::from(kp.public)
}

pub fn dev_work(ledger: &Ledger, root: Root) -> u64 {
    generate_work(&root, ledger.constants().work.max(), 0)
}

/// A nonce that fails every dev-network threshold.
pub fn bad_work(ledger: &Ledger, root: Root) -> u64 {
    let work = &ledger.constants().work;
    let floor = work.epoch_1.min(work.epoch_2_send).min(work.epoch_2_receive);
    let mut nonce = 0u64;
    while work_difficulty(&root, nonce) >= floor {
        nonce += 1;
    }
    nonce
}

pub fn state_root(account: Account, previous: BlockHash) -> Root {
    if previous.is_zero() {
        Root::from(account)
    } else {
        Root::from(previous)
    }
}

/// A worked, signed state block for the account owned by `kp`.
pub fn state_block(
    ledger: &Ledger,
    kp: &KeyPair,
    previous: BlockHash,
    representative: Account,
    balance: Amount,
    link: Link,
) -> Block {
    let account = account_of(kp);
    let root = state_root(account, previous);
    Block::State(StateBlock::new(
        account,
        previous,
        representative,
        balance,
        link,
        kp,
        dev_work(ledger, root),
    ))
}

/// A state epoch block for `account`, signed by the epoch signer.
pub fn epoch_block(
    ledger: &Ledger,
    account: Account,
    previous: BlockHash,
    representative: Account,
    balance: Amount,
    link: Link,
) -> Block {
    let root = state_root(account, previous);
    Block::State(StateBlock::new(
        account,
        previous,
        representative,
        balance,
        link,
        &genesis_key(),
        dev_work(ledger, root),
    ))
}

pub fn process(ledger: &Ledger, block: &mut Block) -> ProcessResult {
    process_with(ledger, block, SignatureVerification::Unknown)
}

pub fn process_with(
    ledger: &Ledger,
    block: &mut Block,
    verification: SignatureVerification,
) -> ProcessResult {
    let mut txn = ledger.store().begin_write().expect("begin write");
    let result = ledger
        .process(&mut *txn, block, verification)
        .expect("process");
    txn.commit().expect("commit");
    result.code
}

pub fn process_ok(ledger: &Ledger, block: &mut Block) {
    assert_eq!(process(ledger, block), ProcessResult::Progress);
}
