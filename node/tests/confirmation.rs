//! Confirmation pipeline: cross-account cascades, bounded/unbounded parity,
//! batch slicing, callbacks, and the async processor.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lattis_crypto::keypair_from_seed;
use lattis_ledger::{
    Block, Ledger, LedgerConstants, SignatureVerification, StateBlock, DEV_GENESIS_SEED,
};
use lattis_node::{
    BoundedCementer, CementCallbacks, ConfirmationConfig, ConfirmationHeightMode,
    ConfirmationHeightProcessor, UnboundedCementer, WriteQueue, Writer,
};
use lattis_store::{Store, WriteTxn};
use lattis_store_lmdb::LmdbStore;
use lattis_types::{Account, Amount, BlockHash, KeyPair, Link, Root};
use lattis_work::generate_work;

fn open_ledger() -> (tempfile::TempDir, Arc<Ledger>, Arc<WriteQueue>) {
    let dir = tempfile::tempdir().expect("temp dir");
    let store: Arc<dyn Store> =
        Arc::new(LmdbStore::open(dir.path(), 64 * 1024 * 1024).expect("open store"));
    let ledger = Arc::new(Ledger::new(store, LedgerConstants::dev()).expect("open ledger"));
    (dir, ledger, Arc::new(WriteQueue::new()))
}

fn state_block(
    ledger: &Ledger,
    kp: &KeyPair,
    previous: BlockHash,
    balance: Amount,
    link: Link,
) -> Block {
    let account = Account::from(kp.public);
    let root = if previous.is_zero() {
        Root::from(account)
    } else {
        Root::from(previous)
    };
    let work = generate_work(&root, ledger.constants().work.max(), 0);
    Block::State(StateBlock::new(
        account, previous, account, balance, link, kp, work,
    ))
}

fn process(ledger: &Ledger, queue: &WriteQueue, block: &mut Block) {
    let _guard = queue.wait(Writer::ProcessBatch);
    let mut txn = ledger.store().begin_write().expect("begin write");
    let result = ledger
        .process(&mut *txn, block, SignatureVerification::Unknown)
        .expect("process");
    assert_eq!(
        result.code,
        lattis_ledger::ProcessResult::Progress,
        "fixture block rejected"
    );
    txn.commit().expect("commit");
}

struct Lattice {
    genesis: Account,
    a: Account,
    b: Account,
    /// All ten non-genesis blocks, in processing order.
    hashes: Vec<BlockHash>,
    frontier: BlockHash,
}

/// Ten interdependent blocks across three accounts. Confirming `frontier`
/// (the final receive) must cement every one of them.
fn build_lattice(ledger: &Ledger, queue: &WriteQueue) -> Lattice {
    let gkey = keypair_from_seed(&DEV_GENESIS_SEED);
    let akey = keypair_from_seed(&[2u8; 32]);
    let bkey = keypair_from_seed(&[3u8; 32]);
    let genesis = Account::from(gkey.public);
    let a = Account::from(akey.public);
    let b = Account::from(bkey.public);
    let genesis_hash = ledger.constants().genesis_block.hash();

    let mut blocks = Vec::new();

    // G: fund both accounts.
    let g1 = state_block(ledger, &gkey, genesis_hash, Amount::MAX - Amount::new(100), Link::from(a));
    let g2 = state_block(ledger, &gkey, g1.hash(), Amount::MAX - Amount::new(300), Link::from(b));
    // A: open, then two sends to B.
    let a1 = state_block(ledger, &akey, BlockHash::ZERO, Amount::new(100), Link::from(g1.hash()));
    let a2 = state_block(ledger, &akey, a1.hash(), Amount::new(60), Link::from(b));
    let a3 = state_block(ledger, &akey, a2.hash(), Amount::new(50), Link::from(b));
    // B: open, pocket both, send back to A.
    let b1 = state_block(ledger, &bkey, BlockHash::ZERO, Amount::new(200), Link::from(g2.hash()));
    let b2 = state_block(ledger, &bkey, b1.hash(), Amount::new(240), Link::from(a2.hash()));
    let b3 = state_block(ledger, &bkey, b2.hash(), Amount::new(250), Link::from(a3.hash()));
    let b4 = state_block(ledger, &bkey, b3.hash(), Amount::new(220), Link::from(a));
    // A: pocket B's send — the request frontier.
    let a4 = state_block(ledger, &akey, a3.hash(), Amount::new(80), Link::from(b4.hash()));

    for block in [g1, g2, a1, a2, a3, b1, b2, b3, b4, a4] {
        blocks.push(block);
    }
    for block in blocks.iter_mut() {
        process(ledger, queue, block);
    }

    Lattice {
        genesis,
        a,
        b,
        frontier: blocks.last().unwrap().hash(),
        hashes: blocks.iter().map(|b| b.hash()).collect(),
    }
}

struct Recorder {
    per_block: AtomicUsize,
    batches: AtomicUsize,
    batch_hashes: Mutex<Vec<BlockHash>>,
    active_flags: AtomicUsize,
}

impl Recorder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            per_block: AtomicUsize::new(0),
            batches: AtomicUsize::new(0),
            batch_hashes: Mutex::new(Vec::new()),
            active_flags: AtomicUsize::new(0),
        })
    }

    fn callbacks(self: &Arc<Self>, active: impl Fn(&BlockHash) -> bool + Send + Sync + 'static) -> CementCallbacks {
        let on_block = Arc::clone(self);
        let on_batch = Arc::clone(self);
        CementCallbacks {
            block_cemented: Arc::new(move |cemented| {
                on_block.per_block.fetch_add(1, Ordering::SeqCst);
                if cemented.had_active_election {
                    on_block.active_flags.fetch_add(1, Ordering::SeqCst);
                }
            }),
            batch_cemented: Arc::new(move |hashes| {
                on_batch.batches.fetch_add(1, Ordering::SeqCst);
                on_batch
                    .batch_hashes
                    .lock()
                    .unwrap()
                    .extend_from_slice(hashes);
            }),
            election_lookup: Arc::new(active),
        }
    }
}

fn assert_fully_cemented(ledger: &Ledger, lattice: &Lattice) {
    let txn = ledger.store().begin_read().unwrap();
    assert_eq!(
        ledger
            .confirmation_height(&*txn, &lattice.genesis)
            .unwrap()
            .height,
        3
    );
    assert_eq!(
        ledger.confirmation_height(&*txn, &lattice.a).unwrap().height,
        4
    );
    assert_eq!(
        ledger.confirmation_height(&*txn, &lattice.b).unwrap().height,
        4
    );
    assert_eq!(
        ledger.confirmation_height(&*txn, &lattice.a).unwrap().frontier,
        lattice.frontier
    );
    for hash in &lattice.hashes {
        assert!(ledger.block_confirmed(&*txn, hash).unwrap(), "{hash} not cemented");
    }
    assert_eq!(ledger.cache.cemented_count(), 11);
}

#[test]
fn bounded_cements_cross_account_cascade() {
    let (_dir, ledger, queue) = open_ledger();
    let lattice = build_lattice(&ledger, &queue);
    let recorder = Recorder::new();
    let mut cementer = BoundedCementer::new(
        Arc::clone(&ledger),
        Arc::clone(&queue),
        4096,
        recorder.callbacks(|_| false),
        Arc::new(AtomicBool::new(false)),
    );

    let cemented = cementer.process(&lattice.frontier).unwrap();
    assert_eq!(cemented, 10);
    assert_fully_cemented(&ledger, &lattice);
    assert_eq!(recorder.per_block.load(Ordering::SeqCst), 10);
    assert_eq!(recorder.batches.load(Ordering::SeqCst), 1);
    let mut seen = recorder.batch_hashes.lock().unwrap().clone();
    let mut expected = lattice.hashes.clone();
    seen.sort();
    expected.sort();
    assert_eq!(seen, expected);

    // Heights are monotonic: repeating the request cements nothing new and
    // fires no further callbacks.
    assert_eq!(cementer.process(&lattice.frontier).unwrap(), 0);
    assert_eq!(cementer.process(&lattice.hashes[0]).unwrap(), 0);
    assert_eq!(recorder.per_block.load(Ordering::SeqCst), 10);
    assert_fully_cemented(&ledger, &lattice);
}

#[test]
fn unbounded_cements_cross_account_cascade() {
    let (_dir, ledger, queue) = open_ledger();
    let lattice = build_lattice(&ledger, &queue);
    let recorder = Recorder::new();
    let mut cementer = UnboundedCementer::new(
        Arc::clone(&ledger),
        Arc::clone(&queue),
        4096,
        recorder.callbacks(|_| false),
        Arc::new(AtomicBool::new(false)),
    );

    let cemented = cementer.process(&lattice.frontier).unwrap();
    assert_eq!(cemented, 10);
    assert_fully_cemented(&ledger, &lattice);
    assert_eq!(recorder.per_block.load(Ordering::SeqCst), 10);

    assert_eq!(cementer.process(&lattice.frontier).unwrap(), 0);
    assert_eq!(recorder.per_block.load(Ordering::SeqCst), 10);
}

#[test]
fn bounded_with_tiny_batches_matches_large_batches() {
    let (_dir, ledger, queue) = open_ledger();
    let lattice = build_lattice(&ledger, &queue);
    let recorder = Recorder::new();
    // Two-block batches force mid-collection commits and window truncation.
    let mut cementer = BoundedCementer::new(
        Arc::clone(&ledger),
        Arc::clone(&queue),
        2,
        recorder.callbacks(|_| false),
        Arc::new(AtomicBool::new(false)),
    );

    let cemented = cementer.process(&lattice.frontier).unwrap();
    assert_eq!(cemented, 10);
    assert_fully_cemented(&ledger, &lattice);
    assert_eq!(recorder.per_block.load(Ordering::SeqCst), 10);
    assert!(recorder.batches.load(Ordering::SeqCst) >= 1);
}

#[test]
fn partial_confirmation_cements_only_dependencies() {
    let (_dir, ledger, queue) = open_ledger();
    let lattice = build_lattice(&ledger, &queue);
    let recorder = Recorder::new();
    let mut cementer = BoundedCementer::new(
        Arc::clone(&ledger),
        Arc::clone(&queue),
        4096,
        recorder.callbacks(|_| false),
        Arc::new(AtomicBool::new(false)),
    );

    // Confirm only A's open: its single dependency is G's first send.
    let cemented = cementer.process(&lattice.hashes[2]).unwrap();
    assert_eq!(cemented, 2);
    let txn = ledger.store().begin_read().unwrap();
    assert_eq!(
        ledger
            .confirmation_height(&*txn, &lattice.genesis)
            .unwrap()
            .height,
        2
    );
    assert_eq!(
        ledger.confirmation_height(&*txn, &lattice.a).unwrap().height,
        1
    );
    assert_eq!(
        ledger.confirmation_height(&*txn, &lattice.b).unwrap().height,
        0
    );
}

#[test]
fn election_flag_reaches_the_observer() {
    let (_dir, ledger, queue) = open_ledger();
    let lattice = build_lattice(&ledger, &queue);
    let recorder = Recorder::new();
    let flagged = lattice.frontier;
    let mut cementer = BoundedCementer::new(
        Arc::clone(&ledger),
        Arc::clone(&queue),
        4096,
        recorder.callbacks(move |hash| *hash == flagged),
        Arc::new(AtomicBool::new(false)),
    );

    cementer.process(&lattice.frontier).unwrap();
    assert_eq!(recorder.per_block.load(Ordering::SeqCst), 10);
    assert_eq!(recorder.active_flags.load(Ordering::SeqCst), 1);
}

#[test]
fn processor_thread_cements_and_is_idempotent() {
    let (_dir, ledger, queue) = open_ledger();
    let lattice = build_lattice(&ledger, &queue);
    let recorder = Recorder::new();

    let mut processor = ConfirmationHeightProcessor::new(
        Arc::clone(&ledger),
        Arc::clone(&queue),
        ConfirmationConfig {
            mode: ConfirmationHeightMode::Automatic,
            batch_write_size: 4096,
        },
        recorder.callbacks(|_| false),
    );

    assert!(!processor.is_processing_block(&lattice.frontier));
    processor.add(lattice.frontier);
    // Re-adding while queued or mid-flight is a no-op.
    processor.add(lattice.frontier);

    let mut done = false;
    for _ in 0..500 {
        if ledger.cache.cemented_count() == 11 && processor.current().is_none() {
            done = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(done, "confirmation request did not complete in time");
    assert_fully_cemented(&ledger, &lattice);
    assert_eq!(recorder.per_block.load(Ordering::SeqCst), 10);

    // An already-cemented hash is a no-op.
    processor.add(lattice.hashes[0]);
    for _ in 0..100 {
        if !processor.is_processing_block(&lattice.hashes[0]) {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(ledger.cache.cemented_count(), 11);
    assert_eq!(recorder.per_block.load(Ordering::SeqCst), 10);

    processor.stop();
}

#[test]
fn forced_modes_agree_on_results() {
    for mode in [
        ConfirmationHeightMode::Bounded,
        ConfirmationHeightMode::Unbounded,
    ] {
        let (_dir, ledger, queue) = open_ledger();
        let lattice = build_lattice(&ledger, &queue);
        let recorder = Recorder::new();
        let mut processor = ConfirmationHeightProcessor::new(
            Arc::clone(&ledger),
            Arc::clone(&queue),
            ConfirmationConfig {
                mode,
                batch_write_size: 4096,
            },
            recorder.callbacks(|_| false),
        );
        processor.add(lattice.frontier);

        let mut done = false;
        for _ in 0..500 {
            if ledger.cache.cemented_count() == 11 {
                done = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(done, "{mode:?} did not complete in time");
        assert_fully_cemented(&ledger, &lattice);
        processor.stop();
    }
}
