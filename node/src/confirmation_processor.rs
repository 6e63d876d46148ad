//! Confirmation-height processor — cements blocks asynchronously.
//!
//! A dedicated worker pulls frontier requests off an idempotent queue,
//! chooses a cementing strategy, and commits the confirmed prefix of every
//! chain the request depends on. After each committed flush it notifies
//! observers: one callback per cemented block (carrying whether the block
//! had an active local election, so callers can pick the right observer
//! path) and one callback for the whole cemented set.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use serde::{Deserialize, Serialize};

use lattis_ledger::{Block, FatalError, Ledger};
use lattis_store::ReadTxn;
use lattis_types::{Account, BlockHash};

use crate::bounded_cementer::BoundedCementer;
use crate::config::ConfirmationConfig;
use crate::unbounded_cementer::UnboundedCementer;
use crate::write_queue::WriteQueue;

/// Above this many uncemented blocks, automatic mode stops using the
/// unbounded strategy: its block cache would no longer be safely bounded.
pub const UNBOUNDED_CUTOFF: u64 = 16_384;

/// Which cementing strategy the processor dispatches to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationHeightMode {
    /// Unbounded while the uncemented backlog is below [`UNBOUNDED_CUTOFF`],
    /// bounded otherwise.
    #[default]
    Automatic,
    Bounded,
    Unbounded,
}

/// A block that was just cemented, as handed to observers.
#[derive(Clone)]
pub struct CementedBlock {
    pub block: Arc<Block>,
    /// Whether an active local vote/election existed for this block when it
    /// cemented. Distinguishes active-quorum from height-driven observers.
    pub had_active_election: bool,
}

type BlockCementedFn = dyn Fn(&CementedBlock) + Send + Sync;
type BatchCementedFn = dyn Fn(&[BlockHash]) + Send + Sync;
type ElectionLookupFn = dyn Fn(&BlockHash) -> bool + Send + Sync;

/// Observer hooks fired after each committed cementing flush.
#[derive(Clone)]
pub struct CementCallbacks {
    pub block_cemented: Arc<BlockCementedFn>,
    pub batch_cemented: Arc<BatchCementedFn>,
    /// Queried per block at notification time; injected by the election
    /// layer, which is outside this crate.
    pub election_lookup: Arc<ElectionLookupFn>,
}

impl Default for CementCallbacks {
    fn default() -> Self {
        Self {
            block_cemented: Arc::new(|_| {}),
            batch_cemented: Arc::new(|_| {}),
            election_lookup: Arc::new(|_| false),
        }
    }
}

impl CementCallbacks {
    /// Fire per-block observers for a committed slice.
    pub(crate) fn notify_blocks(&self, blocks: &[Arc<Block>]) {
        for block in blocks {
            let cemented = CementedBlock {
                had_active_election: (self.election_lookup)(&block.hash()),
                block: Arc::clone(block),
            };
            (self.block_cemented)(&cemented);
        }
    }
}

// ── shared traversal helpers (both cementers) ───────────────────────────

/// Confirmation height of `account`, taking planned-but-unwritten heights
/// from the in-flight overlay into account.
pub(crate) fn effective_height(
    ledger: &Ledger,
    txn: &dyn ReadTxn,
    account: &Account,
    overlay: &HashMap<Account, u64>,
) -> Result<u64, FatalError> {
    let stored = ledger.confirmation_height(txn, account)?.height;
    Ok(overlay
        .get(account)
        .copied()
        .map_or(stored, |planned| planned.max(stored)))
}

/// If `block` pockets funds from a *different, still-unconfirmed* account,
/// the source hash that must cement first.
pub(crate) fn unconfirmed_receive_source(
    ledger: &Ledger,
    txn: &dyn ReadTxn,
    block: &Block,
    overlay: &HashMap<Account, u64>,
) -> Result<Option<BlockHash>, FatalError> {
    let source = match block {
        Block::Receive(b) => b.source,
        Block::Open(b) => b.source,
        Block::State(b) => {
            let receives = block
                .sideband()
                .map(|s| s.details.is_receive)
                .unwrap_or(false);
            if !receives || b.link.is_zero() {
                return Ok(None);
            }
            b.link.as_block_hash()
        }
        Block::Send(_) | Block::Change(_) => return Ok(None),
    };

    // Pruned source: cemented by definition.
    if txn.pruned_exists(&source)? {
        return Ok(None);
    }
    let Some(source_block) = ledger.get_block(txn, &source)? else {
        // Genesis pockets its own account marker; nothing real to wait on.
        return Ok(None);
    };
    let Some(source_sideband) = source_block.sideband() else {
        return Ok(None);
    };
    if Some(source_sideband.account) == block.account() {
        // Same-chain source sits below us and cements with this walk.
        return Ok(None);
    }
    let confirmed = effective_height(ledger, txn, &source_sideband.account, overlay)?;
    if source_sideband.height <= confirmed {
        Ok(None)
    } else {
        Ok(Some(source))
    }
}

// ── the processor ───────────────────────────────────────────────────────

struct State {
    awaiting: VecDeque<BlockHash>,
    awaiting_set: HashSet<BlockHash>,
    current: Option<BlockHash>,
}

struct Shared {
    state: Mutex<State>,
    condvar: Condvar,
    /// Shared with the cementers, which poll it between batches.
    stopped: Arc<AtomicBool>,
}

/// Async dispatcher: accepts "confirm up to this block" requests and runs
/// them on its own thread through the configured cementing strategy.
pub struct ConfirmationHeightProcessor {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl ConfirmationHeightProcessor {
    pub fn new(
        ledger: Arc<Ledger>,
        write_queue: Arc<WriteQueue>,
        config: ConfirmationConfig,
        callbacks: CementCallbacks,
    ) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                awaiting: VecDeque::new(),
                awaiting_set: HashSet::new(),
                current: None,
            }),
            condvar: Condvar::new(),
            stopped: Arc::new(AtomicBool::new(false)),
        });

        let worker_shared = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name("conf_height".into())
            .spawn(move || run(worker_shared, ledger, write_queue, config, callbacks))
            .expect("failed to spawn confirmation height thread");

        Self {
            shared,
            thread: Some(thread),
        }
    }

    /// Queue a frontier for cementing. Re-adding a hash already queued or
    /// already cemented is a no-op.
    pub fn add(&self, hash: BlockHash) {
        let mut state = self.shared.state.lock().expect("processor lock poisoned");
        if state.awaiting_set.insert(hash) {
            state.awaiting.push_back(hash);
            self.shared.condvar.notify_all();
        }
    }

    /// The hash presently mid-flight, if any.
    pub fn current(&self) -> Option<BlockHash> {
        self.shared
            .state
            .lock()
            .expect("processor lock poisoned")
            .current
    }

    /// Whether `hash` is queued or being cemented right now.
    pub fn is_processing_block(&self, hash: &BlockHash) -> bool {
        let state = self.shared.state.lock().expect("processor lock poisoned");
        state.current == Some(*hash) || state.awaiting_set.contains(hash)
    }

    pub fn awaiting_processing(&self) -> usize {
        self.shared
            .state
            .lock()
            .expect("processor lock poisoned")
            .awaiting
            .len()
    }

    pub fn stop(&mut self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
        self.shared.condvar.notify_all();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for ConfirmationHeightProcessor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    shared: Arc<Shared>,
    ledger: Arc<Ledger>,
    write_queue: Arc<WriteQueue>,
    config: ConfirmationConfig,
    callbacks: CementCallbacks,
) {
    let mut bounded = BoundedCementer::new(
        Arc::clone(&ledger),
        Arc::clone(&write_queue),
        config.batch_write_size,
        callbacks.clone(),
        Arc::clone(&shared.stopped),
    );
    let mut unbounded = UnboundedCementer::new(
        Arc::clone(&ledger),
        Arc::clone(&write_queue),
        config.batch_write_size,
        callbacks,
        Arc::clone(&shared.stopped),
    );

    loop {
        let hash = {
            let mut state = shared.state.lock().expect("processor lock poisoned");
            loop {
                if shared.stopped.load(Ordering::SeqCst) {
                    return;
                }
                if let Some(hash) = state.awaiting.pop_front() {
                    state.awaiting_set.remove(&hash);
                    state.current = Some(hash);
                    break hash;
                }
                state = shared
                    .condvar
                    .wait(state)
                    .expect("processor lock poisoned");
            }
        };

        let outcome = cement_one(&ledger, &mut bounded, &mut unbounded, config.mode, &hash);
        match outcome {
            Ok(cemented) => {
                if cemented > 0 {
                    tracing::debug!(frontier = %hash, cemented, "confirmation request done");
                }
            }
            Err(error) => {
                // Incorrect state must never be written; stop instead.
                tracing::error!(frontier = %hash, %error, "cementing hit a fatal invariant violation");
                shared.stopped.store(true, Ordering::SeqCst);
            }
        }

        let mut state = shared.state.lock().expect("processor lock poisoned");
        state.current = None;
        if shared.stopped.load(Ordering::SeqCst) {
            return;
        }
    }
}

fn cement_one(
    ledger: &Ledger,
    bounded: &mut BoundedCementer,
    unbounded: &mut UnboundedCementer,
    mode: ConfirmationHeightMode,
    hash: &BlockHash,
) -> Result<u64, FatalError> {
    {
        let txn = ledger.store().begin_read()?;
        if !txn.block_exists(hash)? || ledger.block_confirmed(&*txn, hash)? {
            return Ok(0);
        }
    }

    let use_unbounded = match mode {
        ConfirmationHeightMode::Bounded => false,
        ConfirmationHeightMode::Unbounded => true,
        ConfirmationHeightMode::Automatic => {
            let backlog = ledger
                .cache
                .block_count()
                .saturating_sub(ledger.cache.cemented_count());
            backlog < UNBOUNDED_CUTOFF
        }
    };

    if use_unbounded {
        unbounded.process(hash)
    } else {
        bounded.process(hash)
    }
}
