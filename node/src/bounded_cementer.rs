//! Bounded cementing — fixed peak memory, commit every few thousand blocks.
//!
//! Collection walks backward account-by-account from the requested frontier.
//! A sliding window caps how much of a chain is held in memory at once, and
//! whenever a receive depends on a different, still-unconfirmed account,
//! that account is collected first. Once the accumulated uncemented count
//! reaches `batch_write_size` the collected segments are committed and the
//! write transaction re-acquired, bounding both memory and lock hold time.
//!
//! Commit re-validates that each segment's account and frontier block still
//! exist in storage. They can only vanish if something rolled them back
//! while bypassing the write queue — a broken invariant, answered fatally
//! rather than by writing wrong state.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lattis_ledger::{Block, FatalError, Ledger};
use lattis_store::{ConfirmationHeightInfo, ReadTxn, WriteTxn};
use lattis_types::{Account, BlockHash};

use crate::confirmation_processor::{
    effective_height, unconfirmed_receive_source, CementCallbacks,
};
use crate::write_queue::{WriteQueue, Writer};

/// One contiguous chain segment awaiting a confirmation-height write.
#[derive(Clone, Debug)]
struct WriteDetails {
    account: Account,
    bottom_height: u64,
    top_height: u64,
    top_hash: BlockHash,
}

/// The bounded cementing strategy: `Idle → Collecting → Committing → Idle`.
pub struct BoundedCementer {
    ledger: Arc<Ledger>,
    write_queue: Arc<WriteQueue>,
    batch_write_size: usize,
    callbacks: CementCallbacks,
    /// Polled between batches; a stopped cementer flushes what it has
    /// collected and returns. No mid-batch cancellation.
    stopped: Arc<AtomicBool>,
    pending_writes: VecDeque<WriteDetails>,
    /// Blocks represented by `pending_writes`, the flush trigger.
    pending_blocks: usize,
    /// Heights queued for writing but not yet committed; consulted so the
    /// walk never re-collects a segment it already planned.
    accounts_confirmed: HashMap<Account, u64>,
}

impl BoundedCementer {
    pub fn new(
        ledger: Arc<Ledger>,
        write_queue: Arc<WriteQueue>,
        batch_write_size: usize,
        callbacks: CementCallbacks,
        stopped: Arc<AtomicBool>,
    ) -> Self {
        Self {
            ledger,
            write_queue,
            batch_write_size: batch_write_size.max(1),
            callbacks,
            stopped,
            pending_writes: VecDeque::new(),
            pending_blocks: 0,
            accounts_confirmed: HashMap::new(),
        }
    }

    /// Cement everything the block at `frontier` depends on, then the chain
    /// up to `frontier` itself. Returns the number of newly cemented blocks.
    pub fn process(&mut self, frontier: &BlockHash) -> Result<u64, FatalError> {
        debug_assert!(self.pending_writes.is_empty());
        self.accounts_confirmed.clear();
        let mut total = 0u64;

        let ledger = Arc::clone(&self.ledger);
        let mut txn = ledger.store().begin_read()?;
        let mut stack: Vec<BlockHash> = vec![*frontier];

        while let Some(current) = stack.last().copied() {
            if self.stopped.load(Ordering::SeqCst) {
                break;
            }
            let Some(block) = ledger.get_block(&*txn, &current)? else {
                // Gone between queueing and collection; nothing to cement.
                stack.pop();
                continue;
            };
            let Some(sideband) = block.sideband().copied() else {
                stack.pop();
                continue;
            };
            let account = sideband.account;
            let confirmed =
                effective_height(&ledger, &*txn, &account, &self.accounts_confirmed)?;
            if sideband.height <= confirmed {
                stack.pop();
                continue;
            }

            // Walk down toward the confirmed prefix, keeping only a bounded
            // window anchored at the bottom of the uncemented span.
            let window = self.batch_write_size;
            let mut chain: VecDeque<Block> = VecDeque::new();
            let mut cursor = Some(block);
            while let Some(b) = cursor {
                let height = b.sideband().map(|s| s.height).unwrap_or(0);
                let previous = b.previous();
                let at_bottom = height <= confirmed + 1 || previous.is_zero();
                chain.push_front(b);
                if chain.len() > window {
                    chain.pop_back();
                }
                if at_bottom {
                    break;
                }
                let next = ledger.get_block(&*txn, &previous)?;
                if next.is_none() {
                    debug_assert!(false, "chain walk hit a missing block");
                    return Err(FatalError::MissingBlock(previous));
                }
                cursor = next;
            }
            let chain: Vec<Block> = chain.into_iter().collect();

            // Lowest receive in the window whose source account is not yet
            // confirmed deep enough.
            let mut dependency: Option<(usize, BlockHash)> = None;
            for (index, candidate) in chain.iter().enumerate() {
                if let Some(source) = unconfirmed_receive_source(
                    &ledger,
                    &*txn,
                    candidate,
                    &self.accounts_confirmed,
                )? {
                    dependency = Some((index, source));
                    break;
                }
            }

            match dependency {
                Some((index, source)) => {
                    if index > 0 {
                        self.queue_write(&account, &chain[..index]);
                    }
                    // Collect the source account first; revisit afterwards.
                    stack.push(source);
                }
                None => {
                    self.queue_write(&account, &chain);
                    let window_top = chain
                        .last()
                        .and_then(|b| b.sideband())
                        .map(|s| s.height)
                        .unwrap_or(0);
                    if window_top == sideband.height {
                        stack.pop();
                    }
                    // Otherwise the window was truncated; keep walking the
                    // same request from where the window ended.
                }
            }

            if self.pending_blocks >= self.batch_write_size {
                total += self.cement_pending()?;
                txn.renew()?;
            }
        }

        total += self.cement_pending()?;
        self.accounts_confirmed.clear();
        Ok(total)
    }

    fn queue_write(&mut self, account: &Account, segment: &[Block]) {
        let (Some(bottom), Some(top)) = (segment.first(), segment.last()) else {
            return;
        };
        let bottom_height = bottom.sideband().map(|s| s.height).unwrap_or(0);
        let top_height = top.sideband().map(|s| s.height).unwrap_or(0);
        self.pending_writes.push_back(WriteDetails {
            account: *account,
            bottom_height,
            top_height,
            top_hash: top.hash(),
        });
        self.pending_blocks += (top_height - bottom_height + 1) as usize;
        self.accounts_confirmed.insert(*account, top_height);
    }

    /// Commit all queued segments: acquire the writer slot, re-validate
    /// each segment against storage, advance confirmation heights, and fire
    /// observers after the data is durable.
    fn cement_pending(&mut self) -> Result<u64, FatalError> {
        if self.pending_writes.is_empty() {
            return Ok(0);
        }
        let _guard = self.write_queue.wait(Writer::ConfirmationHeight);
        let mut txn = self.ledger.store().begin_write()?;

        let mut cemented_total = 0u64;
        let mut batch_hashes: Vec<BlockHash> = Vec::new();
        let mut unnotified: Vec<Arc<Block>> = Vec::new();
        let mut since_commit = 0usize;

        while let Some(details) = self.pending_writes.pop_front() {
            let stored = self
                .ledger
                .confirmation_height(txn.as_read(), &details.account)?;
            if stored.height >= details.top_height {
                // A previous flush (or another node path) got here first.
                continue;
            }
            if !txn.account_exists(&details.account)? {
                tracing::error!(account = %details.account, "account vanished before cementing");
                debug_assert!(false, "account rolled back during cementing");
                return Err(FatalError::MissingAccount(details.account));
            }
            let Some(top) = self.ledger.get_block(txn.as_read(), &details.top_hash)? else {
                tracing::error!(hash = %details.top_hash, "block vanished before cementing");
                debug_assert!(false, "block rolled back during cementing");
                return Err(FatalError::MissingBlock(details.top_hash));
            };

            let start_height = (stored.height + 1).max(details.bottom_height);
            let mut blocks: Vec<Arc<Block>> = Vec::new();
            let mut cursor = Some(top);
            while let Some(b) = cursor {
                let height = b.sideband().map(|s| s.height).unwrap_or(0);
                if height < start_height {
                    break;
                }
                let previous = b.previous();
                blocks.push(Arc::new(b));
                if height == start_height {
                    break;
                }
                let next = self.ledger.get_block(txn.as_read(), &previous)?;
                if next.is_none() {
                    debug_assert!(false, "cement walk hit a missing block");
                    return Err(FatalError::MissingBlock(previous));
                }
                cursor = next;
            }
            blocks.reverse();

            txn.put_confirmation_height(
                &details.account,
                &ConfirmationHeightInfo::new(details.top_height, details.top_hash),
            )?;
            self.ledger.cache.add_cemented(blocks.len() as u64);
            cemented_total += blocks.len() as u64;
            since_commit += blocks.len();
            batch_hashes.extend(blocks.iter().map(|b| b.hash()));
            unnotified.extend(blocks);

            if since_commit >= self.batch_write_size {
                txn.renew()?;
                // Observers only ever see committed state.
                self.callbacks.notify_blocks(&unnotified);
                unnotified.clear();
                since_commit = 0;
            }
        }

        txn.commit()?;
        self.callbacks.notify_blocks(&unnotified);
        if !batch_hashes.is_empty() {
            (self.callbacks.batch_cemented)(&batch_hashes);
        }
        self.pending_blocks = 0;
        Ok(cemented_total)
    }
}
