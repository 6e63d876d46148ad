//! Unbounded cementing — cache everything, commit once.
//!
//! Same external contract as the bounded strategy, different internals: an
//! in-memory map of every block visited across the entire uncemented suffix
//! of every touched account, so long straight-line confirmations never
//! re-read storage. Memory is unbounded under pathological multi-account
//! fan-out; the bounded strategy exists for exactly that case.
//!
//! The commit path carries the same verify-or-fatal discipline: segments
//! whose account or frontier block vanished mean the single-writer rule was
//! broken, and nothing further may be written.

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

/// A planned confirmation-height update with its full cemented block list.
struct ConfHeightDetails {
    account: Account,
    new_height: u64,
    new_frontier: BlockHash,
    /// Ascending chain order.
    cemented: Vec<Arc<Block>>,
}

/// The unbounded cementing strategy.
pub struct UnboundedCementer {
    ledger: Arc<Ledger>,
    write_queue: Arc<WriteQueue>,
    batch_write_size: usize,
    callbacks: CementCallbacks,
    /// Polled between accounts; a stopped cementer commits what it has
    /// collected and returns.
    stopped: Arc<AtomicBool>,
    /// Every block touched during the current request.
    block_cache: HashMap<BlockHash, Arc<Block>>,
}

impl UnboundedCementer {
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
            block_cache: HashMap::new(),
        }
    }

    /// Cement everything the block at `frontier` depends on, then the chain
    /// up to `frontier` itself. Returns the number of newly cemented blocks.
    pub fn process(&mut self, frontier: &BlockHash) -> Result<u64, FatalError> {
        self.block_cache.clear();
        let mut planned: HashMap<Account, u64> = HashMap::new();
        let mut pending: VecDeque<ConfHeightDetails> = VecDeque::new();

        let ledger = Arc::clone(&self.ledger);
        let txn = ledger.store().begin_read()?;
        let mut stack: Vec<BlockHash> = vec![*frontier];

        while let Some(current) = stack.last().copied() {
            if self.stopped.load(Ordering::SeqCst) {
                break;
            }
            let Some(block) = self.cached_block(&*txn, &current)? else {
                stack.pop();
                continue;
            };
            let Some(sideband) = block.sideband().copied() else {
                stack.pop();
                continue;
            };
            let account = sideband.account;
            let confirmed = effective_height(&ledger, &*txn, &account, &planned)?;
            if sideband.height <= confirmed {
                stack.pop();
                continue;
            }

            // Pull the whole uncemented span into memory.
            let mut chain: Vec<Arc<Block>> = Vec::new();
            let mut cursor = Some(block);
            while let Some(b) = cursor {
                let height = b.sideband().map(|s| s.height).unwrap_or(0);
                let previous = b.previous();
                let at_bottom = height <= confirmed + 1 || previous.is_zero();
                chain.push(b);
                if at_bottom {
                    break;
                }
                let next = self.cached_block(&*txn, &previous)?;
                if next.is_none() {
                    debug_assert!(false, "chain walk hit a missing block");
                    return Err(FatalError::MissingBlock(previous));
                }
                cursor = next;
            }
            chain.reverse();

            let mut dependency: Option<(usize, BlockHash)> = None;
            for (index, candidate) in chain.iter().enumerate() {
                if let Some(source) =
                    unconfirmed_receive_source(&ledger, &*txn, candidate, &planned)?
                {
                    dependency = Some((index, source));
                    break;
                }
            }

            match dependency {
                Some((index, source)) => {
                    if index > 0 {
                        push_details(&mut pending, &mut planned, &account, &chain[..index]);
                    }
                    stack.push(source);
                }
                None => {
                    push_details(&mut pending, &mut planned, &account, &chain);
                    stack.pop();
                }
            }
        }
        drop(txn);

        let total = self.cement_all(pending)?;
        self.block_cache.clear();
        Ok(total)
    }

    fn cached_block(
        &mut self,
        txn: &dyn ReadTxn,
        hash: &BlockHash,
    ) -> Result<Option<Arc<Block>>, FatalError> {
        if let Some(cached) = self.block_cache.get(hash) {
            return Ok(Some(Arc::clone(cached)));
        }
        match self.ledger.get_block(txn, hash)? {
            Some(block) => {
                let block = Arc::new(block);
                self.block_cache.insert(*hash, Arc::clone(&block));
                Ok(Some(block))
            }
            None => Ok(None),
        }
    }

    fn cement_all(&mut self, mut pending: VecDeque<ConfHeightDetails>) -> Result<u64, FatalError> {
        if pending.is_empty() {
            return Ok(0);
        }
        let _guard = self.write_queue.wait(Writer::ConfirmationHeight);
        let mut txn = self.ledger.store().begin_write()?;

        let mut cemented_total = 0u64;
        let mut batch_hashes: Vec<BlockHash> = Vec::new();
        let mut unnotified: Vec<Arc<Block>> = Vec::new();
        let mut since_commit = 0usize;

        while let Some(details) = pending.pop_front() {
            let stored = self
                .ledger
                .confirmation_height(txn.as_read(), &details.account)?;
            if stored.height >= details.new_height {
                continue;
            }
            if !txn.account_exists(&details.account)? {
                tracing::error!(account = %details.account, "account vanished before cementing");
                debug_assert!(false, "account rolled back during cementing");
                return Err(FatalError::MissingAccount(details.account));
            }
            if !txn.block_exists(&details.new_frontier)? {
                tracing::error!(hash = %details.new_frontier, "block vanished before cementing");
                debug_assert!(false, "block rolled back during cementing");
                return Err(FatalError::MissingBlock(details.new_frontier));
            }

            txn.put_confirmation_height(
                &details.account,
                &ConfirmationHeightInfo::new(details.new_height, details.new_frontier),
            )?;
            let newly_cemented: Vec<Arc<Block>> = details
                .cemented
                .into_iter()
                .filter(|b| b.sideband().map(|s| s.height).unwrap_or(0) > stored.height)
                .collect();
            self.ledger.cache.add_cemented(newly_cemented.len() as u64);
            cemented_total += newly_cemented.len() as u64;
            since_commit += newly_cemented.len();
            batch_hashes.extend(newly_cemented.iter().map(|b| b.hash()));
            unnotified.extend(newly_cemented);

            if since_commit >= self.batch_write_size {
                txn.renew()?;
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
        Ok(cemented_total)
    }
}

fn push_details(
    pending: &mut VecDeque<ConfHeightDetails>,
    planned: &mut HashMap<Account, u64>,
    account: &Account,
    segment: &[Arc<Block>],
) {
    let Some(top) = segment.last() else {
        return;
    };
    let top_height = top.sideband().map(|s| s.height).unwrap_or(0);
    pending.push_back(ConfHeightDetails {
        account: *account,
        new_height: top_height,
        new_frontier: top.hash(),
        cemented: segment.to_vec(),
    });
    planned.insert(*account, top_height);
}
