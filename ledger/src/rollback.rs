//! Rollback — block-type-specific inverse transitions.
//!
//! Undoing a block first undoes everything that causally depends on it: a
//! pocketed send rolls back the receiving chain until its pending entry
//! reappears, then the account's own head blocks come off one at a time.
//! Nothing at or below a confirmation height is ever touched; that case is a
//! broken invariant, not a recoverable outcome.

use lattis_store::{AccountInfo, PendingInfo, PendingKey, ReadTxn, WriteTxn};
use lattis_types::{Account, Amount, BlockHash, Epoch, Timestamp};

use crate::block::{Block, BlockType};
use crate::error::FatalError;
use crate::ledger::Ledger;

/// Undo `target` and all blocks depending on it. Returns the undone blocks
/// in the order they came off the ledger (dependents first, `target` last).
pub(crate) fn rollback(
    ledger: &Ledger,
    txn: &mut dyn WriteTxn,
    target: &BlockHash,
) -> Result<Vec<Block>, FatalError> {
    if !txn.block_exists(target)? {
        return Err(FatalError::MissingBlock(*target));
    }

    let mut rolled_back = Vec::new();
    while txn.block_exists(target)? {
        let block = ledger
            .get_block(txn.as_read(), target)?
            .ok_or(FatalError::MissingBlock(*target))?;
        let account = block
            .account()
            .ok_or(FatalError::MissingSideband(*target))?;
        let info = txn
            .get_account(&account)?
            .ok_or(FatalError::MissingAccount(account))?;
        rollback_head(ledger, txn, &account, &info.head, &mut rolled_back)?;
    }
    Ok(rolled_back)
}

/// Undo a single chain head (recursing into dependent chains first).
fn rollback_head(
    ledger: &Ledger,
    txn: &mut dyn WriteTxn,
    account: &Account,
    head: &BlockHash,
    rolled_back: &mut Vec<Block>,
) -> Result<(), FatalError> {
    let block = ledger
        .get_block(txn.as_read(), head)?
        .ok_or(FatalError::MissingBlock(*head))?;
    let sideband = *block
        .sideband()
        .ok_or(FatalError::MissingSideband(*head))?;

    let confirmed = ledger.confirmation_height(txn.as_read(), account)?;
    if sideband.height <= confirmed.height {
        tracing::error!(hash = %head, height = sideband.height, confirmed = confirmed.height,
            "rollback would cross the confirmation height");
        return Err(FatalError::RollbackPastConfirmation {
            hash: *head,
            height: sideband.height,
            confirmed: confirmed.height,
        });
    }

    let info = txn
        .get_account(account)?
        .ok_or(FatalError::MissingAccount(*account))?;
    debug_assert!(info.head == *head);

    match &block {
        Block::Send(b) => {
            let key = PendingKey::new(b.destination, b.hash());
            // If the send was pocketed, unwind the receiver until the
            // pending entry reappears.
            while txn.get_pending(&key)?.is_none() {
                let receiver = txn
                    .get_account(&b.destination)?
                    .ok_or(FatalError::MissingAccount(b.destination))?;
                rollback_head(ledger, txn, &b.destination, &receiver.head, rolled_back)?;
            }
            let pending = txn
                .get_pending(&key)?
                .ok_or(FatalError::MissingBlock(b.hash()))?;
            let amount = pending.amount;
            txn.del_pending(&key)?;
            ledger.weight_add(txn, &info.representative, amount)?;

            let new_info = AccountInfo {
                head: b.previous,
                representative: info.representative,
                open_block: info.open_block,
                balance: info.balance.saturating_add(amount),
                modified: Timestamp::now(),
                block_count: info.block_count - 1,
                epoch: info.epoch,
            };
            ledger.update_account(txn, account, &info, &new_info)?;
            txn.del_frontier(head)?;
            txn.put_frontier(&b.previous, account)?;
            ledger.write_successor(txn, &b.previous, BlockHash::ZERO)?;
        }
        Block::Receive(b) => {
            let previous_balance = ledger
                .balance(txn.as_read(), &b.previous)?
                .ok_or(FatalError::MissingBlock(b.previous))?;
            let amount = info.balance - previous_balance;
            // Source account degrades to zero once the send body is pruned.
            let source_account = ledger
                .account(txn.as_read(), &b.source)?
                .unwrap_or_default();
            ledger.weight_sub(txn, &info.representative, amount)?;
            txn.put_pending(
                &PendingKey::new(*account, b.source),
                &PendingInfo::new(source_account, amount, Epoch::Epoch0),
            )?;

            let new_info = AccountInfo {
                head: b.previous,
                representative: info.representative,
                open_block: info.open_block,
                balance: previous_balance,
                modified: Timestamp::now(),
                block_count: info.block_count - 1,
                epoch: info.epoch,
            };
            ledger.update_account(txn, account, &info, &new_info)?;
            txn.del_frontier(head)?;
            txn.put_frontier(&b.previous, account)?;
            ledger.write_successor(txn, &b.previous, BlockHash::ZERO)?;
        }
        Block::Open(b) => {
            let amount = sideband.balance;
            let source_account = ledger
                .account(txn.as_read(), &b.source)?
                .unwrap_or_default();
            ledger.weight_sub(txn, &b.representative, amount)?;
            txn.put_pending(
                &PendingKey::new(b.account, b.source),
                &PendingInfo::new(source_account, amount, Epoch::Epoch0),
            )?;
            // The chain is empty again; the account record goes away.
            ledger.update_account(txn, account, &info, &AccountInfo::default())?;
            txn.del_frontier(head)?;
        }
        Block::Change(b) => {
            let previous_rep = ledger.representative_of(txn.as_read(), &b.previous)?;
            ledger.weight_sub(txn, &b.representative, info.balance)?;
            ledger.weight_add(txn, &previous_rep, info.balance)?;

            let new_info = AccountInfo {
                head: b.previous,
                representative: previous_rep,
                open_block: info.open_block,
                balance: info.balance,
                modified: Timestamp::now(),
                block_count: info.block_count - 1,
                epoch: info.epoch,
            };
            ledger.update_account(txn, account, &info, &new_info)?;
            txn.del_frontier(head)?;
            txn.put_frontier(&b.previous, account)?;
            ledger.write_successor(txn, &b.previous, BlockHash::ZERO)?;
        }
        Block::State(b) => {
            let previous_balance = if b.previous.is_zero() {
                Amount::ZERO
            } else {
                ledger
                    .balance(txn.as_read(), &b.previous)?
                    .ok_or(FatalError::MissingBlock(b.previous))?
            };
            let is_send = b.balance < previous_balance;

            ledger.weight_sub(txn, &b.representative, b.balance)?;
            if !b.previous.is_zero() {
                let previous_rep = ledger.representative_of(txn.as_read(), &b.previous)?;
                ledger.weight_add(txn, &previous_rep, previous_balance)?;
            }

            if is_send {
                let key = PendingKey::new(b.link.as_account(), b.hash());
                while txn.get_pending(&key)?.is_none() {
                    let destination = b.link.as_account();
                    let receiver = txn
                        .get_account(&destination)?
                        .ok_or(FatalError::MissingAccount(destination))?;
                    rollback_head(ledger, txn, &destination, &receiver.head, rolled_back)?;
                }
                txn.del_pending(&key)?;
            } else if !b.link.is_zero() && !sideband.details.is_epoch {
                let amount = b.balance - previous_balance;
                let source_account = ledger
                    .account(txn.as_read(), &b.link.as_block_hash())?
                    .unwrap_or_default();
                txn.put_pending(
                    &PendingKey::new(b.account, b.link.as_block_hash()),
                    &PendingInfo::new(source_account, amount, sideband.source_epoch),
                )?;
            }

            if b.previous.is_zero() {
                ledger.update_account(txn, account, &info, &AccountInfo::default())?;
            } else {
                let previous_block = ledger
                    .get_block(txn.as_read(), &b.previous)?
                    .ok_or(FatalError::MissingBlock(b.previous))?;
                let previous_rep = ledger.representative_of(txn.as_read(), &b.previous)?;
                let previous_epoch = previous_block
                    .sideband()
                    .map(|s| s.details.epoch)
                    .unwrap_or(Epoch::Epoch0);

                let new_info = AccountInfo {
                    head: b.previous,
                    representative: previous_rep,
                    open_block: info.open_block,
                    balance: previous_balance,
                    modified: Timestamp::now(),
                    block_count: info.block_count - 1,
                    epoch: previous_epoch,
                };
                ledger.update_account(txn, account, &info, &new_info)?;
                // Legacy predecessors return to the frontier index.
                if previous_block.block_type() != BlockType::State {
                    txn.put_frontier(&b.previous, account)?;
                }
                ledger.write_successor(txn, &b.previous, BlockHash::ZERO)?;
            }
        }
    }

    txn.del_block(head)?;
    ledger.cache.dec_block_count();
    tracing::debug!(hash = %head, %account, "block rolled back");
    rolled_back.push(block);
    Ok(())
}
