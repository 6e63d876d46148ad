//! Block validation and apply — the ledger state machine.
//!
//! One exhaustive match per block type instead of visitor double-dispatch.
//! Validation short-circuits on the first failure, in a fixed order:
//! existence, previous existence, type sequencing, fork, signature,
//! type-specific semantics, work, burn-account guard. Failures are ordinary
//! `ProcessResult` values; only broken write-discipline invariants surface
//! as `FatalError`.

use lattis_crypto::verify_signature;
use lattis_store::{AccountInfo, PendingInfo, PendingKey, ReadTxn, WriteTxn};
use lattis_types::{Amount, BlockDetails, BlockHash, Epoch, Epochs, Timestamp};
use lattis_work::work_difficulty;

use crate::block::{Block, BlockType, ChangeBlock, OpenBlock, ReceiveBlock, SendBlock, StateBlock};
use crate::error::FatalError;
use crate::ledger::Ledger;
use crate::sideband::{legacy_details, BlockSideband};

/// Outcome of validating one block. Ordinary values, never errors — callers
/// branch on the code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessResult {
    /// Block was accepted and applied.
    Progress,
    /// Block is already present (or pruned).
    Old,
    /// The claimed previous block is unknown.
    GapPrevious,
    /// The linked source block is unknown.
    GapSource,
    /// Epoch open for an account with no pending entries to anchor it.
    GapEpochOpenPending,
    /// Two blocks compete for the same chain position.
    Fork,
    BadSignature,
    /// Send spending more than the balance.
    NegativeSpend,
    /// No matching receivable entry (or wrong epoch for a legacy receive).
    Unreceivable,
    /// Claimed resulting balance does not match previous ± amount.
    BalanceMismatch,
    /// Type-sequencing violation, or a non-sequential epoch ordinal.
    BlockPosition,
    /// Epoch block changing the representative.
    RepresentativeMismatch,
    /// Attempt to open the burn account.
    OpenedBurnAccount,
    InsufficientWork,
}

/// Signature state communicated by the caller and refined by processing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureVerification {
    Unknown,
    Invalid,
    /// Verified against the account key.
    Valid,
    /// Verified against the epoch signer.
    ValidEpoch,
}

/// What `Ledger::process` hands back.
#[derive(Clone, Copy, Debug)]
pub struct ProcessReturn {
    pub code: ProcessResult,
    /// Account balance before this block (zero for a first block).
    pub previous_balance: Amount,
    pub verified: SignatureVerification,
}

impl ProcessReturn {
    fn new(verified: SignatureVerification) -> Self {
        Self {
            code: ProcessResult::Progress,
            previous_balance: Amount::ZERO,
            verified,
        }
    }
}

/// Validation outcome plus, on success, the sideband to attach and store.
type Outcome = (ProcessReturn, Option<BlockSideband>);

pub(crate) fn process(
    ledger: &Ledger,
    txn: &mut dyn WriteTxn,
    block: &mut Block,
    verification: SignatureVerification,
) -> Result<ProcessReturn, FatalError> {
    let (ret, sideband) = match &*block {
        Block::Send(b) => apply_send(ledger, txn, b, verification)?,
        Block::Receive(b) => apply_receive(ledger, txn, b, verification)?,
        Block::Open(b) => apply_open(ledger, txn, b, verification)?,
        Block::Change(b) => apply_change(ledger, txn, b, verification)?,
        Block::State(b) => apply_state(ledger, txn, b, verification)?,
    };

    if let Some(sideband) = sideband {
        block.set_sideband(sideband);
        ledger.write_block(txn, block)?;
        ledger.cache.inc_block_count();
        tracing::debug!(hash = %block.hash(), kind = ?block.block_type(), "block applied");
    }
    Ok(ret)
}

fn signature_ok(hash: &BlockHash, block_signature: &lattis_types::Signature, signer: &lattis_types::PublicKey) -> bool {
    verify_signature(hash.as_bytes(), block_signature, signer)
}

fn work_ok(ledger: &Ledger, root: lattis_types::Root, work: u64, details: &BlockDetails) -> bool {
    work_difficulty(&root, work) >= ledger.constants().work.threshold(details)
}

fn apply_send(
    ledger: &Ledger,
    txn: &mut dyn WriteTxn,
    block: &SendBlock,
    verification: SignatureVerification,
) -> Result<Outcome, FatalError> {
    let hash = block.hash();
    let mut ret = ProcessReturn::new(verification);

    if ledger.block_or_pruned_exists(txn.as_read(), &hash)? {
        ret.code = ProcessResult::Old;
        return Ok((ret, None));
    }
    let Some(previous) = ledger.get_block(txn.as_read(), &block.previous)? else {
        ret.code = ProcessResult::GapPrevious;
        return Ok((ret, None));
    };
    if !BlockType::Send.can_follow(previous.block_type()) {
        ret.code = ProcessResult::BlockPosition;
        return Ok((ret, None));
    }
    // Legacy chains are indexed by head hash; a previous that exists but is
    // not a head is a signed fork.
    let Some(account) = txn.get_frontier(&block.previous)? else {
        ret.code = ProcessResult::Fork;
        return Ok((ret, None));
    };
    if ret.verified != SignatureVerification::Valid {
        if !signature_ok(&hash, &block.signature, &account.public_key()) {
            ret.code = ProcessResult::BadSignature;
            ret.verified = SignatureVerification::Invalid;
            return Ok((ret, None));
        }
        ret.verified = SignatureVerification::Valid;
    }

    let info = txn.get_account(&account)?.ok_or_else(|| {
        debug_assert!(false, "frontier entry without account record");
        FatalError::MissingAccount(account)
    })?;
    debug_assert!(info.head == block.previous);
    ret.previous_balance = info.balance;

    if info.balance < block.balance {
        ret.code = ProcessResult::NegativeSpend;
        return Ok((ret, None));
    }
    let details = legacy_details(BlockType::Send);
    if !work_ok(ledger, block.previous.into(), block.work, &details) {
        ret.code = ProcessResult::InsufficientWork;
        return Ok((ret, None));
    }

    let amount = info.balance - block.balance;
    ledger.weight_sub(txn, &info.representative, amount)?;
    txn.put_pending(
        &PendingKey::new(block.destination, hash),
        &PendingInfo::new(account, amount, Epoch::Epoch0),
    )?;
    let new_info = AccountInfo {
        head: hash,
        representative: info.representative,
        open_block: info.open_block,
        balance: block.balance,
        modified: Timestamp::now(),
        block_count: info.block_count + 1,
        epoch: info.epoch,
    };
    ledger.update_account(txn, &account, &info, &new_info)?;
    txn.del_frontier(&block.previous)?;
    txn.put_frontier(&hash, &account)?;

    let sideband = BlockSideband::new(
        account,
        BlockHash::ZERO,
        block.balance,
        info.block_count + 1,
        Timestamp::now(),
        details,
        Epoch::Epoch0,
    );
    Ok((ret, Some(sideband)))
}

fn apply_receive(
    ledger: &Ledger,
    txn: &mut dyn WriteTxn,
    block: &ReceiveBlock,
    verification: SignatureVerification,
) -> Result<Outcome, FatalError> {
    let hash = block.hash();
    let mut ret = ProcessReturn::new(verification);

    if ledger.block_or_pruned_exists(txn.as_read(), &hash)? {
        ret.code = ProcessResult::Old;
        return Ok((ret, None));
    }
    let Some(previous) = ledger.get_block(txn.as_read(), &block.previous)? else {
        ret.code = ProcessResult::GapPrevious;
        return Ok((ret, None));
    };
    if !BlockType::Receive.can_follow(previous.block_type()) {
        ret.code = ProcessResult::BlockPosition;
        return Ok((ret, None));
    }
    let Some(account) = txn.get_frontier(&block.previous)? else {
        ret.code = ProcessResult::Fork;
        return Ok((ret, None));
    };
    if ret.verified != SignatureVerification::Valid {
        if !signature_ok(&hash, &block.signature, &account.public_key()) {
            ret.code = ProcessResult::BadSignature;
            ret.verified = SignatureVerification::Invalid;
            return Ok((ret, None));
        }
        ret.verified = SignatureVerification::Valid;
    }
    if !ledger.block_or_pruned_exists(txn.as_read(), &block.source)? {
        ret.code = ProcessResult::GapSource;
        return Ok((ret, None));
    }

    let info = txn.get_account(&account)?.ok_or_else(|| {
        debug_assert!(false, "frontier entry without account record");
        FatalError::MissingAccount(account)
    })?;
    debug_assert!(info.head == block.previous);
    ret.previous_balance = info.balance;

    let key = PendingKey::new(account, block.source);
    let Some(pending) = txn.get_pending(&key)? else {
        ret.code = ProcessResult::Unreceivable;
        return Ok((ret, None));
    };
    // A legacy receive cannot pocket a state-era send.
    if pending.epoch != Epoch::Epoch0 {
        ret.code = ProcessResult::Unreceivable;
        return Ok((ret, None));
    }
    let details = legacy_details(BlockType::Receive);
    if !work_ok(ledger, block.previous.into(), block.work, &details) {
        ret.code = ProcessResult::InsufficientWork;
        return Ok((ret, None));
    }

    let new_balance = info.balance.saturating_add(pending.amount);
    txn.del_pending(&key)?;
    ledger.weight_add(txn, &info.representative, pending.amount)?;
    let new_info = AccountInfo {
        head: hash,
        representative: info.representative,
        open_block: info.open_block,
        balance: new_balance,
        modified: Timestamp::now(),
        block_count: info.block_count + 1,
        epoch: info.epoch,
    };
    ledger.update_account(txn, &account, &info, &new_info)?;
    txn.del_frontier(&block.previous)?;
    txn.put_frontier(&hash, &account)?;

    let sideband = BlockSideband::new(
        account,
        BlockHash::ZERO,
        new_balance,
        info.block_count + 1,
        Timestamp::now(),
        details,
        Epoch::Epoch0,
    );
    Ok((ret, Some(sideband)))
}

fn apply_open(
    ledger: &Ledger,
    txn: &mut dyn WriteTxn,
    block: &OpenBlock,
    verification: SignatureVerification,
) -> Result<Outcome, FatalError> {
    let hash = block.hash();
    let mut ret = ProcessReturn::new(verification);

    if ledger.block_or_pruned_exists(txn.as_read(), &hash)? {
        ret.code = ProcessResult::Old;
        return Ok((ret, None));
    }
    // Second open for the same account competes with the first.
    if txn.get_account(&block.account)?.is_some() {
        ret.code = ProcessResult::Fork;
        return Ok((ret, None));
    }
    if ret.verified != SignatureVerification::Valid {
        if !signature_ok(&hash, &block.signature, &block.account.public_key()) {
            ret.code = ProcessResult::BadSignature;
            ret.verified = SignatureVerification::Invalid;
            return Ok((ret, None));
        }
        ret.verified = SignatureVerification::Valid;
    }
    if !ledger.block_or_pruned_exists(txn.as_read(), &block.source)? {
        ret.code = ProcessResult::GapSource;
        return Ok((ret, None));
    }
    let key = PendingKey::new(block.account, block.source);
    let Some(pending) = txn.get_pending(&key)? else {
        ret.code = ProcessResult::Unreceivable;
        return Ok((ret, None));
    };
    if pending.epoch != Epoch::Epoch0 {
        ret.code = ProcessResult::Unreceivable;
        return Ok((ret, None));
    }
    let details = legacy_details(BlockType::Open);
    if !work_ok(ledger, block.account.into(), block.work, &details) {
        ret.code = ProcessResult::InsufficientWork;
        return Ok((ret, None));
    }
    if block.account == ledger.constants().burn_account {
        ret.code = ProcessResult::OpenedBurnAccount;
        return Ok((ret, None));
    }

    txn.del_pending(&key)?;
    ledger.weight_add(txn, &block.representative, pending.amount)?;
    let new_info = AccountInfo {
        head: hash,
        representative: block.representative,
        open_block: hash,
        balance: pending.amount,
        modified: Timestamp::now(),
        block_count: 1,
        epoch: Epoch::Epoch0,
    };
    ledger.update_account(txn, &block.account, &AccountInfo::default(), &new_info)?;
    txn.put_frontier(&hash, &block.account)?;

    let sideband = BlockSideband::new(
        block.account,
        BlockHash::ZERO,
        pending.amount,
        1,
        Timestamp::now(),
        details,
        Epoch::Epoch0,
    );
    Ok((ret, Some(sideband)))
}

fn apply_change(
    ledger: &Ledger,
    txn: &mut dyn WriteTxn,
    block: &ChangeBlock,
    verification: SignatureVerification,
) -> Result<Outcome, FatalError> {
    let hash = block.hash();
    let mut ret = ProcessReturn::new(verification);

    if ledger.block_or_pruned_exists(txn.as_read(), &hash)? {
        ret.code = ProcessResult::Old;
        return Ok((ret, None));
    }
    let Some(previous) = ledger.get_block(txn.as_read(), &block.previous)? else {
        ret.code = ProcessResult::GapPrevious;
        return Ok((ret, None));
    };
    if !BlockType::Change.can_follow(previous.block_type()) {
        ret.code = ProcessResult::BlockPosition;
        return Ok((ret, None));
    }
    let Some(account) = txn.get_frontier(&block.previous)? else {
        ret.code = ProcessResult::Fork;
        return Ok((ret, None));
    };
    if ret.verified != SignatureVerification::Valid {
        if !signature_ok(&hash, &block.signature, &account.public_key()) {
            ret.code = ProcessResult::BadSignature;
            ret.verified = SignatureVerification::Invalid;
            return Ok((ret, None));
        }
        ret.verified = SignatureVerification::Valid;
    }
    let details = legacy_details(BlockType::Change);
    if !work_ok(ledger, block.previous.into(), block.work, &details) {
        ret.code = ProcessResult::InsufficientWork;
        return Ok((ret, None));
    }

    let info = txn.get_account(&account)?.ok_or_else(|| {
        debug_assert!(false, "frontier entry without account record");
        FatalError::MissingAccount(account)
    })?;
    debug_assert!(info.head == block.previous);
    ret.previous_balance = info.balance;

    ledger.weight_sub(txn, &info.representative, info.balance)?;
    ledger.weight_add(txn, &block.representative, info.balance)?;
    let new_info = AccountInfo {
        head: hash,
        representative: block.representative,
        open_block: info.open_block,
        balance: info.balance,
        modified: Timestamp::now(),
        block_count: info.block_count + 1,
        epoch: info.epoch,
    };
    let balance = info.balance;
    let block_count = info.block_count;
    ledger.update_account(txn, &account, &info, &new_info)?;
    txn.del_frontier(&block.previous)?;
    txn.put_frontier(&hash, &account)?;

    let sideband = BlockSideband::new(
        account,
        BlockHash::ZERO,
        balance,
        block_count + 1,
        Timestamp::now(),
        details,
        Epoch::Epoch0,
    );
    Ok((ret, Some(sideband)))
}

fn apply_state(
    ledger: &Ledger,
    txn: &mut dyn WriteTxn,
    block: &StateBlock,
    verification: SignatureVerification,
) -> Result<Outcome, FatalError> {
    let hash = block.hash();
    let mut ret = ProcessReturn::new(verification);

    if ledger.block_or_pruned_exists(txn.as_read(), &hash)? {
        ret.code = ProcessResult::Old;
        return Ok((ret, None));
    }

    let account_info = txn.get_account(&block.account)?;
    let previous_balance = match &account_info {
        Some(info) => {
            ret.previous_balance = info.balance;
            if block.previous.is_zero() {
                // Account is already open; a second first-block is a fork.
                ret.code = ProcessResult::Fork;
                return Ok((ret, None));
            }
            if !txn.block_exists(&block.previous)? {
                ret.code = ProcessResult::GapPrevious;
                return Ok((ret, None));
            }
            if block.previous != info.head {
                ret.code = ProcessResult::Fork;
                return Ok((ret, None));
            }
            info.balance
        }
        None => {
            if !block.previous.is_zero() {
                ret.code = ProcessResult::GapPrevious;
                return Ok((ret, None));
            }
            Amount::ZERO
        }
    };

    // An epoch-link block that moves no funds is an epoch upgrade; with a
    // balance change it is an ordinary state block whose link happens to
    // collide, validated (and rejected) as such.
    if ledger.is_epoch_link(&block.link) && block.balance == previous_balance {
        return apply_state_epoch(ledger, txn, block, ret, account_info);
    }

    if ret.verified != SignatureVerification::Valid {
        if !signature_ok(&hash, &block.signature, &block.account.public_key()) {
            ret.code = ProcessResult::BadSignature;
            ret.verified = SignatureVerification::Invalid;
            return Ok((ret, None));
        }
        ret.verified = SignatureVerification::Valid;
    }

    let opened = account_info.is_some();
    let is_send = opened && block.balance < previous_balance;
    let is_receive = if opened {
        !is_send && !block.link.is_zero()
    } else {
        true
    };
    let amount = if is_send {
        previous_balance - block.balance
    } else {
        block.balance - previous_balance
    };
    let mut epoch = account_info
        .as_ref()
        .map(|info| info.epoch)
        .unwrap_or(Epoch::Epoch0);
    let mut source_epoch = Epoch::Epoch0;

    if !opened && block.link.is_zero() {
        // A first block has nothing to receive from.
        ret.code = ProcessResult::GapSource;
        return Ok((ret, None));
    }
    if !is_send {
        if !block.link.is_zero() {
            if !ledger.block_or_pruned_exists(txn.as_read(), &block.link.as_block_hash())? {
                ret.code = ProcessResult::GapSource;
                return Ok((ret, None));
            }
            let key = PendingKey::new(block.account, block.link.as_block_hash());
            let Some(pending) = txn.get_pending(&key)? else {
                ret.code = ProcessResult::Unreceivable;
                return Ok((ret, None));
            };
            if amount != pending.amount {
                ret.code = ProcessResult::BalanceMismatch;
                return Ok((ret, None));
            }
            source_epoch = pending.epoch;
            if source_epoch.ordinal() > epoch.ordinal() {
                // Receiving upgraded funds upgrades the account.
                epoch = source_epoch;
            }
        } else if !amount.is_zero() {
            // No link: only the representative may change.
            ret.code = ProcessResult::BalanceMismatch;
            return Ok((ret, None));
        }
    }

    let details = BlockDetails::new(epoch, is_send, is_receive, false);
    let root = if block.previous.is_zero() {
        block.account.into()
    } else {
        block.previous.into()
    };
    if !work_ok(ledger, root, block.work, &details) {
        ret.code = ProcessResult::InsufficientWork;
        return Ok((ret, None));
    }
    if block.account == ledger.constants().burn_account {
        ret.code = ProcessResult::OpenedBurnAccount;
        return Ok((ret, None));
    }

    match &account_info {
        Some(info) => {
            ledger.weight_sub(txn, &info.representative, info.balance)?;
            ledger.weight_add(txn, &block.representative, block.balance)?;
        }
        None => {
            ledger.weight_add(txn, &block.representative, block.balance)?;
        }
    }
    if is_send {
        txn.put_pending(
            &PendingKey::new(block.link.as_account(), hash),
            &PendingInfo::new(block.account, amount, epoch),
        )?;
    } else if !block.link.is_zero() {
        txn.del_pending(&PendingKey::new(block.account, block.link.as_block_hash()))?;
    }

    let old_info = account_info.clone().unwrap_or_default();
    let new_info = AccountInfo {
        head: hash,
        representative: block.representative,
        open_block: if old_info.open_block.is_zero() {
            hash
        } else {
            old_info.open_block
        },
        balance: block.balance,
        modified: Timestamp::now(),
        block_count: old_info.block_count + 1,
        epoch,
    };
    ledger.update_account(txn, &block.account, &old_info, &new_info)?;
    // A state block retires its predecessor's legacy frontier entry.
    if let Some(info) = &account_info {
        if txn.get_frontier(&info.head)?.is_some() {
            txn.del_frontier(&info.head)?;
        }
    }

    let sideband = BlockSideband::new(
        block.account,
        BlockHash::ZERO,
        block.balance,
        old_info.block_count + 1,
        Timestamp::now(),
        details,
        source_epoch,
    );
    Ok((ret, Some(sideband)))
}

fn apply_state_epoch(
    ledger: &Ledger,
    txn: &mut dyn WriteTxn,
    block: &StateBlock,
    mut ret: ProcessReturn,
    account_info: Option<AccountInfo>,
) -> Result<Outcome, FatalError> {
    let hash = block.hash();
    let epochs = &ledger.constants().epochs;

    if ret.verified != SignatureVerification::ValidEpoch {
        let signer = epochs.signer(&block.link).unwrap_or(lattis_types::PublicKey([0u8; 32]));
        if !signature_ok(&hash, &block.signature, &signer) {
            ret.code = ProcessResult::BadSignature;
            ret.verified = SignatureVerification::Invalid;
            return Ok((ret, None));
        }
        ret.verified = SignatureVerification::ValidEpoch;
    }

    let Some(target_epoch) = epochs.epoch(&block.link) else {
        // Caller guarantees an epoch link; a miss here is a registry bug.
        debug_assert!(false, "epoch path without registered link");
        ret.code = ProcessResult::BlockPosition;
        return Ok((ret, None));
    };

    match &account_info {
        Some(info) => {
            if block.representative != info.representative {
                ret.code = ProcessResult::RepresentativeMismatch;
                return Ok((ret, None));
            }
            if !Epochs::is_sequential(info.epoch, target_epoch) {
                ret.code = ProcessResult::BlockPosition;
                return Ok((ret, None));
            }
        }
        None => {
            // An epoch open fixes no representative and must have funds
            // waiting, or it would be a free account creation.
            if !block.representative.is_zero() {
                ret.code = ProcessResult::RepresentativeMismatch;
                return Ok((ret, None));
            }
            if !txn.pending_any(&block.account)? {
                ret.code = ProcessResult::GapEpochOpenPending;
                return Ok((ret, None));
            }
        }
    }

    let details = BlockDetails::new(target_epoch, false, false, true);
    let root = if block.previous.is_zero() {
        block.account.into()
    } else {
        block.previous.into()
    };
    if !work_ok(ledger, root, block.work, &details) {
        ret.code = ProcessResult::InsufficientWork;
        return Ok((ret, None));
    }
    if block.account == ledger.constants().burn_account {
        ret.code = ProcessResult::OpenedBurnAccount;
        return Ok((ret, None));
    }

    let old_info = account_info.unwrap_or_default();
    let new_info = AccountInfo {
        head: hash,
        representative: block.representative,
        open_block: if old_info.open_block.is_zero() {
            hash
        } else {
            old_info.open_block
        },
        balance: old_info.balance,
        modified: Timestamp::now(),
        block_count: old_info.block_count + 1,
        epoch: target_epoch,
    };
    ledger.update_account(txn, &block.account, &old_info, &new_info)?;
    if !old_info.head.is_zero() && txn.get_frontier(&old_info.head)?.is_some() {
        txn.del_frontier(&old_info.head)?;
    }

    let sideband = BlockSideband::new(
        block.account,
        BlockHash::ZERO,
        old_info.balance,
        old_info.block_count + 1,
        Timestamp::now(),
        details,
        Epoch::Epoch0,
    );
    Ok((ret, Some(sideband)))
}
