//! Receivable (pending) entries.
//!
//! A send creates one entry keyed by (receiving account, send block hash);
//! the matching receive or open consumes it.

use lattis_types::{Account, Amount, BlockHash, Epoch};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Key of a receivable entry: receiving account, then the send block's hash.
///
/// Ordering is lexicographic over the 64-byte concatenation — account-major,
/// hash-minor. Entries must never be compared by value when keys differ;
/// account-scoped range scans rely on this ordering alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PendingKey {
    pub receiver: Account,
    pub send_hash: BlockHash,
}

impl PendingKey {
    pub fn new(receiver: Account, send_hash: BlockHash) -> Self {
        Self {
            receiver,
            send_hash,
        }
    }

    /// 64-byte composite key: account bytes then hash bytes.
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(self.receiver.as_bytes());
        bytes[32..].copy_from_slice(self.send_hash.as_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 64 {
            return None;
        }
        let mut account = [0u8; 32];
        account.copy_from_slice(&bytes[..32]);
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes[32..]);
        Some(Self {
            receiver: Account::new(account),
            send_hash: BlockHash::new(hash),
        })
    }
}

impl Ord for PendingKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_bytes().cmp(&other.to_bytes())
    }
}

impl PartialOrd for PendingKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Value of a receivable entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingInfo {
    /// The sending account. Degrades to `Account::ZERO` if the send block's
    /// body was pruned before this entry had to be reconstructed.
    pub source: Account,
    /// Amount transferred.
    pub amount: Amount,
    /// Ledger-rule version of the send. Legacy receives can only pocket
    /// epoch-0 sends.
    pub epoch: Epoch,
}

impl PendingInfo {
    pub fn new(source: Account, amount: Amount, epoch: Epoch) -> Self {
        Self {
            source,
            amount,
            epoch,
        }
    }
}
