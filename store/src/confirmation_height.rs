//! Per-account confirmation height record.

use crate::StoreError;
use lattis_types::{Account, BlockHash};
use serde::{Deserialize, Serialize};

/// The irreversibly finalized prefix of an account's chain.
///
/// Invariants: `height <= AccountInfo::block_count`, and `frontier` is the
/// hash of the block at exactly position `height` (1-based). Height never
/// decreases.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationHeightInfo {
    /// Number of cemented blocks.
    pub height: u64,
    /// Hash of the highest cemented block.
    pub frontier: BlockHash,
}

impl ConfirmationHeightInfo {
    pub fn new(height: u64, frontier: BlockHash) -> Self {
        Self { height, frontier }
    }

    /// 40-byte record: height (big-endian u64) then frontier hash.
    pub fn to_bytes(&self) -> [u8; 40] {
        let mut bytes = [0u8; 40];
        bytes[..8].copy_from_slice(&self.height.to_be_bytes());
        bytes[8..].copy_from_slice(self.frontier.as_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        if bytes.len() != 40 {
            return Err(StoreError::Corruption(format!(
                "confirmation height record has {} bytes, expected 40",
                bytes.len()
            )));
        }
        let mut height = [0u8; 8];
        height.copy_from_slice(&bytes[..8]);
        let mut frontier = [0u8; 32];
        frontier.copy_from_slice(&bytes[8..]);
        Ok(Self {
            height: u64::from_be_bytes(height),
            frontier: BlockHash::new(frontier),
        })
    }
}

/// A pending confirmation-height update, paired with the account it targets.
#[derive(Clone, Debug)]
pub struct ConfirmationHeightUpdate {
    pub account: Account,
    pub new_height: u64,
    pub new_frontier: BlockHash,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_roundtrip() {
        let info = ConfirmationHeightInfo::new(42, BlockHash::new([9u8; 32]));
        let decoded = ConfirmationHeightInfo::from_bytes(&info.to_bytes()).unwrap();
        assert_eq!(decoded, info);
    }

    #[test]
    fn short_record_is_corruption() {
        assert!(ConfirmationHeightInfo::from_bytes(&[0u8; 12]).is_err());
    }
}
