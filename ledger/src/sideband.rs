//! Sideband — storage-only metadata attached to a block.
//!
//! Not covered by the block's hash; set exactly once when the block is
//! applied. The wire format varies by block type: the successor is always
//! present, the account is omitted where the block itself declares it
//! (state, open), the height is omitted for open blocks (always 1), the
//! balance is stored only where the block does not declare it (receive,
//! change, open), and state blocks append a packed details byte plus the
//! source epoch.

use lattis_store::StoreError;
use lattis_types::{Account, Amount, BlockDetails, BlockHash, Epoch, Timestamp};

use crate::block::{BlockType, ByteReader};

/// Storage metadata for one block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockSideband {
    /// Owning account.
    pub account: Account,
    /// Next block in the chain; zero at the head.
    pub successor: BlockHash,
    /// Balance after this block.
    pub balance: Amount,
    /// 1-based position in the owning account's chain.
    pub height: u64,
    /// Wall-clock time the block was applied locally.
    pub timestamp: Timestamp,
    pub details: BlockDetails,
    /// Epoch of the received funds; meaningful for receiving blocks only.
    pub source_epoch: Epoch,
}

impl BlockSideband {
    pub fn new(
        account: Account,
        successor: BlockHash,
        balance: Amount,
        height: u64,
        timestamp: Timestamp,
        details: BlockDetails,
        source_epoch: Epoch,
    ) -> Self {
        Self {
            account,
            successor,
            balance,
            height,
            timestamp,
            details,
            source_epoch,
        }
    }

    pub fn serialize(&self, block_type: BlockType, out: &mut Vec<u8>) {
        out.extend_from_slice(self.successor.as_bytes());
        if !matches!(block_type, BlockType::State | BlockType::Open) {
            out.extend_from_slice(self.account.as_bytes());
        }
        if block_type != BlockType::Open {
            out.extend_from_slice(&self.height.to_be_bytes());
        }
        if matches!(
            block_type,
            BlockType::Receive | BlockType::Change | BlockType::Open
        ) {
            out.extend_from_slice(&self.balance.to_be_bytes());
        }
        out.extend_from_slice(&self.timestamp.as_secs().to_be_bytes());
        if block_type == BlockType::State {
            out.push(self.details.packed());
            out.push(self.source_epoch.ordinal());
        }
    }

    /// Decode a sideband. Fields the wire omits are reconstructed from the
    /// block: `account_fallback`/`balance_fallback` come from the block's own
    /// declared fields, legacy details from the block type.
    pub fn deserialize(
        bytes: &[u8],
        block_type: BlockType,
        account_fallback: Account,
        balance_fallback: Amount,
    ) -> Result<Self, StoreError> {
        let mut reader = ByteReader::new(bytes);
        let successor = BlockHash::new(reader.read_32()?);
        let account = if matches!(block_type, BlockType::State | BlockType::Open) {
            account_fallback
        } else {
            Account::new(reader.read_32()?)
        };
        let height = if block_type == BlockType::Open {
            1
        } else {
            u64::from_be_bytes(reader.read_8()?)
        };
        let balance = if matches!(
            block_type,
            BlockType::Receive | BlockType::Change | BlockType::Open
        ) {
            Amount::from_be_bytes(reader.read_16()?)
        } else {
            balance_fallback
        };
        let timestamp = Timestamp::new(u64::from_be_bytes(reader.read_8()?));
        let (details, source_epoch) = if block_type == BlockType::State {
            let details_byte = reader.read_u8()?;
            let details = BlockDetails::unpack(details_byte).ok_or_else(|| {
                StoreError::Corruption(format!("invalid details byte {details_byte:#04x}"))
            })?;
            let epoch_byte = reader.read_u8()?;
            let source_epoch = Epoch::from_ordinal(epoch_byte).ok_or_else(|| {
                StoreError::Corruption(format!("invalid source epoch {epoch_byte}"))
            })?;
            (details, source_epoch)
        } else {
            (legacy_details(block_type), Epoch::Epoch0)
        };

        Ok(Self {
            account,
            successor,
            balance,
            height,
            timestamp,
            details,
            source_epoch,
        })
    }
}

/// Details of a legacy block are implied by its type.
pub(crate) fn legacy_details(block_type: BlockType) -> BlockDetails {
    BlockDetails::new(
        Epoch::Epoch0,
        block_type == BlockType::Send,
        matches!(block_type, BlockType::Receive | BlockType::Open),
        false,
    )
}
