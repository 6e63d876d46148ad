//! Block variants for the block-lattice.
//!
//! Five block types: the four legacy types (send, receive, open, change) and
//! the unified state block that supersedes them. Every block is content
//! addressed — its hash is a Blake2b-256 digest of the type-specific hashable
//! fields, computed once at construction — and carries a signature over that
//! hash plus an anti-spam work nonce.
//!
//! Wire format: 1-byte type tag, hashable fields, 64-byte signature, 8-byte
//! work nonce. State blocks serialize work big-endian; legacy types
//! little-endian. Stored blocks append the sideband (see [`crate::sideband`]).

use lattis_crypto::{blake2b_256_multi, sign_message};
use lattis_store::StoreError;
use lattis_types::{Account, Amount, BlockHash, KeyPair, Link, Root, Signature};

use crate::sideband::BlockSideband;

/// Block type tag, as serialized on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockType {
    Send,
    Receive,
    Open,
    Change,
    State,
}

impl BlockType {
    pub fn tag(self) -> u8 {
        match self {
            Self::Send => 2,
            Self::Receive => 3,
            Self::Open => 4,
            Self::Change => 5,
            Self::State => 6,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            2 => Some(Self::Send),
            3 => Some(Self::Receive),
            4 => Some(Self::Open),
            5 => Some(Self::Change),
            6 => Some(Self::State),
            _ => None,
        }
    }

    /// Type-sequencing rule: legacy blocks may not follow a state block.
    /// State blocks may follow anything; open blocks have no predecessor.
    pub fn can_follow(self, predecessor: BlockType) -> bool {
        match self {
            Self::State => true,
            Self::Open => false,
            Self::Send | Self::Receive | Self::Change => predecessor != Self::State,
        }
    }
}

/// A legacy send: moves `previous_balance - balance` to `destination`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendBlock {
    pub previous: BlockHash,
    pub destination: Account,
    /// Balance remaining on the sender's chain after this block.
    pub balance: Amount,
    pub signature: Signature,
    pub work: u64,
    hash: BlockHash,
    sideband: Option<BlockSideband>,
}

impl SendBlock {
    pub fn new(
        previous: BlockHash,
        destination: Account,
        balance: Amount,
        key: &KeyPair,
        work: u64,
    ) -> Self {
        let hash = Self::hash_fields(&previous, &destination, balance);
        let signature = sign_message(hash.as_bytes(), &key.private);
        Self {
            previous,
            destination,
            balance,
            signature,
            work,
            hash,
            sideband: None,
        }
    }

    fn with_signature(
        previous: BlockHash,
        destination: Account,
        balance: Amount,
        signature: Signature,
        work: u64,
    ) -> Self {
        let hash = Self::hash_fields(&previous, &destination, balance);
        Self {
            previous,
            destination,
            balance,
            signature,
            work,
            hash,
            sideband: None,
        }
    }

    fn hash_fields(previous: &BlockHash, destination: &Account, balance: Amount) -> BlockHash {
        BlockHash::new(blake2b_256_multi(&[
            previous.as_bytes(),
            destination.as_bytes(),
            &balance.to_be_bytes(),
        ]))
    }

    pub fn hash(&self) -> BlockHash {
        self.hash
    }
}

/// A legacy receive: pockets the funds of the send block at `source`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceiveBlock {
    pub previous: BlockHash,
    pub source: BlockHash,
    pub signature: Signature,
    pub work: u64,
    hash: BlockHash,
    sideband: Option<BlockSideband>,
}

impl ReceiveBlock {
    pub fn new(previous: BlockHash, source: BlockHash, key: &KeyPair, work: u64) -> Self {
        let hash = Self::hash_fields(&previous, &source);
        let signature = sign_message(hash.as_bytes(), &key.private);
        Self {
            previous,
            source,
            signature,
            work,
            hash,
            sideband: None,
        }
    }

    fn with_signature(
        previous: BlockHash,
        source: BlockHash,
        signature: Signature,
        work: u64,
    ) -> Self {
        let hash = Self::hash_fields(&previous, &source);
        Self {
            previous,
            source,
            signature,
            work,
            hash,
            sideband: None,
        }
    }

    fn hash_fields(previous: &BlockHash, source: &BlockHash) -> BlockHash {
        BlockHash::new(blake2b_256_multi(&[previous.as_bytes(), source.as_bytes()]))
    }

    pub fn hash(&self) -> BlockHash {
        self.hash
    }
}

/// A legacy open: the first block of an account chain, pocketing `source`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenBlock {
    pub source: BlockHash,
    pub representative: Account,
    pub account: Account,
    pub signature: Signature,
    pub work: u64,
    hash: BlockHash,
    sideband: Option<BlockSideband>,
}

impl OpenBlock {
    pub fn new(
        source: BlockHash,
        representative: Account,
        account: Account,
        key: &KeyPair,
        work: u64,
    ) -> Self {
        let hash = Self::hash_fields(&source, &representative, &account);
        let signature = sign_message(hash.as_bytes(), &key.private);
        Self {
            source,
            representative,
            account,
            signature,
            work,
            hash,
            sideband: None,
        }
    }

    /// Construct without signing — genesis records and deserialization.
    pub fn with_signature(
        source: BlockHash,
        representative: Account,
        account: Account,
        signature: Signature,
        work: u64,
    ) -> Self {
        let hash = Self::hash_fields(&source, &representative, &account);
        Self {
            source,
            representative,
            account,
            signature,
            work,
            hash,
            sideband: None,
        }
    }

    fn hash_fields(source: &BlockHash, representative: &Account, account: &Account) -> BlockHash {
        BlockHash::new(blake2b_256_multi(&[
            source.as_bytes(),
            representative.as_bytes(),
            account.as_bytes(),
        ]))
    }

    pub fn hash(&self) -> BlockHash {
        self.hash
    }
}

/// A legacy change: rotates the account's representative.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeBlock {
    pub previous: BlockHash,
    pub representative: Account,
    pub signature: Signature,
    pub work: u64,
    hash: BlockHash,
    sideband: Option<BlockSideband>,
}

impl ChangeBlock {
    pub fn new(previous: BlockHash, representative: Account, key: &KeyPair, work: u64) -> Self {
        let hash = Self::hash_fields(&previous, &representative);
        let signature = sign_message(hash.as_bytes(), &key.private);
        Self {
            previous,
            representative,
            signature,
            work,
            hash,
            sideband: None,
        }
    }

    fn with_signature(
        previous: BlockHash,
        representative: Account,
        signature: Signature,
        work: u64,
    ) -> Self {
        let hash = Self::hash_fields(&previous, &representative);
        Self {
            previous,
            representative,
            signature,
            work,
            hash,
            sideband: None,
        }
    }

    fn hash_fields(previous: &BlockHash, representative: &Account) -> BlockHash {
        BlockHash::new(blake2b_256_multi(&[
            previous.as_bytes(),
            representative.as_bytes(),
        ]))
    }

    pub fn hash(&self) -> BlockHash {
        self.hash
    }
}

/// A state block: the unified format carrying the full account state.
///
/// The `link` field is context dependent — send destination, receive source,
/// or a registered epoch marker; zero for a pure representative change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateBlock {
    pub account: Account,
    pub previous: BlockHash,
    pub representative: Account,
    /// Balance after this block.
    pub balance: Amount,
    pub link: Link,
    pub signature: Signature,
    pub work: u64,
    hash: BlockHash,
    sideband: Option<BlockSideband>,
}

impl StateBlock {
    pub fn new(
        account: Account,
        previous: BlockHash,
        representative: Account,
        balance: Amount,
        link: Link,
        key: &KeyPair,
        work: u64,
    ) -> Self {
        let hash = Self::hash_fields(&account, &previous, &representative, balance, &link);
        let signature = sign_message(hash.as_bytes(), &key.private);
        Self {
            account,
            previous,
            representative,
            balance,
            link,
            signature,
            work,
            hash,
            sideband: None,
        }
    }

    fn with_signature(
        account: Account,
        previous: BlockHash,
        representative: Account,
        balance: Amount,
        link: Link,
        signature: Signature,
        work: u64,
    ) -> Self {
        let hash = Self::hash_fields(&account, &previous, &representative, balance, &link);
        Self {
            account,
            previous,
            representative,
            balance,
            link,
            signature,
            work,
            hash,
            sideband: None,
        }
    }

    fn hash_fields(
        account: &Account,
        previous: &BlockHash,
        representative: &Account,
        balance: Amount,
        link: &Link,
    ) -> BlockHash {
        // 32-byte preamble keeps state hashes disjoint from legacy hashes.
        let mut preamble = [0u8; 32];
        preamble[31] = BlockType::State.tag();
        BlockHash::new(blake2b_256_multi(&[
            &preamble,
            account.as_bytes(),
            previous.as_bytes(),
            representative.as_bytes(),
            &balance.to_be_bytes(),
            link.as_bytes(),
        ]))
    }

    pub fn hash(&self) -> BlockHash {
        self.hash
    }
}

/// A block of any type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Block {
    Send(SendBlock),
    Receive(ReceiveBlock),
    Open(OpenBlock),
    Change(ChangeBlock),
    State(StateBlock),
}

impl Block {
    pub fn block_type(&self) -> BlockType {
        match self {
            Self::Send(_) => BlockType::Send,
            Self::Receive(_) => BlockType::Receive,
            Self::Open(_) => BlockType::Open,
            Self::Change(_) => BlockType::Change,
            Self::State(_) => BlockType::State,
        }
    }

    pub fn hash(&self) -> BlockHash {
        match self {
            Self::Send(b) => b.hash,
            Self::Receive(b) => b.hash,
            Self::Open(b) => b.hash,
            Self::Change(b) => b.hash,
            Self::State(b) => b.hash,
        }
    }

    /// Previous block in the owning account's chain; zero for a first block.
    pub fn previous(&self) -> BlockHash {
        match self {
            Self::Send(b) => b.previous,
            Self::Receive(b) => b.previous,
            Self::Open(_) => BlockHash::ZERO,
            Self::Change(b) => b.previous,
            Self::State(b) => b.previous,
        }
    }

    /// The root the work nonce is computed against.
    pub fn root(&self) -> Root {
        match self {
            Self::Open(b) => Root::from(b.account),
            Self::State(b) if b.previous.is_zero() => Root::from(b.account),
            other => Root::from(other.previous()),
        }
    }

    pub fn work(&self) -> u64 {
        match self {
            Self::Send(b) => b.work,
            Self::Receive(b) => b.work,
            Self::Open(b) => b.work,
            Self::Change(b) => b.work,
            Self::State(b) => b.work,
        }
    }

    pub fn signature(&self) -> &Signature {
        match self {
            Self::Send(b) => &b.signature,
            Self::Receive(b) => &b.signature,
            Self::Open(b) => &b.signature,
            Self::Change(b) => &b.signature,
            Self::State(b) => &b.signature,
        }
    }

    /// Account declared in the block itself (state and open only).
    pub fn account_field(&self) -> Option<Account> {
        match self {
            Self::Open(b) => Some(b.account),
            Self::State(b) => Some(b.account),
            _ => None,
        }
    }

    pub fn representative_field(&self) -> Option<Account> {
        match self {
            Self::Open(b) => Some(b.representative),
            Self::Change(b) => Some(b.representative),
            Self::State(b) => Some(b.representative),
            _ => None,
        }
    }

    /// Balance declared in the block itself (send and state only); other
    /// types record their resulting balance in the sideband.
    pub fn balance_field(&self) -> Option<Amount> {
        match self {
            Self::Send(b) => Some(b.balance),
            Self::State(b) => Some(b.balance),
            _ => None,
        }
    }

    /// Source hash for legacy receive/open blocks.
    pub fn source_field(&self) -> Option<BlockHash> {
        match self {
            Self::Receive(b) => Some(b.source),
            Self::Open(b) => Some(b.source),
            _ => None,
        }
    }

    pub fn link_field(&self) -> Option<Link> {
        match self {
            Self::State(b) => Some(b.link),
            _ => None,
        }
    }

    pub fn destination_field(&self) -> Option<Account> {
        match self {
            Self::Send(b) => Some(b.destination),
            _ => None,
        }
    }

    /// The account that owns this block: the declared field where the type
    /// has one, otherwise the sideband.
    pub fn account(&self) -> Option<Account> {
        self.account_field()
            .or_else(|| self.sideband().map(|s| s.account))
    }

    /// Resulting balance: the declared field where the type has one,
    /// otherwise the sideband.
    pub fn balance(&self) -> Option<Amount> {
        self.balance_field()
            .or_else(|| self.sideband().map(|s| s.balance))
    }

    pub fn sideband(&self) -> Option<&BlockSideband> {
        match self {
            Self::Send(b) => b.sideband.as_ref(),
            Self::Receive(b) => b.sideband.as_ref(),
            Self::Open(b) => b.sideband.as_ref(),
            Self::Change(b) => b.sideband.as_ref(),
            Self::State(b) => b.sideband.as_ref(),
        }
    }

    /// Attach storage metadata. Set exactly once, when the block is applied.
    pub fn set_sideband(&mut self, sideband: BlockSideband) {
        let slot = match self {
            Self::Send(b) => &mut b.sideband,
            Self::Receive(b) => &mut b.sideband,
            Self::Open(b) => &mut b.sideband,
            Self::Change(b) => &mut b.sideband,
            Self::State(b) => &mut b.sideband,
        };
        *slot = Some(sideband);
    }

    // ── wire codec ──────────────────────────────────────────────────────

    /// Hashable fields + signature + work, without type tag or sideband.
    pub fn serialize_wire(&self, out: &mut Vec<u8>) {
        match self {
            Self::Send(b) => {
                out.extend_from_slice(b.previous.as_bytes());
                out.extend_from_slice(b.destination.as_bytes());
                out.extend_from_slice(&b.balance.to_be_bytes());
                out.extend_from_slice(&b.signature.0);
                out.extend_from_slice(&b.work.to_le_bytes());
            }
            Self::Receive(b) => {
                out.extend_from_slice(b.previous.as_bytes());
                out.extend_from_slice(b.source.as_bytes());
                out.extend_from_slice(&b.signature.0);
                out.extend_from_slice(&b.work.to_le_bytes());
            }
            Self::Open(b) => {
                out.extend_from_slice(b.source.as_bytes());
                out.extend_from_slice(b.representative.as_bytes());
                out.extend_from_slice(b.account.as_bytes());
                out.extend_from_slice(&b.signature.0);
                out.extend_from_slice(&b.work.to_le_bytes());
            }
            Self::Change(b) => {
                out.extend_from_slice(b.previous.as_bytes());
                out.extend_from_slice(b.representative.as_bytes());
                out.extend_from_slice(&b.signature.0);
                out.extend_from_slice(&b.work.to_le_bytes());
            }
            Self::State(b) => {
                out.extend_from_slice(b.account.as_bytes());
                out.extend_from_slice(b.previous.as_bytes());
                out.extend_from_slice(b.representative.as_bytes());
                out.extend_from_slice(&b.balance.to_be_bytes());
                out.extend_from_slice(b.link.as_bytes());
                out.extend_from_slice(&b.signature.0);
                // State blocks store work big-endian.
                out.extend_from_slice(&b.work.to_be_bytes());
            }
        }
    }

    /// Full storage encoding: type tag, wire fields, sideband.
    ///
    /// `None` if no sideband is attached — only applied blocks are storable.
    pub fn to_storage_bytes(&self) -> Option<Vec<u8>> {
        let sideband = self.sideband()?;
        let mut out = Vec::with_capacity(256);
        out.push(self.block_type().tag());
        self.serialize_wire(&mut out);
        sideband.serialize(self.block_type(), &mut out);
        Some(out)
    }

    /// Decode a stored block (tag + wire + sideband), recomputing the hash.
    pub fn from_storage_bytes(bytes: &[u8]) -> Result<Block, StoreError> {
        let mut reader = ByteReader::new(bytes);
        let tag = reader.read_u8()?;
        let block_type = BlockType::from_tag(tag)
            .ok_or_else(|| StoreError::Corruption(format!("unknown block type tag {tag}")))?;

        let mut block = match block_type {
            BlockType::Send => {
                let previous = BlockHash::new(reader.read_32()?);
                let destination = Account::new(reader.read_32()?);
                let balance = Amount::from_be_bytes(reader.read_16()?);
                let signature = Signature(reader.read_64()?);
                let work = u64::from_le_bytes(reader.read_8()?);
                Block::Send(SendBlock::with_signature(
                    previous,
                    destination,
                    balance,
                    signature,
                    work,
                ))
            }
            BlockType::Receive => {
                let previous = BlockHash::new(reader.read_32()?);
                let source = BlockHash::new(reader.read_32()?);
                let signature = Signature(reader.read_64()?);
                let work = u64::from_le_bytes(reader.read_8()?);
                Block::Receive(ReceiveBlock::with_signature(previous, source, signature, work))
            }
            BlockType::Open => {
                let source = BlockHash::new(reader.read_32()?);
                let representative = Account::new(reader.read_32()?);
                let account = Account::new(reader.read_32()?);
                let signature = Signature(reader.read_64()?);
                let work = u64::from_le_bytes(reader.read_8()?);
                Block::Open(OpenBlock::with_signature(
                    source,
                    representative,
                    account,
                    signature,
                    work,
                ))
            }
            BlockType::Change => {
                let previous = BlockHash::new(reader.read_32()?);
                let representative = Account::new(reader.read_32()?);
                let signature = Signature(reader.read_64()?);
                let work = u64::from_le_bytes(reader.read_8()?);
                Block::Change(ChangeBlock::with_signature(
                    previous,
                    representative,
                    signature,
                    work,
                ))
            }
            BlockType::State => {
                let account = Account::new(reader.read_32()?);
                let previous = BlockHash::new(reader.read_32()?);
                let representative = Account::new(reader.read_32()?);
                let balance = Amount::from_be_bytes(reader.read_16()?);
                let link = Link::new(reader.read_32()?);
                let signature = Signature(reader.read_64()?);
                let work = u64::from_be_bytes(reader.read_8()?);
                Block::State(StateBlock::with_signature(
                    account,
                    previous,
                    representative,
                    balance,
                    link,
                    signature,
                    work,
                ))
            }
        };

        let account_fallback = block.account_field().unwrap_or_default();
        let balance_fallback = block.balance_field().unwrap_or_default();
        let sideband = BlockSideband::deserialize(
            reader.rest(),
            block_type,
            account_fallback,
            balance_fallback,
        )?;
        block.set_sideband(sideband);
        Ok(block)
    }
}

impl From<SendBlock> for Block {
    fn from(b: SendBlock) -> Self {
        Self::Send(b)
    }
}

impl From<ReceiveBlock> for Block {
    fn from(b: ReceiveBlock) -> Self {
        Self::Receive(b)
    }
}

impl From<OpenBlock> for Block {
    fn from(b: OpenBlock) -> Self {
        Self::Open(b)
    }
}

impl From<ChangeBlock> for Block {
    fn from(b: ChangeBlock) -> Self {
        Self::Change(b)
    }
}

impl From<StateBlock> for Block {
    fn from(b: StateBlock) -> Self {
        Self::State(b)
    }
}

pub(crate) struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], StoreError> {
        if self.pos + n > self.bytes.len() {
            return Err(StoreError::Corruption(format!(
                "block record truncated at byte {}",
                self.pos
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, StoreError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn read_8(&mut self) -> Result<[u8; 8], StoreError> {
        Ok(self.take(8)?.try_into().expect("slice length checked"))
    }

    pub(crate) fn read_16(&mut self) -> Result<[u8; 16], StoreError> {
        Ok(self.take(16)?.try_into().expect("slice length checked"))
    }

    pub(crate) fn read_32(&mut self) -> Result<[u8; 32], StoreError> {
        Ok(self.take(32)?.try_into().expect("slice length checked"))
    }

    pub(crate) fn read_64(&mut self) -> Result<[u8; 64], StoreError> {
        Ok(self.take(64)?.try_into().expect("slice length checked"))
    }

    pub(crate) fn rest(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }
}
