//! Network constants — one immutable struct passed into every component.
//!
//! Carries the genesis block, the burn account, the epoch registry, work
//! thresholds and bootstrap weights for a network. Constructed once at
//! startup; nothing in here mutates afterwards.

use std::collections::HashMap;

use lattis_crypto::keypair_from_seed;
use lattis_types::{
    Account, Amount, BlockHash, Epoch, Epochs, Link, NetworkId, PublicKey, Signature,
};
use lattis_work::{generate_work, WorkThresholds};

use crate::block::{Block, OpenBlock};

/// Published seed of the dev network's genesis key. Anyone can sign dev
/// blocks; the dev network holds no value.
pub const DEV_GENESIS_SEED: [u8; 32] = [0xDE; 32];

const LIVE_GENESIS_ACCOUNT: [u8; 32] = [
    0xC8, 0x11, 0x4E, 0x85, 0x1C, 0x3A, 0x50, 0x5C, 0x7A, 0x29, 0x0F, 0x71, 0x3C, 0x13, 0x85,
    0x04, 0xDE, 0x41, 0x09, 0x9B, 0x72, 0x52, 0x0A, 0x91, 0x7F, 0x25, 0x6C, 0xB6, 0x01, 0x3E,
    0x40, 0x2A,
];

const TEST_GENESIS_ACCOUNT: [u8; 32] = [
    0x5A, 0xE3, 0x12, 0x7C, 0x90, 0x6E, 0x2B, 0x13, 0x44, 0x21, 0xE8, 0x0E, 0x09, 0x6A, 0xB3,
    0x67, 0x2E, 0xC4, 0x58, 0x34, 0x11, 0xD7, 0x2E, 0x10, 0x9E, 0x53, 0xC0, 0xF0, 0x7A, 0x22,
    0x81, 0x94,
];

/// Marker links for epoch upgrades, shared by all networks.
pub fn epoch_v1_link() -> Link {
    let mut bytes = [0u8; 32];
    bytes[..14].copy_from_slice(b"epoch v1 block");
    Link::new(bytes)
}

pub fn epoch_v2_link() -> Link {
    let mut bytes = [0u8; 32];
    bytes[..14].copy_from_slice(b"epoch v2 block");
    Link::new(bytes)
}

/// All constants a ledger needs, fixed per network.
pub struct LedgerConstants {
    pub network: NetworkId,
    pub genesis_block: Block,
    pub genesis_account: Account,
    pub genesis_amount: Amount,
    /// Sends to this account destroy funds; it can never be opened.
    pub burn_account: Account,
    pub epochs: Epochs,
    pub work: WorkThresholds,
    /// Approximate voting weights used while bootstrapping, before enough
    /// history has been processed to compute real ones.
    pub bootstrap_weights: HashMap<Account, Amount>,
    /// Bootstrap weights apply only below this processed-block count.
    pub bootstrap_weight_max_blocks: u64,
}

impl LedgerConstants {
    pub fn for_network(network: NetworkId) -> Self {
        match network {
            NetworkId::Live => Self::live(),
            NetworkId::Test => Self::test(),
            NetworkId::Dev => Self::dev(),
        }
    }

    /// Dev network: published genesis key, low work, no bootstrap weights.
    pub fn dev() -> Self {
        let key = keypair_from_seed(&DEV_GENESIS_SEED);
        let account = Account::from(key.public);
        let work = WorkThresholds::dev();
        // The genesis open block "receives" from its own account.
        let source = BlockHash::new(*account.as_bytes());
        let nonce = generate_work(&account.into(), work.max(), 0);
        let genesis_block = Block::Open(OpenBlock::new(source, account, account, &key, nonce));

        Self::with_genesis(NetworkId::Dev, genesis_block, account, work, HashMap::new(), 0)
    }

    /// Live network. The genesis private key was generated and discarded at
    /// launch; the block below is an axiom, never re-validated.
    pub fn live() -> Self {
        let account = Account::new(LIVE_GENESIS_ACCOUNT);
        let source = BlockHash::new(*account.as_bytes());
        let genesis_block = Block::Open(OpenBlock::with_signature(
            source,
            account,
            account,
            Signature([0x1A; 64]),
            0x62F0_5417_DD3F_B691,
        ));

        let mut bootstrap_weights = HashMap::new();
        bootstrap_weights.insert(
            Account::new([0xB0; 32]),
            Amount::new(9_000_000_000_000_000_000_000_000_000_000),
        );
        bootstrap_weights.insert(
            Account::new([0xB1; 32]),
            Amount::new(4_500_000_000_000_000_000_000_000_000_000),
        );

        Self::with_genesis(
            NetworkId::Live,
            genesis_block,
            account,
            WorkThresholds::live(),
            bootstrap_weights,
            // Roughly the chain height at the snapshot the weights were
            // taken from; past this the local ledger speaks for itself.
            10_000_000,
        )
    }

    /// Public test network: live work rules, fixed genesis record.
    pub fn test() -> Self {
        let account = Account::new(TEST_GENESIS_ACCOUNT);
        let source = BlockHash::new(*account.as_bytes());
        let genesis_block = Block::Open(OpenBlock::with_signature(
            source,
            account,
            account,
            Signature([0x2B; 64]),
            0x1D94_0C3A_0A4E_09F2,
        ));

        Self::with_genesis(
            NetworkId::Test,
            genesis_block,
            account,
            WorkThresholds::live(),
            HashMap::new(),
            0,
        )
    }

    fn with_genesis(
        network: NetworkId,
        genesis_block: Block,
        genesis_account: Account,
        work: WorkThresholds,
        bootstrap_weights: HashMap<Account, Amount>,
        bootstrap_weight_max_blocks: u64,
    ) -> Self {
        let mut epochs = Epochs::new();
        let signer = PublicKey(*genesis_account.as_bytes());
        epochs.add(Epoch::Epoch1, epoch_v1_link(), signer);
        epochs.add(Epoch::Epoch2, epoch_v2_link(), signer);

        Self {
            network,
            genesis_block,
            genesis_account,
            genesis_amount: Amount::MAX,
            burn_account: Account::ZERO,
            epochs,
            work,
            bootstrap_weights,
            bootstrap_weight_max_blocks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattis_crypto::verify_signature;
    use lattis_work::work_difficulty;

    #[test]
    fn dev_genesis_is_deterministic() {
        let a = LedgerConstants::dev();
        let b = LedgerConstants::dev();
        assert_eq!(a.genesis_block.hash(), b.genesis_block.hash());
    }

    #[test]
    fn genesis_hashes_differ_per_network() {
        let live = LedgerConstants::live().genesis_block.hash();
        let test = LedgerConstants::test().genesis_block.hash();
        let dev = LedgerConstants::dev().genesis_block.hash();
        assert_ne!(live, test);
        assert_ne!(live, dev);
        assert_ne!(test, dev);
    }

    #[test]
    fn dev_genesis_is_signed_and_worked() {
        let constants = LedgerConstants::dev();
        let key = keypair_from_seed(&DEV_GENESIS_SEED);
        let block = &constants.genesis_block;
        assert!(verify_signature(
            block.hash().as_bytes(),
            block.signature(),
            &key.public
        ));
        assert!(work_difficulty(&block.root(), block.work()) >= constants.work.max());
    }

    #[test]
    fn epoch_links_are_registered() {
        let constants = LedgerConstants::dev();
        assert_eq!(constants.epochs.epoch(&epoch_v1_link()), Some(Epoch::Epoch1));
        assert_eq!(constants.epochs.epoch(&epoch_v2_link()), Some(Epoch::Epoch2));
        assert!(!constants.epochs.is_epoch_link(&Link::new([9u8; 32])));
    }

    #[test]
    fn burn_account_is_zero() {
        assert!(LedgerConstants::dev().burn_account.is_zero());
    }

    #[test]
    fn live_carries_bootstrap_weights() {
        let constants = LedgerConstants::live();
        assert!(!constants.bootstrap_weights.is_empty());
        assert!(constants.bootstrap_weight_max_blocks > 0);
        assert!(LedgerConstants::dev().bootstrap_weights.is_empty());
    }
}
