//! Ledger-rule epochs and per-block detail flags.
//!
//! An epoch block upgrades an account's ledger-rule version without moving
//! funds. Epoch blocks are state blocks whose `link` is one of a small set of
//! well-known markers, each signed by a designated epoch signer.

use crate::hash::Link;
use crate::keys::PublicKey;
use serde::{Deserialize, Serialize};

/// Ledger-rule version of an account chain.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Epoch {
    #[default]
    Epoch0,
    Epoch1,
    Epoch2,
}

impl Epoch {
    pub const MAX: Self = Self::Epoch2;

    /// Numeric ordinal, as packed into `BlockDetails`.
    pub fn ordinal(self) -> u8 {
        match self {
            Self::Epoch0 => 0,
            Self::Epoch1 => 1,
            Self::Epoch2 => 2,
        }
    }

    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        match ordinal {
            0 => Some(Self::Epoch0),
            1 => Some(Self::Epoch1),
            2 => Some(Self::Epoch2),
            _ => None,
        }
    }
}

/// Registry of epoch links and their signers.
///
/// Upgrades must be strictly sequential per account (N to N+1); the only
/// exception is an unopened account, which any epoch may open directly.
#[derive(Default)]
pub struct Epochs {
    entries: Vec<(Epoch, Link, PublicKey)>,
}

impl Epochs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, epoch: Epoch, link: Link, signer: PublicKey) {
        self.entries.push((epoch, link, signer));
    }

    /// The epoch a link upgrades to, if it is a registered epoch link.
    pub fn epoch(&self, link: &Link) -> Option<Epoch> {
        self.entries
            .iter()
            .find(|(_, l, _)| l == link)
            .map(|(e, _, _)| *e)
    }

    /// The account authorized to sign blocks carrying this epoch link.
    pub fn signer(&self, link: &Link) -> Option<PublicKey> {
        self.entries
            .iter()
            .find(|(_, l, _)| l == link)
            .map(|(_, _, s)| *s)
    }

    pub fn is_epoch_link(&self, link: &Link) -> bool {
        self.entries.iter().any(|(_, l, _)| l == link)
    }

    /// Whether `to` is the immediate successor of `from`.
    pub fn is_sequential(from: Epoch, to: Epoch) -> bool {
        to.ordinal() == from.ordinal() + 1
    }
}

/// Per-block metadata packed into one sideband byte: a 5-bit epoch ordinal
/// plus the send/receive/epoch flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDetails {
    pub epoch: Epoch,
    pub is_send: bool,
    pub is_receive: bool,
    pub is_epoch: bool,
}

impl BlockDetails {
    pub fn new(epoch: Epoch, is_send: bool, is_receive: bool, is_epoch: bool) -> Self {
        Self {
            epoch,
            is_send,
            is_receive,
            is_epoch,
        }
    }

    pub fn packed(&self) -> u8 {
        let mut byte = self.epoch.ordinal() & 0x1F;
        if self.is_send {
            byte |= 1 << 5;
        }
        if self.is_receive {
            byte |= 1 << 6;
        }
        if self.is_epoch {
            byte |= 1 << 7;
        }
        byte
    }

    pub fn unpack(byte: u8) -> Option<Self> {
        Some(Self {
            epoch: Epoch::from_ordinal(byte & 0x1F)?,
            is_send: byte & (1 << 5) != 0,
            is_receive: byte & (1 << 6) != 0,
            is_epoch: byte & (1 << 7) != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_upgrades() {
        assert!(Epochs::is_sequential(Epoch::Epoch0, Epoch::Epoch1));
        assert!(Epochs::is_sequential(Epoch::Epoch1, Epoch::Epoch2));
        assert!(!Epochs::is_sequential(Epoch::Epoch0, Epoch::Epoch2));
        assert!(!Epochs::is_sequential(Epoch::Epoch1, Epoch::Epoch1));
        assert!(!Epochs::is_sequential(Epoch::Epoch2, Epoch::Epoch1));
    }

    #[test]
    fn registry_lookup() {
        let mut epochs = Epochs::new();
        let link = Link::new([0xE1; 32]);
        let signer = PublicKey([0x55; 32]);
        epochs.add(Epoch::Epoch1, link, signer);

        assert!(epochs.is_epoch_link(&link));
        assert_eq!(epochs.epoch(&link), Some(Epoch::Epoch1));
        assert_eq!(epochs.signer(&link), Some(signer));
        assert!(!epochs.is_epoch_link(&Link::new([0xE2; 32])));
    }

    #[test]
    fn details_pack_roundtrip() {
        let details = BlockDetails::new(Epoch::Epoch2, true, false, false);
        assert_eq!(BlockDetails::unpack(details.packed()), Some(details));

        let epoch_details = BlockDetails::new(Epoch::Epoch1, false, false, true);
        assert_eq!(
            BlockDetails::unpack(epoch_details.packed()),
            Some(epoch_details)
        );
    }

    #[test]
    fn unpack_rejects_unknown_ordinal() {
        assert_eq!(BlockDetails::unpack(0x1F), None);
    }
}
