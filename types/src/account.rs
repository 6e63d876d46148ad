//! Account identifiers for the block-lattice.
//!
//! An account *is* its Ed25519 public key. The all-zero account is the burn
//! account: funds sent there are destroyed and it can never be opened.

use crate::keys::PublicKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-byte account identifier (the account's Ed25519 public key).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Account([u8; 32]);

impl Default for Account {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Account {
    /// The burn account.
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// The Ed25519 public key this account corresponds to.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0)
    }

    /// Parse a 64-character hex account string.
    pub fn decode_hex(s: &str) -> Option<Self> {
        if s.len() != 64 {
            return None;
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hi = (chunk[0] as char).to_digit(16)?;
            let lo = (chunk[1] as char).to_digit(16)?;
            bytes[i] = ((hi << 4) | lo) as u8;
        }
        Some(Self(bytes))
    }
}

impl From<PublicKey> for Account {
    fn from(key: PublicKey) -> Self {
        Self(key.0)
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Account(")?;
        for b in &self.0[..4] {
            write!(f, "{:02x}", b)?;
        }
        write!(f, "\u{2026})")
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_burn_account() {
        assert!(Account::ZERO.is_zero());
        assert!(!Account::new([1u8; 32]).is_zero());
    }

    #[test]
    fn decode_hex_roundtrip() {
        let account = Account::new([0xAB; 32]);
        let encoded = account.to_string();
        assert_eq!(Account::decode_hex(&encoded), Some(account));
    }

    #[test]
    fn decode_hex_rejects_bad_input() {
        assert_eq!(Account::decode_hex("abc"), None);
        assert_eq!(Account::decode_hex(&"zz".repeat(32)), None);
    }
}
