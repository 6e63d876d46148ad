use proptest::prelude::*;

use lattis_types::{Account, Amount, BlockHash, Link, Timestamp};

proptest! {
    /// BlockHash roundtrip: new -> as_bytes -> new produces identical hash.
    #[test]
    fn block_hash_roundtrip(bytes in prop::array::uniform32(0u8..)) {
        let hash = BlockHash::new(bytes);
        prop_assert_eq!(hash.as_bytes(), &bytes);
    }

    /// BlockHash::is_zero is true only for all-zero bytes.
    #[test]
    fn block_hash_is_zero_correct(bytes in prop::array::uniform32(0u8..)) {
        let hash = BlockHash::new(bytes);
        prop_assert_eq!(hash.is_zero(), bytes == [0u8; 32]);
    }

    /// BlockHash bincode serialization roundtrip.
    #[test]
    fn block_hash_bincode_roundtrip(bytes in prop::array::uniform32(0u8..)) {
        let hash = BlockHash::new(bytes);
        let encoded = bincode::serialize(&hash).unwrap();
        let decoded: BlockHash = bincode::deserialize(&encoded).unwrap();
        prop_assert_eq!(decoded.as_bytes(), hash.as_bytes());
    }

    /// Account ordering matches byte-lexicographic ordering.
    #[test]
    fn account_ordering_is_lexicographic(
        a in prop::array::uniform32(0u8..),
        b in prop::array::uniform32(0u8..),
    ) {
        let aa = Account::new(a);
        let ab = Account::new(b);
        prop_assert_eq!(aa.cmp(&ab), a.cmp(&b));
    }

    /// Account hex display roundtrips through decode_hex.
    #[test]
    fn account_hex_roundtrip(bytes in prop::array::uniform32(0u8..)) {
        let account = Account::new(bytes);
        prop_assert_eq!(Account::decode_hex(&account.to_string()), Some(account));
    }

    /// Link reinterpretation never changes the underlying bytes.
    #[test]
    fn link_reinterpretation_preserves_bytes(bytes in prop::array::uniform32(0u8..)) {
        let link = Link::new(bytes);
        let block_hash = link.as_block_hash();
        prop_assert_eq!(block_hash.as_bytes(), &bytes);
        let account = link.as_account();
        prop_assert_eq!(account.as_bytes(), &bytes);
    }

    /// Amount big-endian encoding roundtrip.
    #[test]
    fn amount_be_bytes_roundtrip(raw in 0u128..u128::MAX) {
        let amount = Amount::new(raw);
        prop_assert_eq!(Amount::from_be_bytes(amount.to_be_bytes()), amount);
    }

    /// Amount: checked_add(a, b) == Some(a + b) when no overflow.
    #[test]
    fn amount_checked_add(a in 0u128..u128::MAX / 2, b in 0u128..u128::MAX / 2) {
        let sum = Amount::new(a).checked_add(Amount::new(b));
        prop_assert_eq!(sum, Some(Amount::new(a + b)));
    }

    /// Amount: checked_sub returns None when b > a.
    #[test]
    fn amount_checked_sub_underflow(a in 0u128..1_000_000, b in 0u128..1_000_000) {
        let result = Amount::new(a).checked_sub(Amount::new(b));
        if b > a {
            prop_assert!(result.is_none());
        } else {
            prop_assert_eq!(result, Some(Amount::new(a - b)));
        }
    }

    /// Timestamp ordering: new(a) <= new(b) iff a <= b.
    #[test]
    fn timestamp_ordering(a in 0u64..u64::MAX, b in 0u64..u64::MAX) {
        let ta = Timestamp::new(a);
        let tb = Timestamp::new(b);
        prop_assert_eq!(ta <= tb, a <= b);
        prop_assert_eq!(ta == tb, a == b);
    }
}
