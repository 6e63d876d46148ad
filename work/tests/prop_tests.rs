use proptest::prelude::*;

use lattis_types::Root;
use lattis_work::{generate_work, work_difficulty, WorkThresholds};

proptest! {
    /// Generated work always passes its own validation.
    #[test]
    fn generated_work_always_valid(
        root_byte in 0u8..=255,
        start in 0u64..1_000,
    ) {
        let root = Root::new([root_byte; 32]);
        let threshold = WorkThresholds::dev().max();
        let nonce = generate_work(&root, threshold, start);
        prop_assert!(
            work_difficulty(&root, nonce) >= threshold,
            "generated nonce must clear its threshold"
        );
    }

    /// Zero threshold always passes regardless of nonce.
    #[test]
    fn zero_threshold_always_passes(
        root_bytes in prop::array::uniform32(0u8..),
        nonce in 0u64..1_000_000,
    ) {
        let root = Root::new(root_bytes);
        prop_assert!(work_difficulty(&root, nonce) >= 0u64);
    }

    /// Max threshold rejects (almost) all random nonces.
    #[test]
    fn max_threshold_rejects_random(
        root_bytes in prop::array::uniform32(0u8..),
        nonce in 0u64..1_000_000,
    ) {
        let root = Root::new(root_bytes);
        prop_assert!(work_difficulty(&root, nonce) < u64::MAX);
    }

    /// Difficulty is a pure function of (root, nonce).
    #[test]
    fn difficulty_deterministic(
        root_bytes in prop::array::uniform32(0u8..),
        nonce in 0u64..u64::MAX,
    ) {
        let root = Root::new(root_bytes);
        prop_assert_eq!(work_difficulty(&root, nonce), work_difficulty(&root, nonce));
    }
}
