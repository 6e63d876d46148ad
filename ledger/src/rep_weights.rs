//! Cached representative weights.
//!
//! Avoids scanning all accounts to compute a representative's total delegated
//! weight. Rebuilt once at startup from the account set, then maintained
//! incrementally by every balance-affecting apply and rollback. The ledger
//! mirrors each change into the `rep_weights` table inside the same write
//! transaction, so the cache and storage never diverge.

use std::collections::HashMap;

use lattis_types::{Account, Amount};

/// In-memory representative → delegated weight aggregate.
pub struct RepWeightCache {
    weights: HashMap<Account, Amount>,
    total_weight: Amount,
}

impl RepWeightCache {
    pub fn new() -> Self {
        Self {
            weights: HashMap::new(),
            total_weight: Amount::ZERO,
        }
    }

    /// Add weight to a representative.
    pub fn add_weight(&mut self, representative: &Account, weight: Amount) {
        let entry = self.weights.entry(*representative).or_insert(Amount::ZERO);
        *entry = entry.saturating_add(weight);
        self.total_weight = self.total_weight.saturating_add(weight);
    }

    /// Remove weight from a representative, clamping at zero.
    pub fn remove_weight(&mut self, representative: &Account, weight: Amount) {
        if let Some(entry) = self.weights.get_mut(representative) {
            let removed = if weight < *entry { weight } else { *entry };
            *entry = *entry - removed;
            self.total_weight = self.total_weight.saturating_sub(removed);
            if entry.is_zero() {
                self.weights.remove(representative);
            }
        }
    }

    /// Get a representative's current weight. Zero if not found.
    pub fn weight(&self, representative: &Account) -> Amount {
        self.weights
            .get(representative)
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    pub fn total_weight(&self) -> Amount {
        self.total_weight
    }

    pub fn rep_count(&self) -> usize {
        self.weights.len()
    }

    /// Rebuild from a scan of `(representative, delegated balance)` pairs —
    /// one per account, at node startup.
    pub fn rebuild(&mut self, delegations: impl Iterator<Item = (Account, Amount)>) {
        self.weights.clear();
        self.total_weight = Amount::ZERO;
        for (representative, balance) in delegations {
            if balance.is_zero() {
                continue;
            }
            let entry = self.weights.entry(representative).or_insert(Amount::ZERO);
            *entry = entry.saturating_add(balance);
            self.total_weight = self.total_weight.saturating_add(balance);
        }
    }
}

impl Default for RepWeightCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rep(byte: u8) -> Account {
        Account::new([byte; 32])
    }

    #[test]
    fn new_cache_is_empty() {
        let cache = RepWeightCache::new();
        assert_eq!(cache.total_weight(), Amount::ZERO);
        assert_eq!(cache.rep_count(), 0);
        assert_eq!(cache.weight(&rep(1)), Amount::ZERO);
    }

    #[test]
    fn add_and_remove_weight() {
        let mut cache = RepWeightCache::new();
        cache.add_weight(&rep(1), Amount::new(10_000));
        cache.add_weight(&rep(2), Amount::new(20_000));
        cache.add_weight(&rep(1), Amount::new(5_000));

        assert_eq!(cache.weight(&rep(1)), Amount::new(15_000));
        assert_eq!(cache.total_weight(), Amount::new(35_000));

        cache.remove_weight(&rep(1), Amount::new(3_000));
        assert_eq!(cache.weight(&rep(1)), Amount::new(12_000));
        assert_eq!(cache.total_weight(), Amount::new(32_000));
    }

    #[test]
    fn remove_clears_zero_entries() {
        let mut cache = RepWeightCache::new();
        cache.add_weight(&rep(1), Amount::new(5_000));
        cache.remove_weight(&rep(1), Amount::new(5_000));
        assert_eq!(cache.rep_count(), 0);
        assert_eq!(cache.total_weight(), Amount::ZERO);
    }

    #[test]
    fn remove_is_clamped() {
        let mut cache = RepWeightCache::new();
        cache.add_weight(&rep(1), Amount::new(3_000));
        cache.remove_weight(&rep(1), Amount::new(100_000));
        assert_eq!(cache.weight(&rep(1)), Amount::ZERO);
        assert_eq!(cache.total_weight(), Amount::ZERO);
    }

    #[test]
    fn remove_unknown_rep_is_noop() {
        let mut cache = RepWeightCache::new();
        cache.remove_weight(&rep(9), Amount::new(10_000));
        assert_eq!(cache.total_weight(), Amount::ZERO);
    }

    #[test]
    fn rebuild_replaces_previous_state() {
        let mut cache = RepWeightCache::new();
        cache.add_weight(&rep(9), Amount::new(999));

        cache.rebuild(
            vec![
                (rep(1), Amount::new(1_000)),
                (rep(2), Amount::new(500)),
                (rep(1), Amount::new(250)),
                (rep(3), Amount::ZERO),
            ]
            .into_iter(),
        );

        assert_eq!(cache.weight(&rep(1)), Amount::new(1_250));
        assert_eq!(cache.weight(&rep(2)), Amount::new(500));
        assert_eq!(cache.weight(&rep(9)), Amount::ZERO);
        assert_eq!(cache.rep_count(), 2);
        assert_eq!(cache.total_weight(), Amount::new(1_750));
    }
}
