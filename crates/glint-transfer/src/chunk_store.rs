//! Receiver-side slice storage for one session.
//!
//! Slices are keyed by sequence number (1..=total). Insertion is idempotent,
//! so arrival order and duplicate scans never change the stored result.

use std::collections::BTreeMap;

/// Outcome of offering a slice to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insert {
    /// First copy of this sequence number.
    Stored,
    /// Already held. The stored slice is kept.
    Duplicate,
    /// Outside `1..=total`.
    OutOfRange,
}

#[derive(Debug, Clone, Default)]
pub struct ChunkStore {
    slices: BTreeMap<u32, String>,
    total: u32,
}

impl ChunkStore {
    /// Create an empty store for a session with `total` data chunks.
    pub fn new(total: u32) -> Self {
        Self {
            slices: BTreeMap::new(),
            total,
        }
    }

    /// Store a slice unless it is a duplicate or out of range.
    pub fn insert(&mut self, seq: u32, slice: &str) -> Insert {
        if seq == 0 || seq > self.total {
            return Insert::OutOfRange;
        }
        if self.slices.contains_key(&seq) {
            return Insert::Duplicate;
        }
        self.slices.insert(seq, slice.to_string());
        Insert::Stored
    }

    #[inline]
    pub fn contains(&self, seq: u32) -> bool {
        self.slices.contains_key(&seq)
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.received() == self.total
    }

    /// Number of distinct slices held.
    #[inline]
    pub fn received(&self) -> u32 {
        self.slices.len() as u32
    }

    #[inline]
    pub fn total(&self) -> u32 {
        self.total
    }

    /// Missing sequence numbers, ascending.
    pub fn missing(&self) -> Vec<u32> {
        (1..=self.total).filter(|seq| !self.contains(*seq)).collect()
    }

    #[inline]
    pub fn missing_count(&self) -> u32 {
        self.total - self.received()
    }

    /// Concatenate slices in sequence order. `None` until every slice is present.
    pub fn assemble(&self) -> Option<String> {
        if !self.is_complete() {
            return None;
        }
        Some(self.slices.values().map(String::as_str).collect())
    }

    /// Drop all slices and size the store for a new session.
    pub fn reset(&mut self, total: u32) {
        self.slices.clear();
        self.total = total;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_basic_operations() {
        let mut store = ChunkStore::new(3);
        assert!(!store.is_complete());
        assert_eq!(store.missing_count(), 3);

        assert_eq!(store.insert(1, "AA"), Insert::Stored);
        assert_eq!(store.insert(1, "ZZ"), Insert::Duplicate);
        assert_eq!(store.received(), 1);
        assert!(store.contains(1));
        assert!(!store.contains(2));

        store.insert(2, "BB");
        store.insert(3, "CC");
        assert!(store.is_complete());
        assert!(store.missing().is_empty());
        assert_eq!(store.assemble().as_deref(), Some("AABBCC"));
    }

    #[test]
    fn test_out_of_range() {
        let mut store = ChunkStore::new(2);
        assert_eq!(store.insert(0, "x"), Insert::OutOfRange);
        assert_eq!(store.insert(3, "x"), Insert::OutOfRange);
        assert_eq!(store.received(), 0);
    }

    #[test]
    fn test_missing() {
        let mut store = ChunkStore::new(10);
        for seq in [1, 3, 6, 10] {
            store.insert(seq, "s");
        }
        assert_eq!(store.missing(), vec![2, 4, 5, 7, 8, 9]);
        assert_eq!(store.assemble(), None);
    }

    #[test]
    fn test_order_and_duplicates_do_not_matter() {
        let slices = ["one-", "two-", "three-", "four-", "five"];
        let mut in_order = ChunkStore::new(5);
        for (i, s) in slices.iter().enumerate() {
            in_order.insert(i as u32 + 1, s);
        }

        let mut shuffled = ChunkStore::new(5);
        for seq in [5, 2, 2, 4, 1, 5, 3, 1] {
            shuffled.insert(seq, slices[seq as usize - 1]);
        }

        assert_eq!(shuffled.assemble(), in_order.assemble());
        assert_eq!(shuffled.assemble().as_deref(), Some("one-two-three-four-five"));
    }

    #[test]
    fn test_empty_session_is_complete() {
        let store = ChunkStore::new(0);
        assert!(store.is_complete());
        assert_eq!(store.assemble().as_deref(), Some(""));
    }

    #[test]
    fn test_reset() {
        let mut store = ChunkStore::new(2);
        store.insert(1, "a");
        store.reset(4);
        assert_eq!(store.received(), 0);
        assert_eq!(store.total(), 4);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn test_any_permutation_with_repeats_assembles(
            order in Just((1..=8u32).collect::<Vec<_>>()).prop_shuffle(),
            repeats in prop::collection::vec((1..=8u32, any::<prop::sample::Index>()), 0..12),
        ) {
            let slices: Vec<String> = (1..=8).map(|seq| format!("<{seq}>")).collect();
            let mut arrivals = order;
            for (seq, at) in repeats {
                arrivals.insert(at.index(arrivals.len() + 1), seq);
            }

            let mut store = ChunkStore::new(8);
            for seq in arrivals {
                prop_assert_ne!(store.insert(seq, &slices[seq as usize - 1]), Insert::OutOfRange);
            }
            prop_assert!(store.is_complete());
            prop_assert_eq!(store.assemble(), Some(slices.concat()));
        }
    }
}
