//! Fixed-capacity occupancy bitmap with first-fit allocation.
//!
//! [`SlotBitmap`] knows nothing about executable memory: it only tracks which
//! of `capacity` slots are taken. Bits past `capacity` in the final word are
//! never handed out.

use crate::error::ArenaError;
use crate::slot::SlotIndex;

const WORD_BITS: usize = u64::BITS as usize;

/// Occupancy bitmap. A set bit means the slot is allocated.
#[derive(Clone, Debug)]
pub struct SlotBitmap {
    words: Vec<u64>,
    capacity: usize,
    live: usize,
}

impl SlotBitmap {
    /// Create an all-clear bitmap for `capacity` slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity.div_ceil(WORD_BITS)],
            capacity,
            live: 0,
        }
    }

    /// Like [`new`](Self::new), but reports an allocation failure instead of
    /// aborting.
    pub fn try_new(capacity: usize) -> Result<Self, ArenaError> {
        let len = capacity.div_ceil(WORD_BITS);
        let mut words = Vec::new();
        words
            .try_reserve_exact(len)
            .map_err(|_| ArenaError::BitmapAllocFailed { capacity })?;
        words.resize(len, 0);
        Ok(Self {
            words,
            capacity,
            live: 0,
        })
    }

    /// Claim the lowest clear bit, scanning word-major then bit-minor.
    ///
    /// Returns `None` when every slot is taken.
    pub fn alloc_first_fit(&mut self) -> Option<SlotIndex> {
        for (w, word) in self.words.iter_mut().enumerate() {
            if *word == u64::MAX {
                continue;
            }
            let bit = word.trailing_ones() as usize;
            let index = w * WORD_BITS + bit;
            if index >= self.capacity {
                // Only the tail word can have clear bits past capacity, and
                // every bit below them is already set.
                return None;
            }
            *word |= 1 << bit;
            self.live += 1;
            return Some(SlotIndex(index));
        }
        None
    }

    /// Set a specific bit. Returns `false` if it was already set or is out of range.
    pub fn set(&mut self, index: SlotIndex) -> bool {
        let Some((w, mask)) = self.locate(index) else {
            return false;
        };
        if self.words[w] & mask != 0 {
            return false;
        }
        self.words[w] |= mask;
        self.live += 1;
        true
    }

    /// Clear a bit. Returns `false` if it was already clear or is out of range.
    pub fn clear(&mut self, index: SlotIndex) -> bool {
        let Some((w, mask)) = self.locate(index) else {
            return false;
        };
        if self.words[w] & mask == 0 {
            return false;
        }
        self.words[w] &= !mask;
        self.live -= 1;
        true
    }

    /// Whether the bit for `index` is set.
    pub fn is_set(&self, index: SlotIndex) -> bool {
        self.locate(index)
            .is_some_and(|(w, mask)| self.words[w] & mask != 0)
    }

    /// Number of slots tracked.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of set bits.
    pub fn live(&self) -> usize {
        self.live
    }

    /// Whether every slot is taken.
    pub fn is_full(&self) -> bool {
        self.live == self.capacity
    }

    /// Heap bytes used by the bitmap words.
    pub fn memory_bytes(&self) -> usize {
        self.words.len() * std::mem::size_of::<u64>()
    }

    fn locate(&self, index: SlotIndex) -> Option<(usize, u64)> {
        if index.0 >= self.capacity {
            return None;
        }
        Some((index.0 / WORD_BITS, 1u64 << (index.0 % WORD_BITS)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_bitmap_is_empty() {
        let bm = SlotBitmap::new(100);
        assert_eq!(bm.capacity(), 100);
        assert_eq!(bm.live(), 0);
        assert_eq!(bm.memory_bytes(), 16);
    }

    #[test]
    fn try_new_matches_new() {
        let bm = SlotBitmap::try_new(100).unwrap();
        assert_eq!(bm.capacity(), 100);
        assert_eq!(bm.live(), 0);
        assert_eq!(bm.memory_bytes(), SlotBitmap::new(100).memory_bytes());
    }

    #[test]
    fn try_new_reports_unallocatable_capacity() {
        assert_eq!(
            SlotBitmap::try_new(usize::MAX).unwrap_err(),
            ArenaError::BitmapAllocFailed {
                capacity: usize::MAX
            }
        );
    }

    #[test]
    fn first_fit_is_sequential() {
        let mut bm = SlotBitmap::new(10);
        for i in 0..10 {
            assert_eq!(bm.alloc_first_fit(), Some(SlotIndex(i)));
        }
        assert!(bm.is_full());
    }

    #[test]
    fn exhaustion_returns_none() {
        let mut bm = SlotBitmap::new(3);
        bm.alloc_first_fit().unwrap();
        bm.alloc_first_fit().unwrap();
        bm.alloc_first_fit().unwrap();
        assert_eq!(bm.alloc_first_fit(), None);
    }

    #[test]
    fn tail_bits_past_capacity_are_never_allocated() {
        // 65 slots span two words; the second word has 63 unusable bits.
        let mut bm = SlotBitmap::new(65);
        for _ in 0..65 {
            assert!(bm.alloc_first_fit().is_some());
        }
        assert_eq!(bm.alloc_first_fit(), None);
        assert_eq!(bm.live(), 65);
    }

    #[test]
    fn freed_lowest_slot_is_reused_first() {
        let mut bm = SlotBitmap::new(200);
        for _ in 0..130 {
            bm.alloc_first_fit().unwrap();
        }
        assert!(bm.clear(SlotIndex(100)));
        assert!(bm.clear(SlotIndex(5)));
        assert_eq!(bm.alloc_first_fit(), Some(SlotIndex(5)));
        assert_eq!(bm.alloc_first_fit(), Some(SlotIndex(100)));
        assert_eq!(bm.alloc_first_fit(), Some(SlotIndex(130)));
    }

    #[test]
    fn clear_of_clear_bit_is_noop() {
        let mut bm = SlotBitmap::new(8);
        assert!(!bm.clear(SlotIndex(3)));
        assert_eq!(bm.live(), 0);
    }

    #[test]
    fn out_of_range_is_rejected() {
        let mut bm = SlotBitmap::new(8);
        assert!(!bm.set(SlotIndex(8)));
        assert!(!bm.clear(SlotIndex(8)));
        assert!(!bm.is_set(SlotIndex(8)));
    }

    #[test]
    fn set_then_first_fit_skips_it() {
        let mut bm = SlotBitmap::new(8);
        assert!(bm.set(SlotIndex(0)));
        assert!(!bm.set(SlotIndex(0)));
        assert_eq!(bm.alloc_first_fit(), Some(SlotIndex(1)));
    }

    #[test]
    fn zero_capacity_never_allocates() {
        let mut bm = SlotBitmap::new(0);
        assert_eq!(bm.alloc_first_fit(), None);
        assert!(bm.is_full());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn first_fit_returns_lowest_clear_bit(
                capacity in 1usize..300,
                frees in proptest::collection::vec(0usize..300, 0..40),
            ) {
                let mut bm = SlotBitmap::new(capacity);
                while bm.alloc_first_fit().is_some() {}
                let mut cleared = std::collections::BTreeSet::new();
                for f in frees {
                    if f < capacity && bm.clear(SlotIndex(f)) {
                        cleared.insert(f);
                    }
                }
                for expected in cleared {
                    prop_assert_eq!(bm.alloc_first_fit(), Some(SlotIndex(expected)));
                }
                prop_assert_eq!(bm.alloc_first_fit(), None);
            }

            #[test]
            fn live_matches_set_bits(
                ops in proptest::collection::vec((any::<bool>(), 0usize..128), 1..100),
            ) {
                let mut bm = SlotBitmap::new(128);
                for (alloc, idx) in ops {
                    if alloc {
                        let _ = bm.alloc_first_fit();
                    } else {
                        bm.clear(SlotIndex(idx));
                    }
                }
                let counted = (0..128).filter(|&i| bm.is_set(SlotIndex(i))).count();
                prop_assert_eq!(bm.live(), counted);
            }
        }
    }
}
