//! Slot indices and per-slot location descriptors.
//!
//! A [`SlotIndex`] names one bit in the occupancy bitmap. A [`SlotLocation`]
//! resolves that index against a concrete page layout so the arena can turn
//! it into an address with a single bounds check.

use std::fmt;

/// Index of a slot in the arena's occupancy bitmap.
///
/// Indices are dense: slot `i` lives on page `i / slots_per_page`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotIndex(pub usize);

impl SlotIndex {
    /// The raw bitmap index.
    pub fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for SlotIndex {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

/// Where a slot lives within the mapped region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotLocation {
    /// Page number within the region.
    pub page: usize,
    /// Byte offset of the slot's first byte from the region base.
    pub offset: usize,
}

impl SlotLocation {
    /// Resolve `index` against a page layout.
    ///
    /// `offset = page_size * page + leading_offset + (index % slots_per_page) * stride`.
    /// Returns `None` on arithmetic overflow or if `slots_per_page` is zero.
    pub fn resolve(
        index: SlotIndex,
        page_size: usize,
        slots_per_page: usize,
        leading_offset: usize,
        stride: usize,
    ) -> Option<Self> {
        let page = index.0.checked_div(slots_per_page)?;
        let within = (index.0 % slots_per_page).checked_mul(stride)?;
        let offset = page_size
            .checked_mul(page)?
            .checked_add(leading_offset)?
            .checked_add(within)?;
        Some(Self { page, offset })
    }
}
