//! The executable slot arena.
//!
//! [`ExecArena`] ties a mapped [`ExecRegion`] to a [`SlotBitmap`]: each bit
//! names a fixed-size slot at a computable address inside the region.
//!
//! The bitmap sits behind a `RefCell`, so allocation and release take `&self`
//! and an arena can be borrowed by many live trampolines at once. The
//! `RefCell` also makes the arena `!Sync`; sharing across threads goes through
//! a lock.

use std::cell::RefCell;
use std::ptr::NonNull;

use crate::bitmap::SlotBitmap;
use crate::config::ArenaConfig;
use crate::error::ArenaError;
use crate::region::{native_page_size, ExecRegion};
use crate::slot::{SlotIndex, SlotLocation};

/// A fixed-capacity arena of executable slots.
pub struct ExecArena {
    region: ExecRegion,
    occupancy: RefCell<SlotBitmap>,
    page_size: usize,
    page_count: usize,
    slots_per_page: usize,
    slot_stride: usize,
    leading_offset: usize,
}

impl ExecArena {
    /// Map a new arena described by `config`.
    ///
    /// Queries the native page size, validates the layout against it, builds
    /// the bitmap, then maps `page_size * page_count` RWX bytes. Nothing is
    /// left allocated if any step fails.
    pub fn new(config: ArenaConfig) -> Result<Self, ArenaError> {
        let page_size = native_page_size()?;
        config.validate(page_size)?;

        let slots_per_page = config.slots_per_page(page_size);
        let capacity = slots_per_page
            .checked_mul(config.page_count)
            .ok_or_else(|| ArenaError::InvalidConfig {
                reason: format!(
                    "{slots_per_page} slots per page × {} pages overflows",
                    config.page_count
                ),
            })?;
        let occupancy = SlotBitmap::try_new(capacity)?;

        // validate() already rejected overflow here.
        let mapped_len = page_size * config.page_count;
        let region = ExecRegion::map(mapped_len)?;

        tracing::debug!(
            page_size,
            page_count = config.page_count,
            slots_per_page,
            slot_stride = config.slot_stride(),
            leading_offset = config.leading_offset,
            capacity,
            "executable arena mapped"
        );

        Ok(Self {
            region,
            occupancy: RefCell::new(occupancy),
            page_size,
            page_count: config.page_count,
            slots_per_page,
            slot_stride: config.slot_stride(),
            leading_offset: config.leading_offset,
        })
    }

    /// Unmap the arena and release its bitmap.
    ///
    /// Equivalent to dropping it. Any entry point previously obtained from a
    /// slot in this arena must not be called afterwards.
    pub fn destroy(self) {
        drop(self);
    }

    /// Claim the lowest free slot.
    ///
    /// Returns `None` when the arena is saturated; that is a normal
    /// condition, not an error.
    pub fn allocate_slot(&self) -> Option<SlotIndex> {
        let index = self.occupancy.borrow_mut().alloc_first_fit();
        if let Some(index) = index {
            tracing::trace!(%index, "slot allocated");
        }
        index
    }

    /// Release a slot.
    ///
    /// Releasing a slot that is not allocated is a no-op.
    pub fn free_slot(&self, index: SlotIndex) {
        if self.occupancy.borrow_mut().clear(index) {
            tracing::trace!(%index, "slot freed");
        } else {
            tracing::debug!(%index, "free of unallocated slot ignored");
        }
    }

    /// Byte offset of a slot from the region base.
    ///
    /// Fails if the slot would start or end at or beyond the mapped region.
    pub fn slot_offset(&self, index: SlotIndex) -> Result<usize, ArenaError> {
        let mapped_len = self.region.len();
        let location = SlotLocation::resolve(
            index,
            self.page_size,
            self.slots_per_page,
            self.leading_offset,
            self.slot_stride,
        );
        match location {
            Some(loc) if loc.page < self.page_count => {
                match loc.offset.checked_add(self.slot_stride) {
                    Some(end) if end <= mapped_len => Ok(loc.offset),
                    _ => Err(ArenaError::AddressOutOfRange {
                        index,
                        offset: loc.offset.saturating_add(self.slot_stride),
                        mapped_len,
                    }),
                }
            }
            Some(loc) => Err(ArenaError::AddressOutOfRange {
                index,
                offset: loc.offset,
                mapped_len,
            }),
            None => Err(ArenaError::AddressOutOfRange {
                index,
                offset: usize::MAX,
                mapped_len,
            }),
        }
    }

    /// Address of a slot's first byte.
    pub fn slot_address(&self, index: SlotIndex) -> Result<NonNull<u8>, ArenaError> {
        let offset = self.slot_offset(index)?;
        let addr = self.region.base().as_ptr().wrapping_add(offset);
        NonNull::new(addr).ok_or(ArenaError::AddressOutOfRange {
            index,
            offset,
            mapped_len: self.region.len(),
        })
    }

    /// Copy `bytes` into an allocated slot and return the slot's address.
    ///
    /// The write is complete and fenced before this returns.
    pub fn write_slot(&self, index: SlotIndex, bytes: &[u8]) -> Result<NonNull<u8>, ArenaError> {
        if bytes.len() > self.slot_stride {
            return Err(ArenaError::PayloadTooLarge {
                len: bytes.len(),
                stride: self.slot_stride,
            });
        }
        if !self.is_allocated(index) {
            return Err(ArenaError::SlotNotAllocated { index });
        }
        let offset = self.slot_offset(index)?;
        self.region.write(offset, bytes)
    }

    /// Copy a slot's current bytes into `out`.
    ///
    /// Reads up to `out.len()` bytes; `out` must not be longer than a slot.
    pub fn read_slot(&self, index: SlotIndex, out: &mut [u8]) -> Result<(), ArenaError> {
        if out.len() > self.slot_stride {
            return Err(ArenaError::PayloadTooLarge {
                len: out.len(),
                stride: self.slot_stride,
            });
        }
        let offset = self.slot_offset(index)?;
        self.region.read(offset, out)
    }

    /// Whether a slot is currently allocated.
    pub fn is_allocated(&self, index: SlotIndex) -> bool {
        self.occupancy.borrow().is_set(index)
    }

    /// Whether `addr` points into this arena's mapping.
    pub fn contains(&self, addr: *const u8) -> bool {
        self.region.contains(addr)
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.occupancy.borrow().capacity()
    }

    /// Number of slots currently allocated.
    pub fn live_slots(&self) -> usize {
        self.occupancy.borrow().live()
    }

    /// Whether every slot is allocated.
    pub fn is_full(&self) -> bool {
        self.occupancy.borrow().is_full()
    }

    /// Native page size captured at creation.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of mapped pages.
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Slots carved from each page.
    pub fn slots_per_page(&self) -> usize {
        self.slots_per_page
    }

    /// Distance in bytes between consecutive slots.
    pub fn slot_stride(&self) -> usize {
        self.slot_stride
    }

    /// Bytes skipped at the start of each page.
    pub fn leading_offset(&self) -> usize {
        self.leading_offset
    }

    /// Total mapped bytes.
    pub fn mapped_len(&self) -> usize {
        self.region.len()
    }

    /// Heap bytes used by the occupancy bitmap.
    pub fn bitmap_bytes(&self) -> usize {
        self.occupancy.borrow().memory_bytes()
    }
}

impl Drop for ExecArena {
    fn drop(&mut self) {
        tracing::debug!(
            mapped_len = self.region.len(),
            live_slots = self.occupancy.get_mut().live(),
            "executable arena unmapped"
        );
    }
}

impl std::fmt::Debug for ExecArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecArena")
            .field("base", &self.region.base())
            .field("page_size", &self.page_size)
            .field("page_count", &self.page_count)
            .field("slots_per_page", &self.slots_per_page)
            .field("slot_stride", &self.slot_stride)
            .field("leading_offset", &self.leading_offset)
            .field("live_slots", &self.live_slots())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena(pages: usize, slot: usize) -> ExecArena {
        ExecArena::new(ArenaConfig::new(pages, slot)).unwrap()
    }

    #[test]
    fn create_and_destroy() {
        let a = arena(1, 28);
        assert_eq!(a.page_count(), 1);
        assert_eq!(a.mapped_len(), a.page_size());
        assert_eq!(a.live_slots(), 0);
        a.destroy();
    }

    #[test]
    fn capacity_is_slots_per_page_times_pages() {
        let a = arena(3, 28);
        assert_eq!(a.slots_per_page(), a.page_size() / 28);
        assert_eq!(a.capacity(), a.slots_per_page() * 3);
    }

    #[test]
    fn allocation_is_first_fit() {
        let a = arena(1, 28);
        assert_eq!(a.allocate_slot(), Some(SlotIndex(0)));
        assert_eq!(a.allocate_slot(), Some(SlotIndex(1)));
        a.free_slot(SlotIndex(0));
        assert_eq!(a.allocate_slot(), Some(SlotIndex(0)));
        assert_eq!(a.allocate_slot(), Some(SlotIndex(2)));
    }

    #[test]
    fn exhaustion_returns_none() {
        let a = arena(1, 28);
        for _ in 0..a.capacity() {
            assert!(a.allocate_slot().is_some());
        }
        assert!(a.is_full());
        assert_eq!(a.allocate_slot(), None);
    }

    #[test]
    fn every_slot_address_is_inside_region_and_distinct() {
        let a = arena(2, 28);
        let mut seen = std::collections::HashSet::new();
        for i in 0..a.capacity() {
            let addr = a.slot_address(SlotIndex(i)).unwrap();
            assert!(a.contains(addr.as_ptr()));
            assert!(a.contains(addr.as_ptr().wrapping_add(27)));
            assert!(seen.insert(addr.as_ptr() as usize));
        }
    }

    #[test]
    fn second_page_starts_at_page_boundary() {
        let a = arena(2, 28);
        let first = a.slot_offset(SlotIndex(0)).unwrap();
        let next_page = a.slot_offset(SlotIndex(a.slots_per_page())).unwrap();
        assert_eq!(first, 0);
        assert_eq!(next_page, a.page_size());
    }

    #[test]
    fn leading_offset_shifts_every_page() {
        let a = ExecArena::new(ArenaConfig::new(2, 28).with_leading_offset(1)).unwrap();
        assert_eq!(a.slot_offset(SlotIndex(0)).unwrap(), 1);
        assert_eq!(
            a.slot_offset(SlotIndex(a.slots_per_page())).unwrap(),
            a.page_size() + 1
        );
    }

    #[test]
    fn index_past_capacity_is_out_of_range() {
        let a = arena(1, 28);
        let err = a.slot_address(SlotIndex(a.capacity())).unwrap_err();
        assert!(matches!(err, ArenaError::AddressOutOfRange { .. }));
        let err = a.slot_address(SlotIndex(usize::MAX)).unwrap_err();
        assert!(matches!(err, ArenaError::AddressOutOfRange { .. }));
    }

    #[test]
    fn write_requires_allocated_slot() {
        let a = arena(1, 28);
        let err = a.write_slot(SlotIndex(0), &[0xC3]).unwrap_err();
        assert_eq!(err, ArenaError::SlotNotAllocated { index: SlotIndex(0) });
    }

    #[test]
    fn write_rejects_oversized_payload() {
        let a = arena(1, 4);
        let idx = a.allocate_slot().unwrap();
        let err = a.write_slot(idx, &[0; 5]).unwrap_err();
        assert_eq!(err, ArenaError::PayloadTooLarge { len: 5, stride: 4 });
    }

    #[test]
    fn write_then_read_slot() {
        let a = arena(1, 8);
        let _ = a.allocate_slot().unwrap();
        let idx = a.allocate_slot().unwrap();
        let addr = a.write_slot(idx, &[9, 8, 7, 6, 5, 4, 3, 2]).unwrap();
        assert_eq!(addr, a.slot_address(idx).unwrap());

        let mut buf = [0u8; 8];
        a.read_slot(idx, &mut buf).unwrap();
        assert_eq!(buf, [9, 8, 7, 6, 5, 4, 3, 2]);

        // Neighbouring slot untouched.
        a.read_slot(SlotIndex(0), &mut buf).unwrap();
        assert_eq!(buf, [0; 8]);
    }

    #[test]
    fn freed_slot_keeps_its_bytes_until_reuse() {
        let a = arena(1, 4);
        let idx = a.allocate_slot().unwrap();
        a.write_slot(idx, &[1, 2, 3, 4]).unwrap();
        a.free_slot(idx);
        assert!(!a.is_allocated(idx));

        let mut buf = [0u8; 4];
        a.read_slot(idx, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn double_free_is_noop() {
        let a = arena(1, 28);
        let idx = a.allocate_slot().unwrap();
        a.free_slot(idx);
        a.free_slot(idx);
        assert_eq!(a.live_slots(), 0);
    }

    #[test]
    fn invalid_config_maps_nothing() {
        let err = ExecArena::new(ArenaConfig::new(0, 28)).unwrap_err();
        assert!(matches!(err, ArenaError::InvalidConfig { .. }));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn unallocatable_bitmap_is_an_error() {
        let err = ExecArena::new(ArenaConfig::new(1usize << 44, 28)).unwrap_err();
        assert!(
            matches!(err, ArenaError::BitmapAllocFailed { .. }),
            "{err:?}"
        );
    }

    #[test]
    fn bitmap_sized_to_capacity() {
        let a = arena(1, 28);
        assert_eq!(a.bitmap_bytes(), a.capacity().div_ceil(64) * 8);
    }
}
