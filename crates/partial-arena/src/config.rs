//! Arena configuration parameters.

use crate::error::ArenaError;

/// Configuration for an [`ExecArena`](crate::ExecArena).
///
/// Describes how many pages to map and how each page is carved into slots.
/// Validated against the native page size at construction; all values are
/// immutable after creation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArenaConfig {
    /// Number of pages to map. Must be at least 1.
    pub page_count: usize,

    /// Bytes of machine code stored per slot (the template length).
    pub slot_size: usize,

    /// Required alignment of each slot's first byte. Must be a power of two.
    ///
    /// Slots are laid out at a stride of `slot_size` rounded up to this value.
    pub slot_align: usize,

    /// Bytes skipped at the start of every page before the first slot.
    ///
    /// Must be a multiple of `slot_align`. Set to 1 to reproduce the classic
    /// libpartial layout on x86.
    pub leading_offset: usize,
}

impl ArenaConfig {
    /// Default page count.
    pub const DEFAULT_PAGE_COUNT: usize = 1;

    /// Default leading offset: slots start at the very beginning of each page.
    pub const DEFAULT_LEADING_OFFSET: usize = 0;

    /// Create a config for `page_count` pages of `slot_size`-byte slots.
    ///
    /// Uses byte alignment and no leading offset.
    pub fn new(page_count: usize, slot_size: usize) -> Self {
        Self {
            page_count,
            slot_size,
            slot_align: 1,
            leading_offset: Self::DEFAULT_LEADING_OFFSET,
        }
    }

    /// Set the slot alignment.
    pub fn with_slot_align(mut self, slot_align: usize) -> Self {
        self.slot_align = slot_align;
        self
    }

    /// Set the per-page leading offset.
    pub fn with_leading_offset(mut self, leading_offset: usize) -> Self {
        self.leading_offset = leading_offset;
        self
    }

    /// Distance in bytes between consecutive slots on a page.
    pub fn slot_stride(&self) -> usize {
        if self.slot_align.is_power_of_two() {
            self.slot_size.next_multiple_of(self.slot_align)
        } else {
            self.slot_size
        }
    }

    /// Number of slots that fit on a page of `page_size` bytes.
    ///
    /// Every slot, including its full stride, ends on or before the page
    /// boundary. Returns 0 if the config is degenerate.
    pub fn slots_per_page(&self, page_size: usize) -> usize {
        let stride = self.slot_stride();
        if stride == 0 {
            return 0;
        }
        page_size.saturating_sub(self.leading_offset) / stride
    }

    /// Check the config against a concrete page size.
    pub fn validate(&self, page_size: usize) -> Result<(), ArenaError> {
        if self.page_count == 0 {
            return Err(invalid("page_count must be at least 1"));
        }
        if self.slot_size == 0 {
            return Err(invalid("slot_size must be at least 1"));
        }
        if !self.slot_align.is_power_of_two() {
            return Err(invalid(format!(
                "slot_align {} is not a power of two",
                self.slot_align
            )));
        }
        if self.leading_offset % self.slot_align != 0 {
            return Err(invalid(format!(
                "leading_offset {} is not a multiple of slot_align {}",
                self.leading_offset, self.slot_align
            )));
        }
        if self.slots_per_page(page_size) == 0 {
            return Err(invalid(format!(
                "no {}-byte slot fits in a {page_size}-byte page after a {}-byte leading offset",
                self.slot_stride(),
                self.leading_offset
            )));
        }
        if page_size.checked_mul(self.page_count).is_none() {
            return Err(invalid(format!(
                "{} pages of {page_size} bytes overflow the address space",
                self.page_count
            )));
        }
        Ok(())
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PAGE_COUNT, 1)
    }
}

fn invalid(reason: impl Into<String>) -> ArenaError {
    ArenaError::InvalidConfig {
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classic_x86_64_layout() {
        let config = ArenaConfig::new(1, 28);
        assert_eq!(config.slot_stride(), 28);
        assert_eq!(config.slots_per_page(4096), 146);
        assert!(config.validate(4096).is_ok());
    }

    #[test]
    fn twenty_seven_byte_template_fits_151_per_page() {
        assert_eq!(ArenaConfig::new(1, 27).slots_per_page(4096), 151);
        assert_eq!(
            ArenaConfig::new(1, 27)
                .with_leading_offset(1)
                .slots_per_page(4096),
            151
        );
    }

    #[test]
    fn leading_offset_can_cost_a_slot() {
        // 4096 / 32 = 128 exactly; a 1-byte skip pushes the last slot over.
        let config = ArenaConfig::new(1, 32).with_leading_offset(1);
        assert_eq!(config.slots_per_page(4096), 127);
    }

    #[test]
    fn stride_rounds_up_to_alignment() {
        let config = ArenaConfig::new(1, 22).with_slot_align(4);
        assert_eq!(config.slot_stride(), 24);
    }

    #[test]
    fn zero_pages_rejected() {
        let err = ArenaConfig::new(0, 28).validate(4096).unwrap_err();
        assert!(matches!(err, ArenaError::InvalidConfig { .. }));
    }

    #[test]
    fn misaligned_leading_offset_rejected() {
        let config = ArenaConfig::new(1, 40)
            .with_slot_align(4)
            .with_leading_offset(1);
        assert!(matches!(
            config.validate(4096),
            Err(ArenaError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn non_power_of_two_alignment_rejected() {
        let config = ArenaConfig::new(1, 28).with_slot_align(3);
        assert!(config.validate(4096).is_err());
    }

    #[test]
    fn slot_larger_than_page_rejected() {
        let config = ArenaConfig::new(1, 8192);
        assert!(config.validate(4096).is_err());
    }

    #[test]
    fn page_count_overflow_rejected() {
        let config = ArenaConfig::new(usize::MAX, 28);
        assert!(config.validate(4096).is_err());
    }
}
