//! Off-arena patch buffer.
//!
//! A [`PatchedTemplate`] is a private copy of a template's bytes with its
//! placeholders filled. It is built entirely in ordinary memory, so the only
//! write to executable memory is a single copy of the finished bytes.

use smallvec::SmallVec;

use crate::error::{PatchError, PatchSite};
use crate::template::Template;

/// Inline capacity covers every built-in template without spilling.
const INLINE: usize = 64;

/// A template copy with both placeholders written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatchedTemplate {
    bytes: SmallVec<[u8; INLINE]>,
    function_offset: usize,
    data_offset: usize,
    pointer_width: usize,
}

impl PatchedTemplate {
    pub(crate) fn copy_of(template: &Template) -> Self {
        Self {
            bytes: SmallVec::from_slice(template.bytes),
            function_offset: template.function_offset,
            data_offset: template.data_offset,
            pointer_width: template.pointer_width,
        }
    }

    /// Write `value` into the placeholder at `offset`, using every byte of
    /// the template's pointer width.
    pub(crate) fn write_pointer(
        &mut self,
        site: PatchSite,
        offset: usize,
        value: usize,
    ) -> Result<(), PatchError> {
        let width = self.pointer_width;
        let value64 = value as u64;
        if width < 8 && value64 >> (width * 8) != 0 {
            return Err(PatchError::ValueTooWide { site, value, width });
        }
        let end = offset
            .checked_add(width)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(PatchError::OffsetOutOfBounds {
                site,
                offset,
                len: self.bytes.len(),
            })?;
        self.bytes[offset..end].copy_from_slice(&value64.to_le_bytes()[..width]);
        Ok(())
    }

    /// The finished bytes, ready to copy into a slot.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Decode the function address back out of the bytes.
    pub fn function(&self) -> usize {
        self.read_pointer(self.function_offset)
    }

    /// Decode the data address back out of the bytes.
    pub fn data(&self) -> usize {
        self.read_pointer(self.data_offset)
    }

    fn read_pointer(&self, offset: usize) -> usize {
        let mut raw = [0u8; 8];
        raw[..self.pointer_width]
            .copy_from_slice(&self.bytes[offset..offset + self.pointer_width]);
        u64::from_le_bytes(raw) as usize
    }
}

impl AsRef<[u8]> for PatchedTemplate {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}
