//! `repr(C)` structs filled through out-pointers.

use partial::ExecArena;
use partial_template::Template;

/// Layout and occupancy of one arena.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PartialArenaStats {
    /// Total number of slots.
    pub capacity: u64,
    /// Slots currently bound.
    pub live_slots: u64,
    /// Native page size in bytes.
    pub page_size: u64,
    /// Pages in the mapping.
    pub page_count: u64,
    /// Slots that fit in one page.
    pub slots_per_page: u64,
    /// Distance between consecutive slots in bytes.
    pub slot_stride: u64,
    /// Bytes skipped at the start of each page.
    pub leading_offset: u64,
    /// Total mapped bytes.
    pub mapped_bytes: u64,
}

const _: () = assert!(std::mem::size_of::<PartialArenaStats>() == 64);
const _: () = assert!(std::mem::align_of::<PartialArenaStats>() == 8);

impl PartialArenaStats {
    pub(crate) fn of(arena: &ExecArena) -> Self {
        Self {
            capacity: arena.capacity() as u64,
            live_slots: arena.live_slots() as u64,
            page_size: arena.page_size() as u64,
            page_count: arena.page_count() as u64,
            slots_per_page: arena.slots_per_page() as u64,
            slot_stride: arena.slot_stride() as u64,
            leading_offset: arena.leading_offset() as u64,
            mapped_bytes: arena.mapped_len() as u64,
        }
    }
}

/// Geometry of the compiled-in trampoline template.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PartialTemplateInfo {
    /// Template length in bytes.
    pub size: u32,
    /// Offset of the function pointer placeholder.
    pub function_offset: u32,
    /// Offset of the data pointer placeholder.
    pub data_offset: u32,
    /// Width of each patched pointer in bytes.
    pub pointer_width: u32,
    /// Required alignment of the template start.
    pub align: u32,
}

const _: () = assert!(std::mem::size_of::<PartialTemplateInfo>() == 20);
const _: () = assert!(std::mem::align_of::<PartialTemplateInfo>() == 4);

impl From<&Template> for PartialTemplateInfo {
    fn from(t: &Template) -> Self {
        Self {
            size: t.len() as u32,
            function_offset: t.function_offset as u32,
            data_offset: t.data_offset as u32,
            pointer_width: t.pointer_width as u32,
            align: t.align as u32,
        }
    }
}
