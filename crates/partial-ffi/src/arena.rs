//! Arena lifecycle FFI: create, destroy, stats.
//!
//! Lock order is `ARENAS` then the trampoline table, everywhere.

use std::sync::Mutex;

use indexmap::IndexSet;
use partial::{native_config, ArenaConfig, ExecArena};

use crate::handle::{Handle, HandleTable};
use crate::status::PartialStatus;
use crate::trampoline::trampolines;
use crate::types::PartialArenaStats;

/// An arena plus the trampoline handles currently bound in it.
pub(crate) struct ArenaRecord {
    pub(crate) arena: ExecArena,
    pub(crate) trampolines: IndexSet<Handle>,
}

static ARENAS: Mutex<HandleTable<ArenaRecord>> = Mutex::new(HandleTable::new());

pub(crate) fn arenas() -> &'static Mutex<HandleTable<ArenaRecord>> {
    &ARENAS
}

#[allow(unsafe_code)]
fn create(config: ArenaConfig, arena_out: *mut u64) -> i32 {
    if arena_out.is_null() || config.page_count == 0 {
        return PartialStatus::InvalidArgument as i32;
    }
    let arena = match ExecArena::new(config) {
        Ok(a) => a,
        Err(e) => {
            tracing::debug!(error = %e, "arena creation refused");
            return PartialStatus::from(&e) as i32;
        }
    };
    let handle = ffi_lock!(ARENAS).insert(ArenaRecord {
        arena,
        trampolines: IndexSet::new(),
    });
    // SAFETY: arena_out is non-null (checked above). Caller guarantees
    // it points to writable memory for a u64.
    unsafe { *arena_out = handle };
    PartialStatus::Ok as i32
}

/// Map an arena of `page_count` pages laid out for the native template.
///
/// On success writes the arena handle to `arena_out`. Returns
/// `InvalidArgument` for a null `arena_out` or zero `page_count`, and
/// `AllocationFailed` if the executable mapping is refused.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn partial_arena_create(page_count: usize, arena_out: *mut u64) -> i32 {
    ffi_guard!({ create(native_config(page_count), arena_out) })
}

/// Like [`partial_arena_create`], skipping `leading_offset` bytes at the
/// start of every page.
///
/// `leading_offset` must be a multiple of the template alignment and leave
/// room for at least one slot per page; otherwise returns `ConfigError`.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn partial_arena_create_with_offset(
    page_count: usize,
    leading_offset: usize,
    arena_out: *mut u64,
) -> i32 {
    ffi_guard!({
        create(
            native_config(page_count).with_leading_offset(leading_offset),
            arena_out,
        )
    })
}

/// Destroy an arena and unmap its memory.
///
/// Every trampoline handle bound in the arena becomes invalid. Returns
/// `InvalidHandle` if `arena` is unknown or already destroyed.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn partial_arena_destroy(arena: u64) -> i32 {
    ffi_guard!({
        let mut arenas = ffi_lock!(ARENAS);
        let mut table = ffi_lock!(trampolines());
        let Some(record) = arenas.remove(arena) else {
            return PartialStatus::InvalidHandle as i32;
        };
        for &handle in &record.trampolines {
            table.remove(handle);
        }
        let remaining = arenas.len();
        drop(table);
        drop(arenas);
        tracing::debug!(
            arena,
            bound = record.trampolines.len(),
            remaining,
            "arena destroyed through C ABI"
        );
        drop(record);
        PartialStatus::Ok as i32
    })
}

/// Write the layout and occupancy of `arena` to `stats_out`.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn partial_arena_stats(arena: u64, stats_out: *mut PartialArenaStats) -> i32 {
    ffi_guard!({
        if stats_out.is_null() {
            return PartialStatus::InvalidArgument as i32;
        }
        let arenas = ffi_lock!(ARENAS);
        let Some(record) = arenas.get(arena) else {
            return PartialStatus::InvalidHandle as i32;
        };
        let stats = PartialArenaStats::of(&record.arena);
        // SAFETY: stats_out is non-null (checked above). Caller guarantees
        // it points to a writable PartialArenaStats.
        unsafe { *stats_out = stats };
        PartialStatus::Ok as i32
    })
}
