//! Trampoline FFI: create, destroy, entry lookup, template info.

use std::ffi::c_void;
use std::sync::Mutex;

use partial::RawTrampoline;
use partial_template::Template;

use crate::arena::arenas;
use crate::handle::{Handle, HandleTable};
use crate::status::PartialStatus;
use crate::types::PartialTemplateInfo;

/// A bound trampoline and the arena it lives in.
pub(crate) struct TrampolineRecord {
    arena: Handle,
    raw: RawTrampoline,
}

static TRAMPOLINES: Mutex<HandleTable<TrampolineRecord>> = Mutex::new(HandleTable::new());

pub(crate) fn trampolines() -> &'static Mutex<HandleTable<TrampolineRecord>> {
    &TRAMPOLINES
}

/// Bind `data` to `function` in `arena`.
///
/// On success writes the trampoline handle to `trampoline_out`. Returns
/// `Exhausted` when every slot is bound; the caller may create another
/// arena and retry there.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn partial_trampoline_create(
    arena: u64,
    function: Option<unsafe extern "C" fn(data: *mut c_void)>,
    data: *mut c_void,
    trampoline_out: *mut u64,
) -> i32 {
    ffi_guard!({
        if trampoline_out.is_null() {
            return PartialStatus::InvalidArgument as i32;
        }
        let Some(function) = function else {
            return PartialStatus::InvalidArgument as i32;
        };
        let mut arenas = ffi_lock!(arenas());
        let Some(record) = arenas.get_mut(arena) else {
            return PartialStatus::InvalidHandle as i32;
        };
        let raw = match RawTrampoline::bind(&record.arena, function, data) {
            Ok(raw) => raw,
            Err(e) => return PartialStatus::from(&e) as i32,
        };
        let handle = match TRAMPOLINES.lock() {
            Ok(mut table) => table.insert(TrampolineRecord { arena, raw }),
            Err(_) => {
                raw.release(&record.arena);
                return PartialStatus::InternalError as i32;
            }
        };
        record.trampolines.insert(handle);
        // SAFETY: trampoline_out is non-null (checked above). Caller
        // guarantees it points to writable memory for a u64.
        unsafe { *trampoline_out = handle };
        PartialStatus::Ok as i32
    })
}

/// Release a trampoline's slot back to its arena.
///
/// Returns `InvalidHandle` if the trampoline was already destroyed, or if
/// its arena was destroyed first.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn partial_trampoline_destroy(trampoline: u64) -> i32 {
    ffi_guard!({
        let mut arenas = ffi_lock!(arenas());
        let mut table = ffi_lock!(TRAMPOLINES);
        let Some(TrampolineRecord { arena, raw }) = table.remove(trampoline) else {
            return PartialStatus::InvalidHandle as i32;
        };
        match arenas.get_mut(arena) {
            Some(record) => {
                record.trampolines.swap_remove(&trampoline);
                raw.release(&record.arena);
                PartialStatus::Ok as i32
            }
            None => {
                tracing::warn!(trampoline, arena, "trampoline outlived its arena");
                PartialStatus::InternalError as i32
            }
        }
    })
}

/// Write the callable entry point of `trampoline` to `entry_out`.
///
/// The pointer stays valid until the trampoline or its arena is destroyed.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn partial_trampoline_entry(
    trampoline: u64,
    entry_out: *mut Option<unsafe extern "C" fn()>,
) -> i32 {
    ffi_guard!({
        if entry_out.is_null() {
            return PartialStatus::InvalidArgument as i32;
        }
        let table = ffi_lock!(TRAMPOLINES);
        let Some(record) = table.get(trampoline) else {
            return PartialStatus::InvalidHandle as i32;
        };
        let entry = record.raw.entry_point();
        // SAFETY: entry_out is non-null (checked above). Caller guarantees
        // it points to a writable function pointer.
        unsafe { *entry_out = Some(entry) };
        PartialStatus::Ok as i32
    })
}

/// Write the compiled-in template geometry to `info_out`.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn partial_template_info(info_out: *mut PartialTemplateInfo) -> i32 {
    ffi_guard!({
        if info_out.is_null() {
            return PartialStatus::InvalidArgument as i32;
        }
        // SAFETY: info_out is non-null (checked above). Caller guarantees
        // it points to a writable PartialTemplateInfo.
        unsafe { *info_out = PartialTemplateInfo::from(&Template::NATIVE) };
        PartialStatus::Ok as i32
    })
}
