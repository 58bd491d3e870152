//! Trampoline generation and handle lifecycle.
//!
//! Binding claims an arena slot, patches a copy of [`Template::NATIVE`] with
//! the callback and data addresses, and copies the result into the slot.
//! The slot address, reinterpreted as a function pointer, is the entry point.
//!
//! ```text
//! unbound ──bind──▶ bound ──release/drop──▶ released
//! ```
//!
//! [`RawTrampoline`] is the lifetime-free form used across the C boundary;
//! [`Trampoline`] borrows its arena so the arena cannot be unmapped while
//! the handle is alive.

#![allow(unsafe_code)]

use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;

use partial_arena::{ArenaConfig, ArenaError, ExecArena, SlotIndex};
use partial_template::Template;

use crate::error::BindError;

/// A callback that receives the bound data pointer.
pub type Callback = unsafe extern "C" fn(data: *mut c_void);

/// A generated zero-argument entry point.
pub type EntryPoint = unsafe extern "C" fn();

/// Arena layout for `template`: one slot per template, aligned as the
/// instruction set requires.
pub fn template_config(template: &Template, page_count: usize) -> ArenaConfig {
    ArenaConfig::new(page_count, template.len()).with_slot_align(template.align)
}

/// [`template_config`] for [`Template::NATIVE`].
pub fn native_config(page_count: usize) -> ArenaConfig {
    template_config(&Template::NATIVE, page_count)
}

/// Map an arena of `page_count` pages laid out for the native template.
pub fn native_arena(page_count: usize) -> Result<ExecArena, ArenaError> {
    ExecArena::new(native_config(page_count))
}

/// A bound trampoline that does not track its arena.
///
/// The handle is the sole owner of its slot and cannot be copied, so it can
/// be released at most once. Releasing it against an arena other than the
/// one it was bound in is refused.
///
/// ```compile_fail
/// use partial::{native_arena, RawTrampoline};
///
/// extern "C" fn noop(_: *mut std::ffi::c_void) {}
///
/// let arena = native_arena(1).unwrap();
/// let raw = RawTrampoline::bind(&arena, noop, std::ptr::null_mut()).unwrap();
/// let stale = raw;
/// raw.release(&arena);
/// stale.release(&arena);
/// ```
#[derive(PartialEq, Eq)]
#[must_use]
pub struct RawTrampoline {
    slot: SlotIndex,
    entry: NonNull<u8>,
}

// SAFETY: a RawTrampoline is an index plus an address. It owns no memory and
// carries no thread-affine state; the code at `entry` was fully written and
// fenced before the value was constructed.
unsafe impl Send for RawTrampoline {}
unsafe impl Sync for RawTrampoline {}

impl RawTrampoline {
    /// Generate a trampoline in `arena` that calls `function(data)`.
    ///
    /// Fails with [`BindError::Exhausted`] when no slot is free. On any
    /// later failure the claimed slot is released before returning.
    pub fn bind(
        arena: &ExecArena,
        function: Callback,
        data: *mut c_void,
    ) -> Result<Self, BindError> {
        let Some(slot) = arena.allocate_slot() else {
            tracing::debug!(capacity = arena.capacity(), "bind refused: arena exhausted");
            return Err(BindError::Exhausted {
                capacity: arena.capacity(),
            });
        };
        match emit(arena, slot, function as usize, data as usize) {
            Ok(entry) => {
                tracing::trace!(
                    %slot,
                    entry = ?entry,
                    template = Template::NATIVE.name,
                    "trampoline bound"
                );
                Ok(Self { slot, entry })
            }
            Err(e) => {
                arena.free_slot(slot);
                Err(e)
            }
        }
    }

    /// The arena slot holding this trampoline.
    pub fn slot(&self) -> SlotIndex {
        self.slot
    }

    /// Address of the generated code.
    pub fn entry_address(&self) -> NonNull<u8> {
        self.entry
    }

    /// The generated code as a callable.
    ///
    /// Calling it is only sound while the slot is still allocated and the
    /// arena is still mapped.
    pub fn entry_point(&self) -> EntryPoint {
        // SAFETY: `entry` points at a complete, fenced copy of the native
        // template, which is a valid function body with the `extern "C" fn()`
        // signature. Data and function pointers have the same width on every
        // supported target.
        unsafe { std::mem::transmute::<*mut u8, EntryPoint>(self.entry.as_ptr()) }
    }

    /// Free the slot in `arena`. The generated bytes stay until reuse.
    ///
    /// If `arena` is not the arena this trampoline was bound in, nothing is
    /// freed and a warning is logged.
    pub fn release(self, arena: &ExecArena) {
        self.free(arena);
    }

    /// Whether `arena` holds this trampoline's code at its slot.
    pub fn is_bound_in(&self, arena: &ExecArena) -> bool {
        arena.contains(self.entry.as_ptr())
            && arena
                .slot_address(self.slot)
                .is_ok_and(|addr| addr == self.entry)
    }

    /// Free the slot unless `arena` is the wrong one. Returns whether the
    /// slot was freed.
    pub(crate) fn free(&self, arena: &ExecArena) -> bool {
        if !self.is_bound_in(arena) {
            tracing::warn!(
                slot = %self.slot,
                entry = ?self.entry,
                "release refused: trampoline is not bound in this arena"
            );
            return false;
        }
        debug_assert!(
            arena.is_allocated(self.slot),
            "releasing slot {} that is not allocated",
            self.slot
        );
        arena.free_slot(self.slot);
        tracing::trace!(slot = %self.slot, "trampoline released");
        true
    }
}

impl fmt::Debug for RawTrampoline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawTrampoline")
            .field("slot", &self.slot)
            .field("entry", &self.entry)
            .finish()
    }
}

/// Patch the native template and copy it into `slot`.
fn emit(
    arena: &ExecArena,
    slot: SlotIndex,
    function: usize,
    data: usize,
) -> Result<NonNull<u8>, BindError> {
    let template = Template::NATIVE;
    let address = arena.slot_address(slot)?.as_ptr() as usize;
    if address % template.align != 0 {
        return Err(BindError::Misaligned {
            address,
            align: template.align,
        });
    }
    let patched = template.patch(function, data)?;
    Ok(arena.write_slot(slot, patched.as_bytes())?)
}

/// A trampoline borrowed from its arena and released on drop.
#[must_use]
pub struct Trampoline<'a> {
    arena: &'a ExecArena,
    raw: RawTrampoline,
}

impl<'a> Trampoline<'a> {
    /// Generate a trampoline in `arena` that calls `function(data)`.
    pub fn bind(
        arena: &'a ExecArena,
        function: Callback,
        data: *mut c_void,
    ) -> Result<Self, BindError> {
        let raw = RawTrampoline::bind(arena, function, data)?;
        Ok(Self { arena, raw })
    }

    /// The generated code as a callable.
    ///
    /// The returned pointer is not tied to `self`'s lifetime; calling it
    /// after this trampoline is released is undefined behavior.
    pub fn entry_point(&self) -> EntryPoint {
        self.raw.entry_point()
    }

    /// Call the trampoline, which calls `function(data)`.
    ///
    /// # Safety
    ///
    /// Whatever `function` requires of `data` at bind time must still hold.
    pub unsafe fn call(&self) {
        // SAFETY: the slot is allocated and the arena mapped for as long as
        // `self` borrows it; the callback's own contract is the caller's.
        unsafe { (self.entry_point())() }
    }

    /// Address of the generated code.
    pub fn entry_address(&self) -> NonNull<u8> {
        self.raw.entry_address()
    }

    /// The arena slot holding this trampoline.
    pub fn slot(&self) -> SlotIndex {
        self.raw.slot()
    }

    /// The arena this trampoline lives in.
    pub fn arena(&self) -> &'a ExecArena {
        self.arena
    }

    /// Release the trampoline. Equivalent to dropping it.
    pub fn release(self) {
        drop(self);
    }

    /// Give up automatic release and return the lifetime-free handle.
    pub fn into_raw(self) -> RawTrampoline {
        let raw = RawTrampoline {
            slot: self.raw.slot,
            entry: self.raw.entry,
        };
        std::mem::forget(self);
        raw
    }
}

impl Drop for Trampoline<'_> {
    fn drop(&mut self) {
        self.raw.free(self.arena);
    }
}

impl fmt::Debug for Trampoline<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trampoline")
            .field("slot", &self.raw.slot)
            .field("entry", &self.raw.entry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use partial_test_utils::{last_call, record, record_alt, reset_calls, Call, Which};

    #[test]
    fn bind_and_call_forwards_data() {
        let arena = native_arena(1).unwrap();
        let mut value = 17u32;
        let data = (&mut value as *mut u32).cast::<c_void>();

        reset_calls();
        let t = Trampoline::bind(&arena, record, data).unwrap();
        unsafe { t.call() };
        assert_eq!(
            last_call(),
            Some(Call {
                which: Which::Primary,
                data: data as usize
            })
        );
    }

    #[test]
    fn slot_holds_patched_template() {
        let arena = native_arena(1).unwrap();
        let data = 0x1234usize as *mut c_void;
        let t = Trampoline::bind(&arena, record, data).unwrap();

        let expected = Template::NATIVE.patch(record as usize, data as usize).unwrap();
        let mut buf = vec![0u8; expected.len()];
        arena.read_slot(t.slot(), &mut buf).unwrap();
        assert_eq!(buf, expected.as_bytes());
    }

    #[test]
    fn entry_point_is_stable() {
        let arena = native_arena(1).unwrap();
        let t = Trampoline::bind(&arena, record, std::ptr::null_mut()).unwrap();
        let a = t.entry_point() as usize;
        let b = t.entry_point() as usize;
        assert_eq!(a, b);
        assert_eq!(a, t.entry_address().as_ptr() as usize);
        assert!(arena.contains(t.entry_address().as_ptr()));
    }

    #[test]
    fn drop_releases_slot() {
        let arena = native_arena(1).unwrap();
        {
            let _t = Trampoline::bind(&arena, record, std::ptr::null_mut()).unwrap();
            assert_eq!(arena.live_slots(), 1);
        }
        assert_eq!(arena.live_slots(), 0);
    }

    #[test]
    fn into_raw_keeps_slot_until_released() {
        let arena = native_arena(1).unwrap();
        let raw = Trampoline::bind(&arena, record_alt, std::ptr::null_mut())
            .unwrap()
            .into_raw();
        assert_eq!(arena.live_slots(), 1);
        raw.release(&arena);
        assert_eq!(arena.live_slots(), 0);
    }

    #[test]
    fn release_in_foreign_arena_is_refused() {
        let home = native_arena(1).unwrap();
        let other = native_arena(1).unwrap();
        let raw = RawTrampoline::bind(&home, record, std::ptr::null_mut()).unwrap();
        let neighbour = RawTrampoline::bind(&other, record_alt, std::ptr::null_mut()).unwrap();
        assert_eq!(raw.slot(), neighbour.slot());
        assert!(raw.is_bound_in(&home));
        assert!(!raw.is_bound_in(&other));

        raw.release(&other);
        assert!(other.is_allocated(neighbour.slot()));
        assert_eq!(other.live_slots(), 1);
        assert_eq!(home.live_slots(), 1);
        neighbour.release(&other);
        assert_eq!(other.live_slots(), 0);
    }

    #[test]
    fn reused_slot_survives_until_its_own_release() {
        let arena = native_arena(1).unwrap();
        let first = RawTrampoline::bind(&arena, record, 0x10 as *mut c_void).unwrap();
        let slot = first.slot();
        first.release(&arena);

        let live = Trampoline::bind(&arena, record_alt, 0x20 as *mut c_void).unwrap();
        assert_eq!(live.slot(), slot);
        let next = RawTrampoline::bind(&arena, record, 0x30 as *mut c_void).unwrap();
        assert_ne!(next.slot(), slot);

        reset_calls();
        unsafe { live.call() };
        assert_eq!(
            last_call(),
            Some(Call {
                which: Which::Secondary,
                data: 0x20
            })
        );
        next.release(&arena);
    }

    #[test]
    fn into_raw_handle_stays_bound() {
        let arena = native_arena(1).unwrap();
        let t = Trampoline::bind(&arena, record, std::ptr::null_mut()).unwrap();
        let (slot, entry) = (t.slot(), t.entry_address());
        let raw = t.into_raw();
        assert_eq!((raw.slot(), raw.entry_address()), (slot, entry));
        assert!(raw.is_bound_in(&arena));
        raw.release(&arena);
        assert!(!arena.is_allocated(slot));
    }

    #[test]
    fn exhausted_arena_refuses_bind() {
        let arena = native_arena(1).unwrap();
        let held: Vec<_> = (0..arena.capacity())
            .map(|_| RawTrampoline::bind(&arena, record, std::ptr::null_mut()).unwrap())
            .collect();
        let err = RawTrampoline::bind(&arena, record, std::ptr::null_mut()).unwrap_err();
        assert_eq!(
            err,
            BindError::Exhausted {
                capacity: arena.capacity()
            }
        );
        for t in held {
            t.release(&arena);
        }
    }

    #[test]
    fn undersized_slots_release_claimed_slot() {
        let arena = ExecArena::new(
            ArenaConfig::new(1, 4).with_slot_align(Template::NATIVE.align),
        )
        .unwrap();
        let err = RawTrampoline::bind(&arena, record, std::ptr::null_mut()).unwrap_err();
        assert!(matches!(
            err,
            BindError::Arena(ArenaError::PayloadTooLarge { .. })
        ));
        assert_eq!(arena.live_slots(), 0);
    }

    #[test]
    fn template_config_uses_template_geometry() {
        for template in partial_template::template::ALL {
            let config = template_config(template, 3);
            assert_eq!(config.page_count, 3);
            assert_eq!(config.slot_size, template.len());
            assert_eq!(config.slot_align, template.align);
        }
    }

    #[test]
    fn native_config_fits_template() {
        let config = native_config(2);
        assert_eq!(config.page_count, 2);
        assert!(config.slot_stride() >= Template::NATIVE.len());
        assert_eq!(config.slot_stride() % Template::NATIVE.align, 0);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn each_entry_forwards_its_own_data(first in any::<usize>(), second in any::<usize>()) {
                let arena = native_arena(1).unwrap();
                let a = Trampoline::bind(&arena, record, first as *mut c_void).unwrap();
                let b = Trampoline::bind(&arena, record_alt, second as *mut c_void).unwrap();
                prop_assert_ne!(a.slot(), b.slot());

                reset_calls();
                unsafe { a.call() };
                prop_assert_eq!(last_call(), Some(Call { which: Which::Primary, data: first }));
                unsafe { b.call() };
                prop_assert_eq!(last_call(), Some(Call { which: Which::Secondary, data: second }));
                unsafe { a.call() };
                prop_assert_eq!(last_call(), Some(Call { which: Which::Primary, data: first }));
            }

            #[test]
            fn rebinding_a_freed_slot_uses_the_new_pair(old in any::<usize>(), new in any::<usize>()) {
                let arena = native_arena(1).unwrap();
                let t = Trampoline::bind(&arena, record, old as *mut c_void).unwrap();
                let slot = t.slot();
                t.release();

                let t = Trampoline::bind(&arena, record_alt, new as *mut c_void).unwrap();
                prop_assert_eq!(t.slot(), slot);
                reset_calls();
                unsafe { t.call() };
                prop_assert_eq!(last_call(), Some(Call { which: Which::Secondary, data: new }));
            }
        }
    }
}
