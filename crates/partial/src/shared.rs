//! Mutex-guarded arena for binding from several threads.
//!
//! [`ExecArena`] is `!Sync`: its bitmap scan-and-set and the slot write are
//! not atomic. [`SharedArena`] serializes both behind one lock. The slot
//! write ends in a release fence and the lock release publishes it, so an
//! entry point handed to another thread always sees complete code.

use std::ffi::c_void;
use std::sync::{Mutex, MutexGuard, PoisonError};

use partial_arena::{ArenaConfig, ArenaError, ExecArena, SlotIndex};

use crate::error::BindError;
use crate::trampoline::{native_config, Callback, EntryPoint, RawTrampoline};

/// An [`ExecArena`] that can be shared between threads.
#[derive(Debug)]
pub struct SharedArena {
    inner: Mutex<ExecArena>,
}

impl SharedArena {
    /// Map a new arena described by `config`.
    pub fn new(config: ArenaConfig) -> Result<Self, ArenaError> {
        Ok(Self::from_arena(ExecArena::new(config)?))
    }

    /// Map an arena of `page_count` pages laid out for the native template.
    pub fn native(page_count: usize) -> Result<Self, ArenaError> {
        Self::new(native_config(page_count))
    }

    /// Take ownership of an existing arena.
    pub fn from_arena(arena: ExecArena) -> Self {
        Self {
            inner: Mutex::new(arena),
        }
    }

    /// Generate a trampoline that calls `function(data)`.
    pub fn bind(
        &self,
        function: Callback,
        data: *mut c_void,
    ) -> Result<SharedTrampoline<'_>, BindError> {
        let raw = RawTrampoline::bind(&self.lock(), function, data)?;
        Ok(SharedTrampoline { arena: self, raw })
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    /// Number of slots currently allocated.
    pub fn live_slots(&self) -> usize {
        self.lock().live_slots()
    }

    /// Unwrap the inner arena.
    pub fn into_inner(self) -> ExecArena {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    // Poisoning is ignored: no bitmap update straddles a panic point.
    fn lock(&self) -> MutexGuard<'_, ExecArena> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A trampoline bound in a [`SharedArena`], released on drop.
#[derive(Debug)]
#[must_use]
pub struct SharedTrampoline<'a> {
    arena: &'a SharedArena,
    raw: RawTrampoline,
}

impl SharedTrampoline<'_> {
    /// The generated code as a callable.
    pub fn entry_point(&self) -> EntryPoint {
        self.raw.entry_point()
    }

    /// The arena slot holding this trampoline.
    pub fn slot(&self) -> SlotIndex {
        self.raw.slot()
    }

    /// Release the trampoline. Equivalent to dropping it.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for SharedTrampoline<'_> {
    fn drop(&mut self) {
        self.raw.free(&self.arena.lock());
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use partial_test_utils::increment;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn shared_arena_is_sync() {
        fn assert_sync<T: Send + Sync>() {}
        assert_sync::<SharedArena>();
        assert_sync::<SharedTrampoline<'static>>();
    }

    #[test]
    fn concurrent_binds_get_distinct_slots() {
        let arena = SharedArena::native(1).unwrap();
        let counter = AtomicUsize::new(0);
        let data = (&counter as *const AtomicUsize).cast_mut().cast::<c_void>() as usize;

        std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let arena = &arena;
                    s.spawn(move || {
                        let t = arena.bind(increment, data as *mut c_void).unwrap();
                        unsafe { (t.entry_point())() };
                        t
                    })
                })
                .collect();
            let trampolines: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            let mut slots: Vec<_> = trampolines.iter().map(|t| t.slot()).collect();
            slots.sort();
            slots.dedup();
            assert_eq!(slots.len(), 8);
        });

        assert_eq!(counter.load(Ordering::SeqCst), 8);
        assert_eq!(arena.live_slots(), 0);
    }

    #[test]
    fn entry_point_callable_from_another_thread() {
        let arena = SharedArena::native(1).unwrap();
        let counter = AtomicUsize::new(0);
        let t = arena
            .bind(increment, (&counter as *const AtomicUsize).cast_mut().cast())
            .unwrap();
        let entry = t.entry_point() as usize;
        std::thread::spawn(move || {
            let f: EntryPoint = unsafe { std::mem::transmute::<usize, EntryPoint>(entry) };
            unsafe { f() };
        })
        .join()
        .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        t.release();
    }

    #[test]
    fn into_inner_returns_arena() {
        let arena = SharedArena::native(2).unwrap();
        let capacity = arena.capacity();
        let inner = arena.into_inner();
        assert_eq!(inner.capacity(), capacity);
    }
}
