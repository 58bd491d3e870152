//! Test utilities for partial development.
//!
//! Provides C-ABI callbacks that record the pointer they were called with,
//! so tests can invoke a generated trampoline and check exactly what reached
//! the target function.
//!
//! Recording is thread-local: a trampoline called on the test's own thread
//! reports back to that thread only, so parallel tests do not interfere.

#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::cell::Cell;
use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Which recording callback ran.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Which {
    Primary,
    Secondary,
}

/// One observed callback invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Call {
    pub which: Which,
    pub data: usize,
}

thread_local! {
    static LAST_CALL: Cell<Option<Call>> = const { Cell::new(None) };
    static CALL_COUNT: Cell<usize> = const { Cell::new(0) };
}

fn note(which: Which, data: *mut c_void) {
    LAST_CALL.with(|c| {
        c.set(Some(Call {
            which,
            data: data as usize,
        }))
    });
    CALL_COUNT.with(|c| c.set(c.get() + 1));
}

/// Records `data` as a [`Which::Primary`] call. Never dereferences it.
pub extern "C" fn record(data: *mut c_void) {
    note(Which::Primary, data);
}

/// Records `data` as a [`Which::Secondary`] call. Never dereferences it.
pub extern "C" fn record_alt(data: *mut c_void) {
    note(Which::Secondary, data);
}

/// Increments the `AtomicUsize` that `data` points to.
///
/// `data` must point to a live `AtomicUsize`.
pub extern "C" fn increment(data: *mut c_void) {
    // SAFETY: callers bind this only to pointers to a live AtomicUsize.
    let counter = unsafe { &*(data as *const AtomicUsize) };
    counter.fetch_add(1, Ordering::SeqCst);
}

/// The most recent recorded call on this thread.
pub fn last_call() -> Option<Call> {
    LAST_CALL.with(Cell::get)
}

/// Number of recorded calls on this thread since the last reset.
pub fn call_count() -> usize {
    CALL_COUNT.with(Cell::get)
}

/// Forget recorded calls on this thread.
pub fn reset_calls() {
    LAST_CALL.with(|c| c.set(None));
    CALL_COUNT.with(|c| c.set(0));
}

/// A data pointer value with non-zero upper 32 bits on 64-bit targets.
///
/// Only ever passed through; never dereferenced.
pub fn high_bit_pointer() -> *mut c_void {
    #[cfg(target_pointer_width = "64")]
    {
        0xDEAD_BEEF_0BAD_F00Du64 as usize as *mut c_void
    }
    #[cfg(not(target_pointer_width = "64"))]
    {
        0xDEAD_BEEFusize as *mut c_void
    }
}
