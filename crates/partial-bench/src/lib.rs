//! Benchmark profiles and utilities for partial.
//!
//! - [`single_page_profile`]: one native page, the usual one-callback arena
//! - [`wide_profile`]: 64 pages for fill and drain sweeps
//! - [`sink`]: a callback cheap enough that the trampoline dominates

#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

use std::ffi::c_void;

use partial::{native_config, ArenaConfig};

/// Pages in [`wide_profile`].
pub const WIDE_PAGES: usize = 64;

/// One page laid out for the native template.
pub fn single_page_profile() -> ArenaConfig {
    native_config(1)
}

/// [`WIDE_PAGES`] pages laid out for the native template.
pub fn wide_profile() -> ArenaConfig {
    native_config(WIDE_PAGES)
}

/// Consumes the bound pointer without touching it.
pub extern "C" fn sink(data: *mut c_void) {
    std::hint::black_box(data);
}

/// `n` distinct, never-dereferenced data pointers.
pub fn data_pointers(n: usize) -> Vec<*mut c_void> {
    (1..=n).map(|i| (i * 16) as *mut c_void).collect()
}
