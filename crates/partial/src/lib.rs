//! Partial application for C callbacks that lack a user-data parameter.
//!
//! Many C APIs take a bare `void (*)(void)` callback: `atexit`, `signal`,
//! `glutDisplayFunc`. This crate binds a data pointer to a
//! `void (*)(void *)` function at runtime by writing a tiny function body
//! into executable memory. The result has the bare signature and calls the
//! original function with the bound pointer.
//!
//! # Quick start
//!
//! ```rust
//! use std::ffi::c_void;
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use partial::{native_arena, Trampoline};
//!
//! extern "C" fn bump(data: *mut c_void) {
//!     let counter = unsafe { &*(data as *const AtomicU32) };
//!     counter.fetch_add(1, Ordering::SeqCst);
//! }
//!
//! let arena = native_arena(1).unwrap();
//! let counter = AtomicU32::new(0);
//! let t = Trampoline::bind(&arena, bump, &counter as *const AtomicU32 as *mut c_void).unwrap();
//!
//! // `entry` has type `unsafe extern "C" fn()`, ready for a data-less API.
//! let entry = t.entry_point();
//! unsafe { entry() };
//! assert_eq!(counter.load(Ordering::SeqCst), 1);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`arena`] | `partial-arena` | Executable slot arena, bitmap, config |
//! | [`template`] | `partial-template` | Per-architecture templates and patching |
//!
//! # Safety model
//!
//! [`Trampoline`] borrows its arena, so the arena cannot be unmapped while a
//! trampoline exists. The raw [`EntryPoint`] it hands out is a plain function
//! pointer and carries no lifetime: calling it after release is undefined.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod error;
pub mod shared;
pub mod trampoline;

/// Executable slot arena (`partial-arena`).
pub use partial_arena as arena;

/// Trampoline templates and patching (`partial-template`).
pub use partial_template as template;

pub use error::BindError;
pub use partial_arena::{ArenaConfig, ArenaError, ExecArena};
pub use shared::{SharedArena, SharedTrampoline};
pub use trampoline::{
    native_arena, native_config, template_config, Callback, EntryPoint, RawTrampoline, Trampoline,
};

/// Common imports.
///
/// ```rust
/// use partial::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        native_arena, BindError, Callback, EntryPoint, ExecArena, SharedArena, Trampoline,
    };
}
