//! C ABI for the partial trampoline library.
//!
//! Arenas and trampolines live in global handle tables and are referred to
//! by opaque `u64` handles; `0` is never issued. Every function returns a
//! [`PartialStatus`] as `i32` and writes results through out-pointers.
//!
//! ```c
//! uint64_t arena, tramp;
//! void (*entry)(void);
//! partial_arena_create(1, &arena);
//! partial_trampoline_create(arena, on_exit, state, &tramp);
//! partial_trampoline_entry(tramp, &entry);
//! atexit(entry);
//! ```
//!
//! Destroying an arena invalidates every trampoline handle bound in it.
//! Entry pointers already handed out are not tracked: calling one after its
//! trampoline or arena is destroyed is undefined behavior.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

/// Run an FFI body, turning a panic into [`PartialStatus::Panicked`].
macro_rules! ffi_guard {
    ($body:block) => {
        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| -> i32 { $body })) {
            Ok(code) => code,
            Err(_) => {
                tracing::error!("panic caught at C ABI boundary");
                $crate::status::PartialStatus::Panicked as i32
            }
        }
    };
}

/// Lock a global table, returning [`PartialStatus::InternalError`] from the
/// enclosing function if the mutex is poisoned.
macro_rules! ffi_lock {
    ($mutex:expr) => {
        match $mutex.lock() {
            Ok(guard) => guard,
            Err(_) => return $crate::status::PartialStatus::InternalError as i32,
        }
    };
}

pub mod arena;
mod handle;
pub mod status;
pub mod trampoline;
pub mod types;

pub use arena::{
    partial_arena_create, partial_arena_create_with_offset, partial_arena_destroy,
    partial_arena_stats,
};
pub use status::PartialStatus;
pub use trampoline::{
    partial_template_info, partial_trampoline_create, partial_trampoline_destroy,
    partial_trampoline_entry,
};
pub use types::{PartialArenaStats, PartialTemplateInfo};
