//! Executable-memory slot arena for runtime-generated trampolines.
//!
//! Maps a fixed number of read/write/execute pages and carves them into
//! equally sized slots, one per generated function body. Occupancy is
//! tracked with a first-fit bitmap. This crate is one of two that may
//! contain `unsafe` code (along with `partial`), and keeps it confined to
//! `region.rs`.
//!
//! # Architecture
//!
//! ```text
//! ExecArena
//! ├── ExecRegion (mmap'd RWX bytes, page_size × page_count, unmapped on drop)
//! ├── RefCell<SlotBitmap> (one bit per slot, first-fit, word-major)
//! └── layout (page_size, slots_per_page, slot_stride, leading_offset)
//! ```
//!
//! # Page layout
//!
//! ```text
//! page k: [leading_offset][slot 0][slot 1]...[slot n-1][tail]
//! ```
//!
//! Slot `i` lives on page `i / slots_per_page`. Every slot, including its
//! full stride, ends before the next page starts.
//!
//! # Threading
//!
//! [`ExecArena`] is `Send` but not `Sync`. Wrap it in a lock to share it.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

#[cfg(not(unix))]
compile_error!("partial-arena maps executable memory with mmap and requires a unix target");

pub mod arena;
pub mod bitmap;
pub mod config;
pub mod error;
pub mod region;
pub mod slot;

// Public re-exports for the primary API surface.
pub use arena::ExecArena;
pub use bitmap::SlotBitmap;
pub use config::ArenaConfig;
pub use error::ArenaError;
pub use region::native_page_size;
pub use slot::SlotIndex;
