//! C-compatible status codes.
//!
//! [`PartialStatus`] is returned by every exported function. Conversions
//! from [`ArenaError`] and [`BindError`] give each Rust error one code.

use partial::BindError;
use partial_arena::ArenaError;

/// C-compatible status code returned by all FFI functions.
///
/// `Ok` = 0, all errors are negative. Values are ABI-stable.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartialStatus {
    /// Success.
    Ok = 0,
    /// Handle is invalid, was already destroyed, or belonged to a destroyed
    /// arena.
    InvalidHandle = -1,
    /// An argument is null, out of range, or otherwise invalid.
    InvalidArgument = -2,
    /// Every slot in the arena is bound.
    Exhausted = -3,
    /// The page size query or the executable mapping failed.
    AllocationFailed = -4,
    /// A slot address fell outside the mapped region.
    AddressOutOfRange = -5,
    /// The arena layout cannot hold a trampoline.
    ConfigError = -6,
    /// Internal error (e.g. poisoned mutex after a prior panic).
    InternalError = -7,
    /// A Rust panic was caught at the FFI boundary.
    Panicked = -128,
}

impl From<&ArenaError> for PartialStatus {
    fn from(e: &ArenaError) -> Self {
        match e {
            ArenaError::PageSizeUnavailable
            | ArenaError::MapFailed { .. }
            | ArenaError::BitmapAllocFailed { .. } => PartialStatus::AllocationFailed,
            ArenaError::InvalidConfig { .. } | ArenaError::PayloadTooLarge { .. } => {
                PartialStatus::ConfigError
            }
            ArenaError::AddressOutOfRange { .. } | ArenaError::OutOfBounds { .. } => {
                PartialStatus::AddressOutOfRange
            }
            ArenaError::SlotNotAllocated { .. } => PartialStatus::InternalError,
        }
    }
}

impl From<&BindError> for PartialStatus {
    fn from(e: &BindError) -> Self {
        match e {
            BindError::Exhausted { .. } => PartialStatus::Exhausted,
            BindError::Arena(inner) => PartialStatus::from(inner),
            BindError::Misaligned { .. } => PartialStatus::ConfigError,
            BindError::Patch(_) => PartialStatus::InternalError,
        }
    }
}
