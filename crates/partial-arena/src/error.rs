//! Arena-specific error types.

use std::error::Error;
use std::fmt;

use crate::slot::SlotIndex;

/// Errors that can occur during arena operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArenaError {
    /// The operating system did not report a usable page size.
    PageSizeUnavailable,
    /// The executable mapping request was refused.
    MapFailed {
        /// Number of bytes requested.
        len: usize,
        /// `errno` reported by the mapping call.
        errno: i32,
    },
    /// The occupancy bitmap for this many slots could not be allocated.
    BitmapAllocFailed {
        /// Requested slot capacity.
        capacity: usize,
    },
    /// The arena configuration cannot produce a usable layout.
    InvalidConfig {
        /// Human-readable description of the violated constraint.
        reason: String,
    },
    /// A slot's computed address falls outside the mapped region.
    ///
    /// Unreachable with a validated config; checked on every access anyway.
    AddressOutOfRange {
        /// The slot whose address was computed.
        index: SlotIndex,
        /// Byte offset of the slot's last byte from the region base.
        offset: usize,
        /// Total mapped length in bytes.
        mapped_len: usize,
    },
    /// A raw byte range falls outside the mapped region.
    OutOfBounds {
        /// Start of the range.
        offset: usize,
        /// Length of the range.
        len: usize,
        /// Total mapped length in bytes.
        mapped_len: usize,
    },
    /// The slot is not currently allocated.
    SlotNotAllocated {
        /// The offending slot.
        index: SlotIndex,
    },
    /// The bytes to write do not fit in a single slot.
    PayloadTooLarge {
        /// Payload length in bytes.
        len: usize,
        /// Slot stride in bytes.
        stride: usize,
    },
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PageSizeUnavailable => write!(f, "native page size is unavailable"),
            Self::MapFailed { len, errno } => {
                write!(
                    f,
                    "failed to map {len} bytes of executable memory (errno {errno})"
                )
            }
            Self::BitmapAllocFailed { capacity } => {
                write!(f, "failed to allocate occupancy bitmap for {capacity} slots")
            }
            Self::InvalidConfig { reason } => write!(f, "invalid arena config: {reason}"),
            Self::AddressOutOfRange {
                index,
                offset,
                mapped_len,
            } => {
                write!(
                    f,
                    "slot {index} ends at offset {offset}, beyond mapped length {mapped_len}"
                )
            }
            Self::OutOfBounds {
                offset,
                len,
                mapped_len,
            } => {
                write!(
                    f,
                    "byte range {offset}+{len} exceeds mapped length {mapped_len}"
                )
            }
            Self::SlotNotAllocated { index } => write!(f, "slot {index} is not allocated"),
            Self::PayloadTooLarge { len, stride } => {
                write!(f, "payload of {len} bytes exceeds slot stride of {stride} bytes")
            }
        }
    }
}

impl Error for ArenaError {}
