//! Errors from binding a trampoline.

use std::error::Error;
use std::fmt;

use partial_arena::ArenaError;
use partial_template::PatchError;

/// Errors that can occur in [`Trampoline::bind`](crate::Trampoline::bind)
/// and its variants.
///
/// No slot is held by the arena when one of these is returned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BindError {
    /// Every slot in the arena is taken.
    Exhausted {
        /// The arena's total slot count.
        capacity: usize,
    },
    /// The arena rejected the slot address or write.
    Arena(ArenaError),
    /// The template could not be patched.
    Patch(PatchError),
    /// The slot address does not meet the template's alignment.
    ///
    /// The arena was configured with a layout that does not suit the
    /// native instruction set.
    Misaligned {
        /// The slot address.
        address: usize,
        /// Required alignment in bytes.
        align: usize,
    },
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted { capacity } => {
                write!(f, "arena exhausted: all {capacity} slots in use")
            }
            Self::Arena(e) => write!(f, "arena error: {e}"),
            Self::Patch(e) => write!(f, "template patch failed: {e}"),
            Self::Misaligned { address, align } => {
                write!(f, "slot address {address:#x} is not {align}-byte aligned")
            }
        }
    }
}

impl Error for BindError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Arena(e) => Some(e),
            Self::Patch(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ArenaError> for BindError {
    fn from(e: ArenaError) -> Self {
        Self::Arena(e)
    }
}

impl From<PatchError> for BindError {
    fn from(e: PatchError) -> Self {
        Self::Patch(e)
    }
}
