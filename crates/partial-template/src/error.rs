//! Error types for template validation and patching.

use std::error::Error;
use std::fmt;

/// Which of the two pointer placeholders an error refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchSite {
    /// The target function address.
    Function,
    /// The bound data address.
    Data,
}

impl fmt::Display for PatchSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function => write!(f, "function"),
            Self::Data => write!(f, "data"),
        }
    }
}

/// Errors from checking or patching a [`Template`](crate::Template).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PatchError {
    /// A placeholder extends past the end of the template bytes.
    OffsetOutOfBounds {
        /// The placeholder that does not fit.
        site: PatchSite,
        /// Its byte offset.
        offset: usize,
        /// Template length in bytes.
        len: usize,
    },
    /// The two placeholders overlap.
    OverlappingSites {
        /// Function placeholder offset.
        function_offset: usize,
        /// Data placeholder offset.
        data_offset: usize,
    },
    /// The template's pointer width is not 4 or 8 bytes.
    UnsupportedPointerWidth {
        /// The declared width.
        width: usize,
    },
    /// The template's alignment is not a power of two.
    InvalidAlignment {
        /// The declared alignment.
        align: usize,
    },
    /// A value does not fit in the template's pointer width.
    ValueTooWide {
        /// The placeholder being patched.
        site: PatchSite,
        /// The value that was rejected.
        value: usize,
        /// The template's pointer width in bytes.
        width: usize,
    },
}

impl fmt::Display for PatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OffsetOutOfBounds { site, offset, len } => {
                write!(
                    f,
                    "{site} placeholder at offset {offset} does not fit in a {len}-byte template"
                )
            }
            Self::OverlappingSites {
                function_offset,
                data_offset,
            } => {
                write!(
                    f,
                    "function placeholder at {function_offset} overlaps data placeholder at {data_offset}"
                )
            }
            Self::UnsupportedPointerWidth { width } => {
                write!(f, "unsupported pointer width: {width} bytes")
            }
            Self::InvalidAlignment { align } => {
                write!(f, "template alignment {align} is not a power of two")
            }
            Self::ValueTooWide { site, value, width } => {
                write!(f, "{site} value {value:#x} does not fit in {width} bytes")
            }
        }
    }
}

impl Error for PatchError {}
