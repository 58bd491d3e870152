//! Trampoline byte templates for the partial workspace.
//!
//! This is the leaf crate with zero internal dependencies. It defines the
//! machine-code template for each supported instruction set and the safe
//! patching step that fills a copy of it with a function address and a data
//! address. Writing the result into executable memory is `partial-arena`'s
//! job; nothing here touches raw memory.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod patch;
pub mod template;

pub use error::{PatchError, PatchSite};
pub use patch::PatchedTemplate;
pub use template::Template;
