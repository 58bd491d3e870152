//! Per-architecture trampoline templates.
//!
//! Each template is a complete function body with two zeroed pointer-sized
//! placeholders. Filling them with a target function address and a data
//! address yields a zero-argument function that calls
//! `target(data)` under the platform's C calling convention.
//!
//! Every supported instruction set encodes immediates and literal pool
//! entries little-endian, matching the native byte order of its targets.

use crate::error::{PatchError, PatchSite};
use crate::patch::PatchedTemplate;

/// A machine-code template with two pointer placeholders.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Template {
    /// Instruction-set name, for logs and diagnostics.
    pub name: &'static str,
    /// Template bytes with zeroed placeholders.
    pub bytes: &'static [u8],
    /// Offset of the target-function placeholder.
    pub function_offset: usize,
    /// Offset of the bound-data placeholder.
    pub data_offset: usize,
    /// Placeholder width in bytes (the target's pointer width).
    pub pointer_width: usize,
    /// Required alignment of the template's first byte.
    pub align: usize,
}

/// x86-64 System V.
///
/// ```text
///  0: 55                      push %rbp
///  1: 48 89 e5                mov  %rsp,%rbp
///  4: 48 b8 <fn:8>            movabs $fn,%rax
/// 14: 48 bf <data:8>          movabs $data,%rdi
/// 24: ff d0                   call *%rax
/// 26: 5d                      pop  %rbp
/// 27: c3                      ret
/// ```
pub const X86_64_SYSV: Template = Template {
    name: "x86_64-sysv",
    bytes: &[
        0x55, //
        0x48, 0x89, 0xE5, //
        0x48, 0xB8, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
        0x48, 0xBF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
        0xFF, 0xD0, //
        0x5D, //
        0xC3,
    ],
    function_offset: 6,
    data_offset: 16,
    pointer_width: 8,
    align: 1,
};

/// 32-bit x86 cdecl. The argument goes on the stack; `sub $0x18` keeps the
/// callee's stack 16-byte aligned.
///
/// ```text
///  0: 55                      push %ebp
///  1: 89 e5                   mov  %esp,%ebp
///  3: 83 ec 18                sub  $0x18,%esp
///  6: c7 04 24 <data:4>       movl $data,(%esp)
/// 13: b8 <fn:4>               mov  $fn,%eax
/// 18: ff d0                   call *%eax
/// 20: c9                      leave
/// 21: c3                      ret
/// ```
pub const X86_CDECL: Template = Template {
    name: "x86-cdecl",
    bytes: &[
        0x55, //
        0x89, 0xE5, //
        0x83, 0xEC, 0x18, //
        0xC7, 0x04, 0x24, 0x00, 0x00, 0x00, 0x00, //
        0xB8, 0x00, 0x00, 0x00, 0x00, //
        0xFF, 0xD0, //
        0xC9, //
        0xC3,
    ],
    function_offset: 14,
    data_offset: 9,
    pointer_width: 4,
    align: 1,
};

/// AArch64 AAPCS64. Both addresses sit in a literal pool after the code.
///
/// ```text
///  0: a9bf7bfd                stp x29, x30, [sp, #-16]!
///  4: 580000b0                ldr x16, #20      ; -> 24
///  8: 580000c0                ldr x0, #24       ; -> 32
/// 12: d63f0200                blr x16
/// 16: a8c17bfd                ldp x29, x30, [sp], #16
/// 20: d65f03c0                ret
/// 24: <fn:8>
/// 32: <data:8>
/// ```
pub const AARCH64_AAPCS: Template = Template {
    name: "aarch64-aapcs64",
    bytes: &[
        0xFD, 0x7B, 0xBF, 0xA9, //
        0xB0, 0x00, 0x00, 0x58, //
        0xC0, 0x00, 0x00, 0x58, //
        0x00, 0x02, 0x3F, 0xD6, //
        0xFD, 0x7B, 0xC1, 0xA8, //
        0xC0, 0x03, 0x5F, 0xD6, //
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ],
    function_offset: 24,
    data_offset: 32,
    pointer_width: 8,
    align: 4,
};

/// Every template known to this crate, native or not.
pub const ALL: &[Template] = &[X86_64_SYSV, X86_CDECL, AARCH64_AAPCS];

impl Template {
    /// The template for the compilation target.
    #[cfg(all(target_arch = "x86_64", not(windows)))]
    pub const NATIVE: Template = X86_64_SYSV;

    /// The template for the compilation target.
    #[cfg(target_arch = "x86")]
    pub const NATIVE: Template = X86_CDECL;

    /// The template for the compilation target.
    #[cfg(target_arch = "aarch64")]
    pub const NATIVE: Template = AARCH64_AAPCS;

    /// Template length in bytes.
    pub const fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the template has no bytes.
    pub const fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Structural check usable in `const` context.
    pub const fn is_well_formed(&self) -> bool {
        let len = self.bytes.len();
        let w = self.pointer_width;
        (w == 4 || w == 8)
            && self.align.is_power_of_two()
            && self.function_offset + w <= len
            && self.data_offset + w <= len
            && (self.function_offset + w <= self.data_offset
                || self.data_offset + w <= self.function_offset)
    }

    /// Check placeholder bounds, overlap, width and alignment.
    pub fn validate(&self) -> Result<(), PatchError> {
        let len = self.len();
        let width = self.pointer_width;
        if width != 4 && width != 8 {
            return Err(PatchError::UnsupportedPointerWidth { width });
        }
        if !self.align.is_power_of_two() {
            return Err(PatchError::InvalidAlignment { align: self.align });
        }
        for (site, offset) in [
            (PatchSite::Function, self.function_offset),
            (PatchSite::Data, self.data_offset),
        ] {
            if offset.checked_add(width).is_none_or(|end| end > len) {
                return Err(PatchError::OffsetOutOfBounds { site, offset, len });
            }
        }
        let disjoint = self.function_offset + width <= self.data_offset
            || self.data_offset + width <= self.function_offset;
        if !disjoint {
            return Err(PatchError::OverlappingSites {
                function_offset: self.function_offset,
                data_offset: self.data_offset,
            });
        }
        Ok(())
    }

    /// Copy the template and fill both placeholders.
    ///
    /// Writes all `pointer_width` bytes of each value.
    pub fn patch(&self, function: usize, data: usize) -> Result<PatchedTemplate, PatchError> {
        self.validate()?;
        let mut patched = PatchedTemplate::copy_of(self);
        patched.write_pointer(PatchSite::Function, self.function_offset, function)?;
        patched.write_pointer(PatchSite::Data, self.data_offset, data)?;
        Ok(patched)
    }
}

#[cfg(not(any(
    all(target_arch = "x86_64", not(windows)),
    target_arch = "x86",
    target_arch = "aarch64"
)))]
compile_error!("no trampoline template for this target; supported: x86_64 (SysV), x86, aarch64");

const _: () = assert!(Template::NATIVE.is_well_formed());
const _: () = assert!(Template::NATIVE.pointer_width == std::mem::size_of::<usize>());
