//! Low-level primitives for executable memory.
//!
//! This is the only module in `partial-arena` that contains `unsafe` code.
//! It owns one anonymous read/write/execute mapping and exposes bounds-checked
//! copy in/out; callers never hold references into the mapped bytes.

#![allow(unsafe_code)]

use std::ptr::NonNull;
use std::sync::atomic::{fence, Ordering};

use crate::error::ArenaError;

/// Query the native page size.
pub fn native_page_size() -> Result<usize, ArenaError> {
    // SAFETY: sysconf has no memory-safety preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 {
        return Err(ArenaError::PageSizeUnavailable);
    }
    usize::try_from(size).map_err(|_| ArenaError::PageSizeUnavailable)
}

/// An anonymous RWX mapping, unmapped on drop.
pub struct ExecRegion {
    base: NonNull<u8>,
    len: usize,
}

// SAFETY: the region exclusively owns its mapping; no thread-affine state.
unsafe impl Send for ExecRegion {}

impl ExecRegion {
    /// Map `len` bytes of private, anonymous, read/write/execute memory.
    ///
    /// The memory is zero-filled by the kernel.
    pub fn map(len: usize) -> Result<Self, ArenaError> {
        if len == 0 {
            return Err(ArenaError::MapFailed { len, errno: 0 });
        }
        // SAFETY: a fresh anonymous mapping aliases nothing; the kernel picks
        // the address.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            let errno = std::io::Error::last_os_error()
                .raw_os_error()
                .unwrap_or(0);
            return Err(ArenaError::MapFailed { len, errno });
        }
        let base = NonNull::new(ptr.cast::<u8>()).ok_or(ArenaError::MapFailed { len, errno: 0 })?;
        Ok(Self { base, len })
    }

    /// Base address of the mapping.
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// Mapped length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false: zero-length regions are never mapped.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether `addr` lies inside the mapping.
    pub fn contains(&self, addr: *const u8) -> bool {
        let start = self.base.as_ptr() as usize;
        let addr = addr as usize;
        addr >= start && addr - start < self.len
    }

    /// Copy `bytes` into the mapping at `offset` and return their address.
    ///
    /// Issues a release fence after the copy and, where the instruction
    /// cache is not coherent with data writes, flushes the written range.
    pub fn write(&self, offset: usize, bytes: &[u8]) -> Result<NonNull<u8>, ArenaError> {
        self.check_range(offset, bytes.len())?;
        // SAFETY: `offset..offset + len` is inside the mapping (checked above),
        // so `dst` stays in bounds and the copy only touches mapped bytes. No
        // Rust reference into the mapping exists to alias with, and `bytes`
        // cannot overlap it.
        let dst = unsafe {
            let dst = self.base.as_ptr().add(offset);
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len());
            dst
        };
        fence(Ordering::Release);
        flush_icache(dst, bytes.len());
        // SAFETY: dst derives from a non-null base plus an in-bounds offset.
        Ok(unsafe { NonNull::new_unchecked(dst) })
    }

    /// Copy `out.len()` bytes starting at `offset` out of the mapping.
    pub fn read(&self, offset: usize, out: &mut [u8]) -> Result<(), ArenaError> {
        self.check_range(offset, out.len())?;
        // SAFETY: range checked above; the source is mapped and readable.
        unsafe {
            std::ptr::copy_nonoverlapping(self.base.as_ptr().add(offset), out.as_mut_ptr(), out.len());
        }
        Ok(())
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<(), ArenaError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(ArenaError::OutOfBounds {
                offset,
                len,
                mapped_len: self.len,
            }),
        }
    }
}

impl Drop for ExecRegion {
    fn drop(&mut self) {
        // SAFETY: base/len describe exactly the mapping created in `map`.
        let rc = unsafe { libc::munmap(self.base.as_ptr().cast(), self.len) };
        if rc != 0 {
            tracing::warn!(
                len = self.len,
                error = %std::io::Error::last_os_error(),
                "munmap of executable region failed"
            );
        }
    }
}

#[cfg(target_arch = "aarch64")]
fn flush_icache(start: *mut u8, len: usize) {
    extern "C" {
        fn __clear_cache(start: *mut libc::c_char, end: *mut libc::c_char);
    }
    // SAFETY: the range was just written and lies inside a live mapping.
    unsafe {
        __clear_cache(start.cast(), start.add(len).cast());
    }
}

#[cfg(not(target_arch = "aarch64"))]
fn flush_icache(_start: *mut u8, _len: usize) {}
