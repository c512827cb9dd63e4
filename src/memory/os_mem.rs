//! Raw virtual-memory primitives: reserve an address range without
//! backing it, commit pages into it on demand, release the whole range.
//!
//! Every allocator in this module reserves a large range up front and
//! commits 4 KiB at a time as it is actually touched, rather than
//! allocating a backing store for the full reservation immediately.

use crate::error::{Result, RuntimeError};

pub const PAGE_SIZE: usize = 4096;

/// Reserves `size` bytes of address space without committing physical
/// pages. The returned pointer is page-aligned.
pub fn reserve(size: usize) -> Result<*mut u8> {
    #[cfg(unix)]
    {
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(RuntimeError::VirtualReserve { size });
        }
        Ok(ptr as *mut u8)
    }
    #[cfg(windows)]
    {
        use windows_sys::Win32::System::Memory::{VirtualAlloc, MEM_RESERVE, PAGE_NOACCESS};
        let ptr = unsafe { VirtualAlloc(std::ptr::null(), size, MEM_RESERVE, PAGE_NOACCESS) };
        if ptr.is_null() {
            return Err(RuntimeError::VirtualReserve { size });
        }
        Ok(ptr as *mut u8)
    }
}

/// Commits `size` bytes starting at `addr`, which must lie within a
/// range previously returned by [`reserve`].
pub fn commit(addr: *mut u8, size: usize) -> Result<()> {
    #[cfg(unix)]
    {
        let rc = unsafe {
            libc::mprotect(addr as *mut libc::c_void, size, libc::PROT_READ | libc::PROT_WRITE)
        };
        if rc != 0 {
            return Err(RuntimeError::VirtualCommit {
                addr: addr as usize,
                size,
            });
        }
        Ok(())
    }
    #[cfg(windows)]
    {
        use windows_sys::Win32::System::Memory::{VirtualAlloc, MEM_COMMIT, PAGE_READWRITE};
        let ptr = unsafe { VirtualAlloc(addr as *const _, size, MEM_COMMIT, PAGE_READWRITE) };
        if ptr.is_null() {
            return Err(RuntimeError::VirtualCommit {
                addr: addr as usize,
                size,
            });
        }
        Ok(())
    }
}

/// Releases the entire reservation starting at `addr` (the same pointer
/// and size originally passed to [`reserve`]).
pub fn release(addr: *mut u8, size: usize) {
    #[cfg(unix)]
    unsafe {
        let rc = libc::munmap(addr as *mut libc::c_void, size);
        debug_assert_eq!(rc, 0, "munmap failed");
    }
    #[cfg(windows)]
    unsafe {
        use windows_sys::Win32::System::Memory::{VirtualFree, MEM_RELEASE};
        let _ = size;
        let ok = VirtualFree(addr as *mut _, 0, MEM_RELEASE);
        debug_assert_ne!(ok, 0, "VirtualFree failed");
    }
}

/// Reserves and immediately commits a single page-aligned allocation of
/// `size` bytes, rounded up to the page size. Used by the page allocator,
/// which has no lazy-commit story of its own.
pub fn reserve_committed(size: usize) -> Result<*mut u8> {
    let size = round_up(size, PAGE_SIZE);
    let ptr = reserve(size)?;
    commit(ptr, size)?;
    Ok(ptr)
}

pub fn round_up(val: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (val + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_commit_release_round_trips() {
        let size = PAGE_SIZE * 4;
        let ptr = reserve(size).unwrap();
        commit(ptr, PAGE_SIZE).unwrap();
        unsafe {
            std::ptr::write_bytes(ptr, 0xAB, PAGE_SIZE);
            assert_eq!(*ptr, 0xAB);
        }
        release(ptr, size);
    }

    #[test]
    fn round_up_rounds_to_page_boundary() {
        assert_eq!(round_up(1, PAGE_SIZE), PAGE_SIZE);
        assert_eq!(round_up(PAGE_SIZE, PAGE_SIZE), PAGE_SIZE);
        assert_eq!(round_up(PAGE_SIZE + 1, PAGE_SIZE), PAGE_SIZE * 2);
    }
}
