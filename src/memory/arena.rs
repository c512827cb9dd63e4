//! Lock-free bump-pointer allocator over a reserved virtual address
//! range. `allocate` never blocks on the fast path; only the rare
//! "need to commit more pages" branch takes the commit mutex. There is
//! no per-allocation `deallocate` -- the whole arena is freed at once via
//! [`ArenaAllocator::reset`].

use super::os_mem;
use super::traits::Allocator;
use parking_lot::Mutex;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};

pub struct ArenaAllocator {
    mem: *mut u8,
    reserved: u32,
    committed_bytes: Mutex<u32>,
    end: AtomicU32,
}

// SAFETY: `mem` points at an OS reservation owned exclusively by this
// allocator; all mutation of the committed region is gated by `end`'s
// CAS protocol or the `committed_bytes` mutex.
unsafe impl Send for ArenaAllocator {}
unsafe impl Sync for ArenaAllocator {}

impl ArenaAllocator {
    pub fn new(reserved: u32) -> Self {
        let mem = os_mem::reserve(reserved as usize).expect("failed to reserve arena");
        Self {
            mem,
            reserved,
            committed_bytes: Mutex::new(0),
            end: AtomicU32::new(0),
        }
    }

    /// Discards every allocation made since construction or the last
    /// reset. Must only be called once nothing still references memory
    /// handed out by this arena.
    pub fn reset(&self) {
        self.end.store(0, Ordering::SeqCst);
    }

    pub fn committed_bytes(&self) -> u32 {
        *self.committed_bytes.lock()
    }
}

fn round_up(val: u32, align: u32) -> u32 {
    debug_assert!(align.is_power_of_two());
    (val + align - 1) & !(align - 1)
}

impl Allocator for ArenaAllocator {
    fn allocate(&self, size: usize, align: usize) -> Option<NonNull<u8>> {
        debug_assert!(size < u32::MAX as usize);
        let size = size as u32;
        let align = align as u32;

        let mut start;
        loop {
            let end = self.end.load(Ordering::SeqCst);
            start = round_up(end, align);
            if self
                .end
                .compare_exchange(end, start + size, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                break;
            }
        }

        {
            let committed = self.committed_bytes.lock();
            if start + size <= *committed {
                return NonNull::new(unsafe { self.mem.add(start as usize) });
            }
        }

        let mut committed = self.committed_bytes.lock();
        if start + size <= *committed {
            return NonNull::new(unsafe { self.mem.add(start as usize) });
        }

        let new_committed = round_up(start + size, os_mem::PAGE_SIZE as u32);
        assert!(new_committed < self.reserved, "arena exceeded its reservation");
        os_mem::commit(
            unsafe { self.mem.add(*committed as usize) },
            (new_committed - *committed) as usize,
        )
        .expect("failed to commit arena pages");
        *committed = new_committed;

        NonNull::new(unsafe { self.mem.add(start as usize) })
    }

    fn deallocate(&self, _ptr: NonNull<u8>) {
        // everything is freed at once via `reset`.
    }

    fn reallocate(
        &self,
        ptr: Option<NonNull<u8>>,
        new_size: usize,
        _old_size: usize,
        align: usize,
    ) -> Option<NonNull<u8>> {
        if ptr.is_none() {
            return self.allocate(new_size, align);
        }
        // growing or shrinking an existing arena allocation isn't
        // supported; every allocation is logically permanent until reset.
        debug_assert!(false, "ArenaAllocator::reallocate called with a non-null pointer");
        None
    }
}

impl Drop for ArenaAllocator {
    fn drop(&mut self) {
        debug_assert_eq!(self.end.load(Ordering::SeqCst), 0, "arena not reset before drop");
        os_mem::release(self.mem, self.reserved as usize);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commits_grow_monotonically_and_reset_keeps_commitment() {
        let arena = ArenaAllocator::new(16 * 1024 * 1024);
        assert_eq!(arena.committed_bytes(), 0);

        let first = arena.allocate(1024, 8).unwrap();
        let mut last_committed = arena.committed_bytes();
        assert!(last_committed >= 1024);

        for _ in 0..9999 {
            arena.allocate(1024, 8).unwrap();
            let c = arena.committed_bytes();
            assert!(c >= last_committed);
            last_committed = c;
        }

        let committed_before_reset = arena.committed_bytes();
        arena.reset();
        assert_eq!(arena.committed_bytes(), committed_before_reset);

        let after_reset = arena.allocate(1024, 8).unwrap();
        assert_eq!(first.as_ptr(), after_reset.as_ptr());
        arena.reset();
    }

    #[test]
    fn respects_alignment() {
        let arena = ArenaAllocator::new(1024 * 1024);
        let p = arena.allocate(3, 16).unwrap();
        assert_eq!(p.as_ptr() as usize % 16, 0);
        arena.reset();
    }
}
