//! The allocator vtable every allocator in this module implements. Kept
//! as a plain trait object interface (no generics) so the job system can
//! hold a single `&dyn Allocator` regardless of which concrete allocator
//! backs a given worker or arena.

use std::ptr::NonNull;

/// Common interface over every allocator in this crate.
///
/// `allocate`/`reallocate` return `None` on exhaustion; callers must
/// check. Alignment is always a power of two no larger than the page
/// size (4 KiB).
pub trait Allocator {
    fn allocate(&self, size: usize, align: usize) -> Option<NonNull<u8>>;
    fn deallocate(&self, ptr: NonNull<u8>);
    fn reallocate(
        &self,
        ptr: Option<NonNull<u8>>,
        new_size: usize,
        old_size: usize,
        align: usize,
    ) -> Option<NonNull<u8>>;
}
