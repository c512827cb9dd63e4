//! Leak-counting allocator: wraps any allocator, tracking how many
//! allocations are currently outstanding. Trips a debug assertion at
//! drop if the count isn't back to zero -- the cheapest leak detector
//! available, since it costs one atomic increment/decrement per call.

use super::traits::Allocator;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicI32, Ordering};

pub struct ProxyAllocator<'a> {
    source: &'a dyn Allocator,
    allocation_count: AtomicI32,
}

impl<'a> ProxyAllocator<'a> {
    pub fn new(source: &'a dyn Allocator) -> Self {
        Self {
            source,
            allocation_count: AtomicI32::new(0),
        }
    }

    pub fn allocation_count(&self) -> i32 {
        self.allocation_count.load(Ordering::SeqCst)
    }

    pub fn source(&self) -> &'a dyn Allocator {
        self.source
    }
}

impl Allocator for ProxyAllocator<'_> {
    fn allocate(&self, size: usize, align: usize) -> Option<NonNull<u8>> {
        let ptr = self.source.allocate(size, align)?;
        self.allocation_count.fetch_add(1, Ordering::SeqCst);
        Some(ptr)
    }

    fn deallocate(&self, ptr: NonNull<u8>) {
        self.allocation_count.fetch_sub(1, Ordering::SeqCst);
        self.source.deallocate(ptr);
    }

    fn reallocate(
        &self,
        ptr: Option<NonNull<u8>>,
        new_size: usize,
        old_size: usize,
        align: usize,
    ) -> Option<NonNull<u8>> {
        if ptr.is_none() {
            self.allocation_count.fetch_add(1, Ordering::SeqCst);
        }
        if new_size == 0 {
            self.allocation_count.fetch_sub(1, Ordering::SeqCst);
        }
        self.source.reallocate(ptr, new_size, old_size, align)
    }
}

impl Drop for ProxyAllocator<'_> {
    fn drop(&mut self) {
        debug_assert_eq!(
            self.allocation_count.load(Ordering::SeqCst),
            0,
            "proxy allocator detected a leak: outstanding allocation count is not zero"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::bucket_allocator::BucketAllocator;

    #[test]
    fn balanced_alloc_dealloc_round_trip_leaves_count_at_zero() {
        let backing = BucketAllocator::new();
        let proxy = ProxyAllocator::new(&backing);
        let mut ptrs = Vec::new();
        for _ in 0..10 {
            ptrs.push(proxy.allocate(16, 8).unwrap());
        }
        assert_eq!(proxy.allocation_count(), 10);
        for p in ptrs {
            proxy.deallocate(p);
        }
        assert_eq!(proxy.allocation_count(), 0);
    }
}
