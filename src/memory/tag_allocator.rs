//! Thread-local "active tag" forwarding allocator.
//!
//! Every call writes `self` into a thread-local before delegating to the
//! *effective* allocator -- the nearest ancestor that isn't itself a tag
//! allocator -- so the effective allocator's own bookkeeping (the proxy
//! allocator's counters, or a future attribution layer) can read back
//! which tag is responsible for the allocation currently in flight,
//! without paying for a wrapper per tag per call site.
//!
//! The effective-allocator chain is resolved once, at construction, and
//! never revisited even if the parent is later rewrapped -- tags are
//! attached to an allocator graph built once at startup in this runtime.

use super::traits::Allocator;
use std::cell::Cell;
use std::ptr::NonNull;

thread_local! {
    static ACTIVE_TAG: Cell<Option<&'static str>> = const { Cell::new(None) };
}

/// Returns the tag most recently activated on the calling thread, if any.
pub fn active_tag() -> Option<&'static str> {
    ACTIVE_TAG.with(|t| t.get())
}

/// What a [`TagAllocator`] forwards to: either a plain allocator, or
/// another tag allocator whose own already-resolved effective allocator
/// should be adopted directly (collapsing the chain).
pub enum Parent<'a> {
    Allocator(&'a dyn Allocator),
    Tag(&'a TagAllocator<'a>),
}

pub struct TagAllocator<'a> {
    tag: &'static str,
    direct_parent: &'a dyn Allocator,
    effective: &'a dyn Allocator,
}

impl<'a> TagAllocator<'a> {
    pub fn new(parent: Parent<'a>, tag: &'static str) -> Self {
        let (direct_parent, effective): (&'a dyn Allocator, &'a dyn Allocator) = match parent {
            Parent::Allocator(a) => (a, a),
            Parent::Tag(t) => (t, t.effective),
        };
        Self {
            tag,
            direct_parent,
            effective,
        }
    }

    pub fn tag(&self) -> &'static str {
        self.tag
    }

    pub fn direct_parent(&self) -> &'a dyn Allocator {
        self.direct_parent
    }
}

impl Allocator for TagAllocator<'_> {
    fn allocate(&self, size: usize, align: usize) -> Option<NonNull<u8>> {
        ACTIVE_TAG.with(|t| t.set(Some(self.tag)));
        self.effective.allocate(size, align)
    }

    fn deallocate(&self, ptr: NonNull<u8>) {
        self.effective.deallocate(ptr);
    }

    fn reallocate(
        &self,
        ptr: Option<NonNull<u8>>,
        new_size: usize,
        old_size: usize,
        align: usize,
    ) -> Option<NonNull<u8>> {
        ACTIVE_TAG.with(|t| t.set(Some(self.tag)));
        self.effective.reallocate(ptr, new_size, old_size, align)
    }
}
