//! Fixed-size pool of reusable fibers jobs run on.
//!
//! Fibers are created lazily: a pool slot starts with no backing
//! [`crate::fiber::Fiber`]/[`crate::fiber::FiberStack`] at all, and only
//! gets one the first time it is checked out of the free list, exactly
//! like the original's `if (!Fiber::isValid(fiber->fiber))` guard. Pool
//! slots are referred to everywhere else in the job module by `u16`
//! index rather than pointer, so the pool itself can live in a plain
//! `Vec` without pinning concerns.
//!
//! `current_job` deliberately does not live here: it is read and written
//! outside the scheduler's global mutex (see `super::scheduler::trigger`),
//! so it is tracked in a parallel, independently-synchronized array on
//! [`super::scheduler::Scheduler`] instead -- the same per-slot-`UnsafeCell`
//! shape [`crate::ring::RingBuffer`] uses for the same reason.

use crate::fiber::{self, Fiber, FiberProc, FiberStack};

pub const FIBER_POOL_SIZE: usize = 512;

pub struct FiberDecl {
    idx: u16,
    fiber: Fiber,
    stack: Option<FiberStack>,
}

impl FiberDecl {
    fn empty(idx: u16) -> Self {
        Self {
            idx,
            fiber: Fiber::invalid(),
            stack: None,
        }
    }

    /// Lazily materializes the backing fiber/stack if this slot has never
    /// run before, then hands back the runnable [`Fiber`] handle.
    pub fn ensure_created(&mut self, stack_size: usize, entry: FiberProc) -> Fiber {
        if !self.fiber.is_valid() {
            let (fiber, stack) = fiber::create(stack_size, entry, self.idx as usize as *mut ());
            self.fiber = fiber;
            self.stack = Some(stack);
        }
        std::mem::replace(&mut self.fiber, Fiber::invalid())
    }

    /// Takes the currently-parked fiber out of this slot. Only valid to
    /// call on a slot known to hold a suspended fiber (i.e. one that is
    /// queued as `Work::Fiber` somewhere).
    pub fn take_fiber(&mut self) -> Fiber {
        std::mem::replace(&mut self.fiber, Fiber::invalid())
    }

    /// The stable address a switch can target as `out_prev`/resume-into.
    pub fn fiber_mut(&mut self) -> &mut Fiber {
        &mut self.fiber
    }
}

/// Owns every pool slot plus the free list of unused indices. Not
/// `Sync` on its own; the scheduler guards all access with its single
/// global mutex, matching the original's invariant that the fiber pool
/// is only ever touched with `System.sync` held.
pub struct FiberPool {
    slots: Vec<FiberDecl>,
    free: Vec<u16>,
}

impl FiberPool {
    pub fn new() -> Self {
        let slots = (0..FIBER_POOL_SIZE as u16).map(FiberDecl::empty).collect();
        let free = (0..FIBER_POOL_SIZE as u16).rev().collect();
        Self { slots, free }
    }

    pub fn checkout(&mut self) -> Option<u16> {
        self.free.pop()
    }

    pub fn release(&mut self, idx: u16) {
        self.free.push(idx);
    }

    pub fn get(&mut self, idx: u16) -> &mut FiberDecl {
        &mut self.slots[idx as usize]
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Default for FiberPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_starts_with_every_slot_free_and_no_fiber_materialized() {
        let mut pool = FiberPool::new();
        assert_eq!(pool.len(), FIBER_POOL_SIZE);
        let idx = pool.checkout().expect("pool should not start empty");
        assert!(!pool.get(idx).fiber.is_valid());
        pool.release(idx);
    }

    #[test]
    fn checkout_exhausts_then_release_replenishes() {
        let mut pool = FiberPool::new();
        let mut taken = Vec::new();
        while let Some(idx) = pool.checkout() {
            taken.push(idx);
        }
        assert_eq!(taken.len(), FIBER_POOL_SIZE);
        assert!(pool.checkout().is_none());
        pool.release(taken.pop().unwrap());
        assert!(pool.checkout().is_some());
    }
}
