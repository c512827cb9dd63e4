//! Typed wrappers over the atomic operations the scheduler and the
//! lock-free allocators are built on.
//!
//! These are deliberately thin: they exist so every call site in this
//! crate spells out the exact operation it needs (add-and-return-previous,
//! bit-test-and-set, pointer CAS, ...) instead of reaching for raw
//! `std::sync::atomic` orderings ad hoc. Every read-modify-write here is
//! sequentially consistent; callers that need a cheaper ordering drop down
//! to `std::sync::atomic` directly.

use std::sync::atomic::{
    AtomicI32, AtomicI64, AtomicPtr, AtomicUsize, Ordering::SeqCst,
};

/// A 32-bit atomic integer, naturally aligned.
#[repr(align(4))]
#[derive(Debug, Default)]
pub struct AtomicInt32(AtomicI32);

impl AtomicInt32 {
    pub const fn new(v: i32) -> Self {
        Self(AtomicI32::new(v))
    }

    pub fn load(&self) -> i32 {
        self.0.load(SeqCst)
    }

    pub fn store(&self, v: i32) {
        self.0.store(v, SeqCst)
    }

    /// Returns the value *before* the add.
    pub fn fetch_add(&self, v: i32) -> i32 {
        self.0.fetch_add(v, SeqCst)
    }

    /// Returns the value *before* the subtract.
    pub fn fetch_sub(&self, v: i32) -> i32 {
        self.0.fetch_sub(v, SeqCst)
    }

    pub fn exchange(&self, v: i32) -> i32 {
        self.0.swap(v, SeqCst)
    }

    /// Returns `true` and writes `new` iff the current value equals `current`.
    pub fn compare_exchange(&self, current: i32, new: i32) -> bool {
        self.0.compare_exchange(current, new, SeqCst, SeqCst).is_ok()
    }

    /// Returns the value observed on failure, useful for CAS-retry loops.
    pub fn compare_exchange_weak(&self, current: i32, new: i32) -> Result<i32, i32> {
        self.0.compare_exchange_weak(current, new, SeqCst, SeqCst)
    }

    /// Sets `bits` in the value, returns the prior value.
    pub fn fetch_or(&self, bits: i32) -> i32 {
        self.0.fetch_or(bits, SeqCst)
    }

    /// Clears `bits` in the value, returns the prior value.
    pub fn fetch_and_clear(&self, bits: i32) -> i32 {
        self.0.fetch_and(!bits, SeqCst)
    }

    /// Sets bit `pos` (0-based), returns the bit's prior state.
    pub fn test_and_set_bit(&self, pos: u32) -> bool {
        let mask = 1i32 << pos;
        (self.0.fetch_or(mask, SeqCst) & mask) != 0
    }
}

/// A 64-bit atomic integer, naturally aligned.
#[repr(align(8))]
#[derive(Debug, Default)]
pub struct AtomicInt64(AtomicI64);

impl AtomicInt64 {
    pub const fn new(v: i64) -> Self {
        Self(AtomicI64::new(v))
    }

    pub fn load(&self) -> i64 {
        self.0.load(SeqCst)
    }

    pub fn store(&self, v: i64) {
        self.0.store(v, SeqCst)
    }

    pub fn fetch_add(&self, v: i64) -> i64 {
        self.0.fetch_add(v, SeqCst)
    }

    pub fn fetch_sub(&self, v: i64) -> i64 {
        self.0.fetch_sub(v, SeqCst)
    }

    pub fn exchange(&self, v: i64) -> i64 {
        self.0.swap(v, SeqCst)
    }

    pub fn compare_exchange(&self, current: i64, new: i64) -> bool {
        self.0.compare_exchange(current, new, SeqCst, SeqCst).is_ok()
    }

    pub fn fetch_or(&self, bits: i64) -> i64 {
        self.0.fetch_or(bits, SeqCst)
    }

    pub fn fetch_and_clear(&self, bits: i64) -> i64 {
        self.0.fetch_and(!bits, SeqCst)
    }

    pub fn test_and_set_bit(&self, pos: u32) -> bool {
        let mask = 1i64 << pos;
        (self.0.fetch_or(mask, SeqCst) & mask) != 0
    }
}

/// Atomic compare-exchange over a raw pointer, used by the intrusive
/// free lists in the page allocator and the paged-list iterator.
pub fn compare_exchange_ptr<T>(slot: &AtomicPtr<T>, current: *mut T, new: *mut T) -> bool {
    slot.compare_exchange(current, new, SeqCst, SeqCst).is_ok()
}

/// Atomic compare-exchange over a `usize`-sized word, used where a pointer
/// is carried as a tagged integer (see [`crate::ring`]).
pub fn compare_exchange_usize(slot: &AtomicUsize, current: usize, new: usize) -> bool {
    slot.compare_exchange(current, new, SeqCst, SeqCst).is_ok()
}

/// Full fence: no load or store may cross in either direction.
#[inline]
pub fn memory_barrier() {
    std::sync::atomic::fence(SeqCst);
}

/// No load may move above this point.
#[inline]
pub fn read_barrier() {
    std::sync::atomic::fence(std::sync::atomic::Ordering::Acquire);
}

/// No store may move below this point.
#[inline]
pub fn write_barrier() {
    std::sync::atomic::fence(std::sync::atomic::Ordering::Release);
}

/// Hint to the CPU that this is a busy-wait spin, so it can yield execution
/// resources to a sibling hardware thread (`pause`/`yield` instruction).
#[inline]
pub fn cpu_relax() {
    std::hint::spin_loop();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_add_returns_prior_value() {
        let a = AtomicInt32::new(5);
        assert_eq!(a.fetch_add(3), 5);
        assert_eq!(a.load(), 8);
    }

    #[test]
    fn compare_exchange_only_succeeds_on_match() {
        let a = AtomicInt32::new(1);
        assert!(!a.compare_exchange(0, 9));
        assert_eq!(a.load(), 1);
        assert!(a.compare_exchange(1, 9));
        assert_eq!(a.load(), 9);
    }

    #[test]
    fn test_and_set_bit_returns_prior_bit() {
        let a = AtomicInt32::new(0);
        assert!(!a.test_and_set_bit(2));
        assert_eq!(a.load(), 0b100);
        assert!(a.test_and_set_bit(2));
    }

    #[test]
    fn atomic_i64_roundtrip() {
        let a = AtomicInt64::new(10);
        assert_eq!(a.fetch_sub(4), 10);
        assert_eq!(a.load(), 6);
        assert_eq!(a.exchange(100), 6);
        assert_eq!(a.load(), 100);
    }
}
