//! Bounded multi-producer/multi-consumer ring buffer with a mutex-guarded
//! LIFO overflow path.
//!
//! Each slot carries its own sequence number (Dmitry Vyukov's bounded
//! MPMC queue algorithm): a producer claims a slot by racing a CAS on the
//! write cursor against the slot's sequence, and only writes the value
//! once it has won that race, so a consumer spinning on the same slot
//! never observes a torn write. When every slot is claimed, producers and
//! consumers fall back to a plain mutex-guarded `Vec` used as a stack, so
//! the buffer never actually rejects a push -- it just stops being
//! lock-free under sustained overflow.
//!
//! `T` is required to be `Copy`: every caller in this crate stores small
//! pointer-sized handles here (page addresses, fiber/job pointers), and
//! restricting to `Copy` sidesteps having to track partially-initialized
//! slots through `Drop`.

use parking_lot::Mutex;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicI64, Ordering};

struct Slot<T> {
    value: UnsafeCell<MaybeUninit<T>>,
    seq: AtomicI64,
}

unsafe impl<T: Send> Sync for Slot<T> {}

pub struct RingBuffer<T: Copy, const CAPACITY: usize> {
    slots: [Slot<T>; CAPACITY],
    rd: AtomicI64,
    wr: AtomicI64,
    fallback: Mutex<Vec<T>>,
}

impl<T: Copy, const CAPACITY: usize> RingBuffer<T, CAPACITY> {
    pub fn new() -> Self {
        debug_assert!(CAPACITY > 2, "ring buffer capacity must exceed 2");
        let slots = std::array::from_fn(|i| Slot {
            value: UnsafeCell::new(MaybeUninit::uninit()),
            seq: AtomicI64::new(i as i64),
        });
        Self {
            slots,
            rd: AtomicI64::new(0),
            wr: AtomicI64::new(0),
            fallback: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, obj: T) {
        let mut pos = self.wr.load(Ordering::SeqCst);
        let slot;
        loop {
            let s = &self.slots[(pos as usize) % CAPACITY];
            let seq = s.seq.load(Ordering::Acquire);
            if seq < pos {
                self.fallback.lock().push(obj);
                return;
            } else if seq == pos {
                match self
                    .wr
                    .compare_exchange_weak(pos, pos + 1, Ordering::SeqCst, Ordering::SeqCst)
                {
                    Ok(_) => {
                        slot = s;
                        break;
                    }
                    Err(actual) => pos = actual,
                }
            } else {
                pos = self.wr.load(Ordering::SeqCst);
            }
        }
        unsafe {
            (*slot.value.get()).write(obj);
        }
        slot.seq.store(pos + 1, Ordering::Release);
    }

    pub fn pop(&self) -> Option<T> {
        loop {
            let pos = self.rd.load(Ordering::SeqCst);
            let s = &self.slots[(pos as usize) % CAPACITY];
            let seq = s.seq.load(Ordering::Acquire);
            if seq < pos + 1 {
                return self.fallback.lock().pop();
            } else if seq == pos + 1 {
                if self
                    .rd
                    .compare_exchange_weak(pos, pos + 1, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    let value = unsafe { (*s.value.get()).assume_init_read() };
                    s.seq.store(pos + CAPACITY as i64, Ordering::Release);
                    return Some(value);
                }
            }
            // somebody else popped or pushed this slot first; retry.
        }
    }

    /// Approximate count of items held in the lock-free ring proper
    /// (excludes the overflow stack). Racy by construction; useful only
    /// for diagnostics/tests.
    pub fn len_lockfree(&self) -> i64 {
        (self.wr.load(Ordering::SeqCst) - self.rd.load(Ordering::SeqCst)).max(0)
    }
}

impl<T: Copy, const CAPACITY: usize> Default for RingBuffer<T, CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn push_pop_round_trips_within_capacity() {
        let ring: RingBuffer<i32, 8> = RingBuffer::new();
        ring.push(1);
        ring.push(2);
        ring.push(3);
        assert_eq!(ring.pop(), Some(1));
        assert_eq!(ring.pop(), Some(2));
        assert_eq!(ring.pop(), Some(3));
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn overflow_spills_to_fallback_stack_lifo() {
        let ring: RingBuffer<i32, 4> = RingBuffer::new();
        for i in 0..10 {
            ring.push(i);
        }
        // First CAPACITY items drain from the lock-free ring in FIFO
        // order, then the overflow stack drains LIFO.
        let mut popped = Vec::new();
        while let Some(v) = ring.pop() {
            popped.push(v);
        }
        assert_eq!(popped.len(), 10);
        assert_eq!(&popped[0..4], &[0, 1, 2, 3]);
        assert_eq!(&popped[4..], &[9, 8, 7, 6, 5, 4]);
    }

    #[test]
    fn concurrent_push_pop_preserves_all_items() {
        let ring = Arc::new(RingBuffer::<i32, 16>::new());
        let producers: Vec<_> = (0..4)
            .map(|t| {
                let ring = ring.clone();
                thread::spawn(move || {
                    for i in 0..1000 {
                        ring.push(t * 1000 + i);
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }
        let mut seen = Vec::new();
        while let Some(v) = ring.pop() {
            seen.push(v);
        }
        seen.sort_unstable();
        assert_eq!(seen.len(), 4000);
        assert_eq!(seen[0], 0);
        assert_eq!(seen[3999], 3999);
    }
}
