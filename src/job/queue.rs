//! Per-worker and global work queues: a [`RingBuffer`] paired with a
//! semaphore so a worker with nothing to do can park instead of
//! spinning, reused from [`crate::ring`] rather than hand-rolling a
//! second ring here.

use crate::ring::RingBuffer;
use crate::sync::Semaphore;
use std::ptr::NonNull;

use super::signal::Signal;

/// A unit of deferred work: either a job function plus its argument, or
/// a fiber to resume (used when a waiting fiber becomes runnable again).
#[derive(Clone, Copy)]
pub enum Work {
    Fiber(u16),
    Job(Job),
}

#[derive(Clone, Copy)]
pub struct Job {
    pub task: extern "C" fn(*mut ()),
    pub data: *mut (),
    pub dec_on_finish: Option<NonNull<Signal>>,
    pub worker_index: u8,
}

// SAFETY: `data`/`dec_on_finish` cross threads by design -- jobs are
// submitted from one worker/fiber and run on whichever worker pops them.
// The caller of `run`/`run_lambda` is responsible for the data's
// lifetime and thread-safety, exactly as in the original API.
unsafe impl Send for Job {}

pub struct WorkQueue<const CAPACITY: usize> {
    ring: RingBuffer<QueueSlot, CAPACITY>,
    semaphore: Semaphore,
}

// `RingBuffer` requires `Copy`; `Work` already is, but we additionally
// need an empty sentinel to round-trip through the ring's uninitialized
// slots without needing an `Option` (which would still be `Copy` anyway,
// this just spells out the original's `Work::NONE` explicitly).
#[derive(Clone, Copy)]
enum QueueSlot {
    Fiber(u16),
    Job(Job),
}

impl<const CAPACITY: usize> WorkQueue<CAPACITY> {
    pub fn new() -> Self {
        Self {
            ring: RingBuffer::new(),
            semaphore: Semaphore::new(0),
        }
    }

    pub fn push(&self, work: Work) {
        let slot = match work {
            Work::Fiber(idx) => QueueSlot::Fiber(idx),
            Work::Job(job) => QueueSlot::Job(job),
        };
        self.ring.push(slot);
        self.semaphore.signal(1);
    }

    /// Non-blocking pop. Returns `None` if the queue is currently empty.
    pub fn pop(&self) -> Option<Work> {
        let slot = self.ring.pop()?;
        self.semaphore.try_wait();
        Some(match slot {
            QueueSlot::Fiber(idx) => Work::Fiber(idx),
            QueueSlot::Job(job) => Work::Job(job),
        })
    }

    pub(crate) fn semaphore(&self) -> &Semaphore {
        &self.semaphore
    }
}

impl<const CAPACITY: usize> Default for WorkQueue<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_preserves_fifo_order_within_capacity() {
        let q: WorkQueue<4> = WorkQueue::new();
        q.push(Work::Fiber(1));
        q.push(Work::Fiber(2));
        match q.pop() {
            Some(Work::Fiber(1)) => {}
            _ => panic!("expected fiber 1 first"),
        }
        match q.pop() {
            Some(Work::Fiber(2)) => {}
            _ => panic!("expected fiber 2 second"),
        }
        assert!(q.pop().is_none());
    }
}
