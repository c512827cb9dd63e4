//! Completion-latch primitive jobs wait on, and the fiber-aware mutex
//! built directly on top of it.
//!
//! A [`Signal`] is "red" (counter > 0, not yet done) or "green" (counter
//! == 0, done); fibers that wait on a red signal link a [`Waitor`] node
//! -- allocated on their own stack, so it lives exactly as long as the
//! suspended fiber that owns it -- onto the signal's intrusive list. The
//! scheduler (see [`super::scheduler`]) walks that list and reschedules
//! every waiting fiber once the signal turns green.
//!
//! All mutation of `waitor` happens with the scheduler's single global
//! mutex held; `counter`/`generation` are atomics so a handful of
//! operations (e.g. the fast path of [`super::scheduler::enter`]) can
//! avoid taking the lock at all.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicI32, Ordering};

/// Intrusive linked-list node for a fiber parked on a [`Signal`].
/// Always stack-allocated on the waiting fiber's own stack; this is
/// sound because the fiber is suspended for the entire time the node is
/// linked into the signal, so the node outlives every reference to it.
pub struct Waitor {
    pub next: Option<NonNull<Waitor>>,
    pub fiber_idx: u16,
}

pub struct Signal {
    pub(crate) waitor: std::cell::UnsafeCell<Option<NonNull<Waitor>>>,
    pub counter: AtomicI32,
    pub generation: AtomicI32,
}

// SAFETY: `waitor` is only ever read or written with the scheduler's
// global mutex held (see `super::scheduler`); the cell itself grants no
// concurrent access guarantee on its own.
unsafe impl Sync for Signal {}
// SAFETY: same reasoning as the `Sync` impl above -- the `NonNull<Waitor>`
// stored in `waitor` is only ever dereferenced on the fiber that owns the
// pointee's stack, and all access is serialized by the scheduler's global
// mutex, so moving a `Signal` (and the pointer it carries) across threads
// is sound.
unsafe impl Send for Signal {}

impl Signal {
    pub const fn new() -> Self {
        Self {
            waitor: std::cell::UnsafeCell::new(None),
            counter: AtomicI32::new(0),
            generation: AtomicI32::new(0),
        }
    }

    pub fn counter(&self) -> i32 {
        self.counter.load(Ordering::SeqCst)
    }

    pub fn generation(&self) -> i32 {
        self.generation.load(Ordering::SeqCst)
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Signal {
    fn drop(&mut self) {
        debug_assert!(
            unsafe { (*self.waitor.get()).is_none() },
            "signal dropped with fibers still waiting on it"
        );
        debug_assert_eq!(
            self.counter.load(Ordering::SeqCst),
            0,
            "signal dropped while still red (counter != 0)"
        );
    }
}

/// Mutex for fibers: `enter`/`exit` spin briefly then fall back to
/// parking the calling fiber via the scheduler, exactly like
/// [`Signal`]'s red/green dance -- a mutex here *is* a signal that starts
/// green and is set red by whoever holds it.
pub struct JobMutex {
    pub signal: Signal,
}

impl JobMutex {
    pub const fn new() -> Self {
        Self {
            signal: Signal::new(),
        }
    }
}

impl Default for JobMutex {
    fn default() -> Self {
        Self::new()
    }
}
