//! A non-reentrant exclusive lock sized to be embedded directly in other
//! aggregates (the fiber-aware [`crate::job::signal::Mutex`] embeds a
//! [`crate::job::signal::Signal`], not this one -- this is the OS-level
//! primitive those higher layers, and the allocators, build on).

use parking_lot::Mutex as RawMutex;

/// Thin `enter`/`exit` wrapper over a raw futex-based mutex.
///
/// Unlike `std::sync::Mutex`, `enter`/`exit` do not tie the lock to a
/// guard's lifetime -- this matches the original engine's API, where a
/// mutex can be entered in one function and exited in another (e.g. the
/// scheduler enters `System.mutex` before a fiber switch and the
/// destination fiber exits it as its first action).
#[derive(Debug, Default)]
pub struct Mutex {
    inner: RawMutex<()>,
}

impl Mutex {
    pub const fn new() -> Self {
        Self {
            inner: RawMutex::new(()),
        }
    }

    /// Blocks until the lock is acquired.
    pub fn enter(&self) {
        std::mem::forget(self.inner.lock());
    }

    /// Releases the lock. Calling this without a matching `enter` is
    /// undefined behavior, exactly as in the original.
    ///
    /// # Safety
    /// The caller must have a matching outstanding `enter()` on this
    /// mutex from the same logical owner (parking_lot's raw mutex does
    /// not track the owning thread, so this is unchecked).
    pub fn exit(&self) {
        unsafe { self.inner.force_unlock() };
    }

    /// Scoped RAII acquisition, for call sites that don't need to cross
    /// an `enter`/`exit` boundary asymmetrically.
    pub fn lock(&self) -> parking_lot::MutexGuard<'_, ()> {
        self.inner.lock()
    }

    pub fn try_enter(&self) -> bool {
        match self.inner.try_lock() {
            Some(guard) => {
                std::mem::forget(guard);
                true
            }
            None => false,
        }
    }

    pub(crate) fn raw(&self) -> &RawMutex<()> {
        &self.inner
    }
}

/// RAII guard mirroring the original's `MutexGuard`: enters on
/// construction, exits on drop.
pub struct MutexGuard<'a> {
    mutex: &'a Mutex,
}

impl<'a> MutexGuard<'a> {
    pub fn new(mutex: &'a Mutex) -> Self {
        mutex.enter();
        Self { mutex }
    }
}

impl Drop for MutexGuard<'_> {
    fn drop(&mut self) {
        self.mutex.exit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn enter_exit_round_trips() {
        let m = Mutex::new();
        m.enter();
        m.exit();
        assert!(m.try_enter());
        m.exit();
    }

    #[test]
    fn excludes_concurrent_enterers() {
        let m = Arc::new(Mutex::new());
        let counter = Arc::new(std::sync::atomic::AtomicI32::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let m = m.clone();
            let counter = counter.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    m.enter();
                    let v = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
                    assert_eq!(v, counter.load(std::sync::atomic::Ordering::SeqCst));
                    counter.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
                    m.exit();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
