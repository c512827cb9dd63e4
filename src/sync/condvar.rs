//! Condition variable: sleep while holding a [`Mutex`], wake one sleeper.

use super::mutex::Mutex;
use parking_lot::Condvar as RawCondvar;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct CondVar {
    inner: RawCondvar,
}

impl CondVar {
    pub const fn new() -> Self {
        Self {
            inner: RawCondvar::new(),
        }
    }

    /// Atomically releases `mutex` and blocks until woken, then
    /// re-acquires `mutex` before returning. `mutex` must already be
    /// held by the caller (mirrors `pthread_cond_wait`).
    pub fn sleep(&self, mutex: &Mutex) {
        let mut guard = unsafe {
            // SAFETY: the mutex is already held by the caller (the
            // contract of `sleep`); parking_lot's condvar needs a
            // `MutexGuard` to release/reacquire around the wait, so we
            // materialize one for a lock we know is held rather than
            // taking it again (which would deadlock).
            mutex.raw().make_guard_unchecked()
        };
        self.inner.wait(&mut guard);
        std::mem::forget(guard);
    }

    /// Same as [`CondVar::sleep`] but gives up after `timeout` even if
    /// nobody signalled.
    pub fn sleep_timeout(&self, mutex: &Mutex, timeout: Duration) -> bool {
        let mut guard = unsafe { mutex.raw().make_guard_unchecked() };
        let timed_out = self.inner.wait_for(&mut guard, timeout).timed_out();
        std::mem::forget(guard);
        !timed_out
    }

    pub fn wakeup(&self) {
        self.inner.notify_one();
    }

    pub fn wakeup_all(&self) {
        self.inner.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn wakeup_releases_a_sleeper() {
        let mutex = Arc::new(Mutex::new());
        let cv = Arc::new(CondVar::new());
        let ready = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let (m2, c2, r2) = (mutex.clone(), cv.clone(), ready.clone());
        let handle = thread::spawn(move || {
            m2.enter();
            while !r2.load(std::sync::atomic::Ordering::SeqCst) {
                c2.sleep(&m2);
            }
            m2.exit();
        });

        thread::sleep(Duration::from_millis(20));
        mutex.enter();
        ready.store(true, std::sync::atomic::Ordering::SeqCst);
        cv.wakeup();
        mutex.exit();

        handle.join().unwrap();
    }
}
