//! Counting semaphore with a two-way `wait_multiple`, built on a mutex and
//! a condition variable since POSIX (and std) expose no native multi-wait
//! primitive -- exactly the emulation the design notes call for.

use super::condvar::CondVar;
use super::mutex::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

#[derive(Debug)]
pub struct Semaphore {
    mutex: Mutex,
    cond: CondVar,
    count: AtomicI64,
}

impl Semaphore {
    pub fn new(initial_count: i64) -> Self {
        Self {
            mutex: Mutex::new(),
            cond: CondVar::new(),
            count: AtomicI64::new(initial_count),
        }
    }

    /// Increments the count by `n` and wakes up to `n` waiters.
    pub fn signal(&self, n: u32) {
        self.mutex.enter();
        self.count.fetch_add(n as i64, Ordering::SeqCst);
        self.mutex.exit();
        for _ in 0..n {
            self.cond.wakeup();
        }
    }

    /// Blocks until a token is available, then consumes one.
    pub fn wait(&self) {
        self.mutex.enter();
        while self.count.load(Ordering::SeqCst) <= 0 {
            self.cond.sleep(&self.mutex);
        }
        self.count.fetch_sub(1, Ordering::SeqCst);
        self.mutex.exit();
    }

    /// Consumes a token without blocking. The caller must have already
    /// established (e.g. by having just popped an item from a queue this
    /// semaphore tracks) that a token is available; this exists to keep
    /// the semaphore's count in sync after such out-of-band consumption.
    pub fn try_wait(&self) -> bool {
        self.mutex.enter();
        let available = self.count.load(Ordering::SeqCst) > 0;
        if available {
            self.count.fetch_sub(1, Ordering::SeqCst);
        }
        self.mutex.exit();
        available
    }

    pub fn count(&self) -> i64 {
        self.count.load(Ordering::SeqCst)
    }

    /// Blocks until either `a` or `b` has a token available, consumes one
    /// from whichever fired, and returns which one (0 = `a`, 1 = `b`).
    ///
    /// There is no native OS primitive for this; we poll both counters
    /// under a short exponential backoff and fall back to parking on
    /// `a`'s condvar with a bounded timeout so the loop is never a pure
    /// spin once both semaphores stay empty for a while.
    pub fn wait_multiple(a: &Semaphore, b: &Semaphore) -> u8 {
        let mut spin = 0u32;
        loop {
            if a.try_wait() {
                return 0;
            }
            if b.try_wait() {
                return 1;
            }
            if spin < 64 {
                for _ in 0..(1u32 << spin.min(6)) {
                    crate::atomics::cpu_relax();
                }
                spin += 1;
            } else {
                a.mutex.enter();
                a.cond
                    .sleep_timeout(&a.mutex, std::time::Duration::from_micros(200));
                a.mutex.exit();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn signal_then_wait_does_not_block() {
        let s = Semaphore::new(0);
        s.signal(1);
        s.wait();
        assert_eq!(s.count(), 0);
    }

    #[test]
    fn try_wait_fails_on_empty() {
        let s = Semaphore::new(0);
        assert!(!s.try_wait());
    }

    #[test]
    fn wait_multiple_picks_whichever_fires() {
        let a = Arc::new(Semaphore::new(0));
        let b = Arc::new(Semaphore::new(0));
        let b2 = b.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            b2.signal(1);
        });
        let which = Semaphore::wait_multiple(&a, &b);
        assert_eq!(which, 1);
    }
}
