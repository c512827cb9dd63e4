//! OS thread handle with a name, CPU affinity control, and a private
//! condition variable the thread can sleep on and be woken from -- this is
//! what the scheduler's worker loop uses to idle a disabled backup worker.

use super::condvar::CondVar;
use super::mutex::Mutex;
use crate::error::{Result, RuntimeError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Implemented by whatever runs on a [`Thread`]; mirrors the original's
/// polymorphic `Thread::task()`.
pub trait ThreadTask: Send {
    fn task(&mut self);
}

impl<F: FnOnce() + Send> ThreadTask for Option<F> {
    fn task(&mut self) {
        if let Some(f) = self.take() {
            f();
        }
    }
}

pub struct Thread {
    name: String,
    handle: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    cond: Arc<CondVar>,
    sleep_mutex: Arc<Mutex>,
}

impl Thread {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handle: None,
            running: Arc::new(AtomicBool::new(false)),
            finished: Arc::new(AtomicBool::new(false)),
            cond: Arc::new(CondVar::new()),
            sleep_mutex: Arc::new(Mutex::new()),
        }
    }

    /// Spawns the OS thread and starts `task` running on it.
    ///
    /// `is_extended` requests a larger stack (used historically for
    /// threads that recurse deeply, e.g. compilation workers); it is a
    /// hint, not a guarantee.
    pub fn create<T: ThreadTask + 'static>(&mut self, is_extended: bool, mut task: T) -> Result<()> {
        let running = self.running.clone();
        let finished = self.finished.clone();
        let stack_size = if is_extended { 8 * 1024 * 1024 } else { 1024 * 1024 };

        let builder = std::thread::Builder::new()
            .name(self.name.clone())
            .stack_size(stack_size);

        let handle = builder
            .spawn(move || {
                running.store(true, Ordering::SeqCst);
                task.task();
                running.store(false, Ordering::SeqCst);
                finished.store(true, Ordering::SeqCst);
            })
            .map_err(RuntimeError::ThreadSpawn)?;

        self.handle = Some(handle);
        Ok(())
    }

    /// Joins the thread. Safe to call once the task loop has observed a
    /// shutdown flag and returned.
    pub fn destroy(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Call only from the task's own thread: blocks until [`Thread::wakeup`]
    /// is called, releasing `held` (which must already be entered) while
    /// parked.
    pub fn sleep(&self, held: &Mutex) {
        self.cond.sleep(held);
    }

    pub fn wakeup(&self) {
        self.cond.wakeup();
    }

    /// A cheap, cloneable handle to this thread's sleep/wakeup condition
    /// variable, for handing to the closure that becomes the thread's task
    /// (the task body typically wants to sleep on itself).
    pub fn waker(&self) -> ThreadWaker {
        ThreadWaker {
            cond: self.cond.clone(),
        }
    }

    /// Pins this thread to the CPUs set in `mask` (bit `n` = CPU `n`).
    pub fn set_affinity_mask(&self, mask: u64) -> Result<()> {
        let Some(handle) = self.handle.as_ref() else {
            return Ok(());
        };
        set_native_affinity(handle, mask)
    }
}

impl Default for Thread {
    fn default() -> Self {
        Self::new("worker")
    }
}

/// Clonable handle to a [`Thread`]'s private condition variable, usable
/// from inside the spawned task closure itself.
#[derive(Clone)]
pub struct ThreadWaker {
    cond: Arc<CondVar>,
}

impl ThreadWaker {
    pub fn sleep(&self, held: &Mutex) {
        self.cond.sleep(held);
    }

    pub fn wakeup(&self) {
        self.cond.wakeup();
    }
}

#[cfg(unix)]
fn set_native_affinity(handle: &JoinHandle<()>, mask: u64) -> Result<()> {
    use std::os::unix::thread::JoinHandleExt;
    unsafe {
        let mut cpu_set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut cpu_set);
        for bit in 0..64u64 {
            if mask & (1 << bit) != 0 {
                libc::CPU_SET(bit as usize, &mut cpu_set);
            }
        }
        let pthread = handle.as_pthread_t();
        let rc = libc::pthread_setaffinity_np(
            pthread as libc::pthread_t,
            std::mem::size_of::<libc::cpu_set_t>(),
            &cpu_set,
        );
        if rc != 0 {
            return Err(RuntimeError::ThreadAffinity {
                worker: mask.trailing_zeros() as usize,
                source: std::io::Error::from_raw_os_error(rc),
            });
        }
    }
    Ok(())
}

#[cfg(windows)]
fn set_native_affinity(handle: &JoinHandle<()>, mask: u64) -> Result<()> {
    use std::os::windows::io::AsRawHandle;
    use windows_sys::Win32::System::Threading::SetThreadAffinityMask;
    let raw = handle.as_raw_handle();
    let prev = unsafe { SetThreadAffinityMask(raw as _, mask as usize) };
    if prev == 0 {
        return Err(RuntimeError::ThreadAffinity {
            worker: mask.trailing_zeros() as usize,
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn create_runs_task_and_marks_finished() {
        static HITS: AtomicU32 = AtomicU32::new(0);
        let mut t = Thread::new("test-thread");
        t.create(false, Some(|| {
            HITS.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
        t.destroy();
        assert!(t.is_finished());
        assert_eq!(HITS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn sleep_wakeup_round_trip() {
        let mutex = std::sync::Arc::new(Mutex::new());
        let mut t = Thread::new("sleeper");
        let woken = std::sync::Arc::new(AtomicBool::new(false));
        let waker = t.waker();
        let (m2, w2, waker2) = (mutex.clone(), woken.clone(), waker.clone());
        t.create(false, Some(move || {
            m2.enter();
            waker2.sleep(&m2);
            w2.store(true, Ordering::SeqCst);
            m2.exit();
        }))
        .unwrap();

        std::thread::sleep(std::time::Duration::from_millis(20));
        waker.wakeup();
        t.destroy();
        assert!(woken.load(Ordering::SeqCst));
    }
}
