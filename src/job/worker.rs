//! A single OS thread running the cooperative scheduler's `manage` loop.
//!
//! Each worker owns a small per-worker work queue (checked before the
//! global one) and, once its manage fiber is running, is represented in
//! thread-local storage so free functions like
//! [`super::scheduler::yield_now`] can find "the calling job's worker"
//! without threading it through every call.

use std::cell::{Cell, UnsafeCell};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::Result;
use crate::fiber::Fiber;
use crate::sync::{Semaphore, Thread};

use super::queue::{Work, WorkQueue};
use super::scheduler::{self, Scheduler};

pub struct Worker {
    thread: UnsafeCell<Thread>,
    primary_fiber: UnsafeCell<Fiber>,
    current_fiber_idx: Cell<u16>,
    pub(crate) worker_index: u8,
    pub(crate) enabled: AtomicBool,
    pub(crate) is_backup: AtomicBool,
    pub(crate) finished: AtomicBool,
    pub(crate) work_queue: WorkQueue<4>,
}

// SAFETY: `thread`, `primary_fiber` and `current_fiber_idx` are only ever
// touched by whichever fiber is logically running on this worker at a
// given instant, and ownership of "what's running" moves between OS
// threads exclusively while `scheduler().mutex` is held (see
// `manage_trampoline`). `work_queue`/the atomics are independently safe
// to share.
unsafe impl Sync for Worker {}

thread_local! {
    static CURRENT_WORKER: Cell<*const Worker> = const { Cell::new(std::ptr::null()) };
}

pub(crate) fn has_current_worker() -> bool {
    CURRENT_WORKER.with(|c| !c.get().is_null())
}

pub(crate) fn current_worker() -> &'static Worker {
    let ptr = CURRENT_WORKER.with(|c| c.get());
    debug_assert!(!ptr.is_null(), "not running on a job system worker thread");
    unsafe { &*ptr }
}

/// The index of the worker the calling job is currently running on, or
/// `None` if called from outside any job (e.g. the application's main
/// thread). A job that calls [`super::yield_now`] or
/// [`super::move_job_to_worker`] may see a different value afterward.
pub fn current_worker_index() -> Option<u8> {
    if !has_current_worker() {
        return None;
    }
    Some(current_worker().worker_index)
}

impl Worker {
    pub fn new(worker_index: u8, is_backup: bool) -> Box<Worker> {
        Box::new(Worker {
            thread: UnsafeCell::new(Thread::new(format!("Worker #{worker_index}"))),
            primary_fiber: UnsafeCell::new(Fiber::invalid()),
            current_fiber_idx: Cell::new(0),
            worker_index,
            enabled: AtomicBool::new(false),
            is_backup: AtomicBool::new(is_backup),
            finished: AtomicBool::new(false),
            work_queue: WorkQueue::new(),
        })
    }

    /// Spawns the backing OS thread. Must be called exactly once, before
    /// the `Worker` is reachable from any thread other than the caller.
    pub(crate) fn start(&self) -> Result<()> {
        let ptr = self as *const Worker as usize;
        let thread = unsafe { &mut *self.thread.get() };
        thread.create(
            false,
            Some(move || {
                let worker = unsafe { &*(ptr as *const Worker) };
                CURRENT_WORKER.with(|c| c.set(worker as *const Worker));
                worker_task(worker);
            }),
        )
    }

    pub(crate) fn set_affinity(&self, mask: u64) {
        let thread = unsafe { &*self.thread.get() };
        let _ = thread.set_affinity_mask(mask);
    }

    pub(crate) fn is_finished(&self) -> bool {
        unsafe { &*self.thread.get() }.is_finished()
    }

    pub(crate) fn thread_wakeup(&self) {
        unsafe { &*self.thread.get() }.wakeup();
    }

    fn thread_sleep(&self, mutex: &crate::sync::Mutex) {
        unsafe { &*self.thread.get() }.sleep(mutex);
    }

    pub(crate) fn join(&self) {
        unsafe { (*self.thread.get()).destroy() };
    }

    fn primary_fiber_mut(&self) -> &mut Fiber {
        unsafe { &mut *self.primary_fiber.get() }
    }

    pub(crate) fn current_fiber_idx(&self) -> u16 {
        self.current_fiber_idx.get()
    }

    pub(crate) fn set_current_fiber_idx(&self, idx: u16) {
        self.current_fiber_idx.set(idx);
    }
}

/// Runs on the freshly spawned OS thread: checks out the worker's first
/// fiber from the pool and converts this OS thread's own stack into the
/// "primary" fiber that the manage loop eventually switches back into at
/// shutdown.
fn worker_task(worker: &Worker) {
    let sched = scheduler::scheduler();
    sched.mutex.enter();
    let idx = {
        let pool = unsafe { sched.fiber_pool_mut() };
        pool.checkout().expect("fiber pool exhausted on worker startup")
    };
    let fiber = {
        let pool = unsafe { sched.fiber_pool_mut() };
        pool.get(idx).ensure_created(sched.fiber_stack_size(), manage_trampoline)
    };
    worker.set_current_fiber_idx(idx);
    // `sched.mutex` stays held across this switch; `manage_trampoline`
    // releases it as its very first action once it starts running.
    crate::fiber::switch_to(worker.primary_fiber_mut(), fiber);
    // Control returns here only once the whole worker is shutting down.
}

/// Pops the next unit of work for `worker`, checking its own queue
/// first, then the global queue, then blocking until either has
/// something.
fn try_pop_work(sched: &'static Scheduler, worker: &Worker) -> Option<Work> {
    if let Some(w) = worker.work_queue.pop() {
        return Some(w);
    }
    if let Some(w) = sched.global_queue.pop() {
        return Some(w);
    }
    match Semaphore::wait_multiple(worker.work_queue.semaphore(), sched.global_queue.semaphore()) {
        0 => worker.work_queue.pop(),
        1 => sched.global_queue.pop(),
        _ => unreachable!(),
    }
}

/// The body every pooled fiber actually runs. `param` carries the pool
/// index of the fiber running it (see
/// [`super::fiber_pool::FiberDecl::ensure_created`]).
pub(crate) extern "C" fn manage_trampoline(param: *mut ()) {
    let this_idx = param as usize as u16;
    let sched = scheduler::scheduler();
    sched.mutex.exit();

    loop {
        let worker = current_worker();
        if worker.finished.load(Ordering::SeqCst) {
            break;
        }

        if worker.is_backup.load(Ordering::SeqCst) {
            sched.mutex.enter();
            while !worker.enabled.load(Ordering::SeqCst) && !worker.finished.load(Ordering::SeqCst) {
                worker.thread_sleep(&sched.mutex);
            }
            sched.mutex.exit();
        }

        let mut popped = None;
        while !worker.finished.load(Ordering::SeqCst) {
            if let Some(w) = try_pop_work(sched, worker) {
                popped = Some(w);
                break;
            }
            if worker.is_backup.load(Ordering::SeqCst) {
                break;
            }
        }
        if worker.finished.load(Ordering::SeqCst) {
            break;
        }
        let Some(work) = popped else { continue };

        match work {
            Work::Fiber(next_idx) => {
                worker.set_current_fiber_idx(next_idx);
                sched.mutex.enter();
                let next_fiber = unsafe {
                    let pool = sched.fiber_pool_mut();
                    pool.release(this_idx);
                    pool.get(next_idx).take_fiber()
                };
                unsafe {
                    let pool = sched.fiber_pool_mut();
                    crate::fiber::switch_to(pool.get(this_idx).fiber_mut(), next_fiber);
                }
                // Resumes once some worker's manage loop switches back into
                // `this_idx`'s slot -- possibly on a different OS thread.
                sched.mutex.exit();
                let worker = current_worker();
                worker.set_current_fiber_idx(this_idx);
            }
            Work::Job(job) => {
                sched.set_current_job(this_idx, Some(job));
                (job.task)(job.data);
                sched.set_current_job(this_idx, None);
                if let Some(signal) = job.dec_on_finish {
                    scheduler::trigger(sched, unsafe { signal.as_ref() }, false);
                }
            }
        }
    }

    let worker = current_worker();
    let primary = std::mem::replace(worker.primary_fiber_mut(), Fiber::invalid());
    unsafe {
        let pool = sched.fiber_pool_mut();
        crate::fiber::switch_to(pool.get(this_idx).fiber_mut(), primary);
    }
    unreachable!("worker manage loop resumed after handing control back to its primary fiber");
}
