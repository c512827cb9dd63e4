//! The job system singleton: owns every worker, the fiber pool, and the
//! global work queue, and exposes the free functions jobs call to submit
//! work and synchronize on it.
//!
//! There is exactly one [`Scheduler`] per process, created by [`init`]
//! and torn down by [`shutdown`]; every other function in this module
//! (and in [`super::signal`]'s `enter`/`exit`) operates on it implicitly
//! via [`scheduler`].

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use once_cell::sync::OnceCell;
use parking_lot::Mutex as DataMutex;

use crate::error::{Result, RuntimeError};

use super::config::RuntimeConfig;
use super::fiber_pool::FiberPool;
use super::queue::{Job, Work, WorkQueue};
use super::signal::{JobMutex, Signal, Waitor};
use super::worker::{self, Worker};

pub const ANY_WORKER: u8 = 0xff;

static SCHEDULER: OnceCell<Scheduler> = OnceCell::new();
static GENERATION: AtomicI32 = AtomicI32::new(0);

pub struct Scheduler {
    pub(crate) mutex: crate::sync::Mutex,
    workers: Vec<Box<Worker>>,
    backup_workers: DataMutex<Vec<Box<Worker>>>,
    fiber_pool: UnsafeCell<FiberPool>,
    // Parallel to the fiber pool, indexed the same way, but intentionally
    // *not* guarded by `mutex` -- see the module doc on
    // `super::fiber_pool`.
    current_jobs: Box<[UnsafeCell<Option<Job>>]>,
    pub(crate) global_queue: WorkQueue<64>,
    config: RuntimeConfig,
    active: AtomicBool,
}

// SAFETY: `fiber_pool` is only ever dereferenced mutably with `mutex`
// held (see `fiber_pool_mut`'s doc), which serializes every such access
// process-wide; `current_jobs` is an array of independently-synchronized
// per-slot cells (same shape as `crate::ring::RingBuffer`'s slots). The
// scheduler is built once in `init` and only ever accessed through the
// `'static` reference handed out by `scheduler()`, so it never itself
// crosses a thread boundary by value; `Send` is asserted only so the
// enclosing `OnceCell` can be `Sync`.
unsafe impl Sync for Scheduler {}
unsafe impl Send for Scheduler {}

impl Scheduler {
    pub(crate) unsafe fn fiber_pool_mut(&self) -> &mut FiberPool {
        &mut *self.fiber_pool.get()
    }

    pub(crate) fn fiber_stack_size(&self) -> usize {
        self.config.fiber_stack_size
    }

    pub(crate) fn current_job(&self, idx: u16) -> Option<Job> {
        unsafe { *self.current_jobs[idx as usize].get() }
    }

    pub(crate) fn set_current_job(&self, idx: u16, job: Option<Job>) {
        unsafe { *self.current_jobs[idx as usize].get() = job };
    }

    fn worker_for_index(&self, worker_index: u8) -> &Worker {
        &self.workers[(worker_index as usize) % self.workers.len()]
    }
}

pub fn scheduler() -> &'static Scheduler {
    SCHEDULER.get().expect("job system not initialized")
}

/// Starts the job system: spawns worker threads and (optionally) a
/// disabled backup worker. Returns an error if no worker thread could be
/// started at all.
pub fn init(config: RuntimeConfig) -> Result<()> {
    if SCHEDULER.get().is_some() {
        return Err(RuntimeError::AlreadyInitialized);
    }

    let worker_count = config.resolved_worker_count().clamp(1, 255);
    let workers: Vec<Box<Worker>> = (0..worker_count as u8).map(|i| Worker::new(i, false)).collect();

    let current_jobs = (0..super::fiber_pool::FIBER_POOL_SIZE)
        .map(|_| UnsafeCell::new(None))
        .collect();

    let enable_backup = config.enable_backup_worker;
    let scheduler_instance = Scheduler {
        mutex: crate::sync::Mutex::new(),
        workers,
        backup_workers: DataMutex::new(Vec::new()),
        fiber_pool: UnsafeCell::new(FiberPool::new()),
        current_jobs,
        global_queue: WorkQueue::new(),
        config,
        active: AtomicBool::new(true),
    };

    SCHEDULER
        .set(scheduler_instance)
        .unwrap_or_else(|_| unreachable!("checked above"));
    let sched = scheduler();

    let mut started = 0usize;
    for (i, worker) in sched.workers.iter().enumerate() {
        match worker.start() {
            Ok(()) => {
                worker.enabled.store(true, Ordering::SeqCst);
                worker.set_affinity(1u64 << (i % 64));
                started += 1;
            }
            Err(err) => {
                tracing::error!(worker = i, %err, "job system worker failed to start");
            }
        }
    }

    if started == 0 {
        return Err(RuntimeError::NoWorkers);
    }

    if enable_backup {
        enable_backup_worker(true);
    }

    Ok(())
}

/// Stops every worker thread and joins them. After this returns, calling
/// any other function in [`crate::job`] other than [`init`] is a logic
/// error.
pub fn shutdown() {
    let sched = scheduler();
    sched.active.store(false, Ordering::SeqCst);

    for worker in &sched.workers {
        worker.finished.store(true, Ordering::SeqCst);
        worker.work_queue.semaphore().signal(1);
    }
    {
        let backups = sched.backup_workers.lock();
        for worker in backups.iter() {
            worker.finished.store(true, Ordering::SeqCst);
            worker.work_queue.semaphore().signal(1);
            worker.thread_wakeup();
        }
    }
    sched.global_queue.semaphore().signal(sched.workers.len().max(1) as u32);

    {
        let backups = sched.backup_workers.lock();
        for worker in backups.iter() {
            while !worker.is_finished() {
                worker.thread_wakeup();
            }
            worker.join();
        }
    }
    for worker in &sched.workers {
        while !worker.is_finished() {
            worker.work_queue.semaphore().signal(1);
        }
        worker.join();
    }
}

pub fn workers_count() -> u8 {
    scheduler().workers.len() as u8
}

/// Toggles the single backup worker thread, creating it on first enable.
pub fn enable_backup_worker(enable: bool) {
    let sched = scheduler();
    sched.mutex.enter();
    let mut backups = sched.backup_workers.lock();
    for worker in backups.iter() {
        if worker.enabled.load(Ordering::SeqCst) != enable {
            worker.enabled.store(enable, Ordering::SeqCst);
            worker.thread_wakeup();
            sched.mutex.exit();
            return;
        }
    }
    debug_assert!(enable, "disabling a backup worker that doesn't exist yet");
    let worker = Worker::new(0xff, true);
    match worker.start() {
        Ok(()) => {
            worker.enabled.store(true, Ordering::SeqCst);
            backups.push(worker);
        }
        Err(err) => {
            tracing::error!(%err, "job system backup worker failed to initialize");
        }
    }
    sched.mutex.exit();
}

/// Submits a single job. If `on_finished` is set, its counter is
/// incremented before the job is queued, so callers can submit several
/// jobs against one signal before waiting on it.
pub fn run(data: *mut (), task: extern "C" fn(*mut ()), on_finished: Option<&Signal>, worker_index: u8) {
    let sched = scheduler();
    let resolved_worker_index = if worker_index != ANY_WORKER {
        worker_index % workers_count()
    } else {
        worker_index
    };
    let job = Job {
        task,
        data,
        dec_on_finish: on_finished.map(std::ptr::NonNull::from),
        worker_index: resolved_worker_index,
    };

    if let Some(signal) = on_finished {
        sched.mutex.enter();
        let old = signal.counter.fetch_add(1, Ordering::SeqCst);
        if old == 0 {
            signal.generation.store(GENERATION.fetch_add(1, Ordering::SeqCst), Ordering::SeqCst);
        }
        sched.mutex.exit();
    }

    if worker_index != ANY_WORKER {
        sched.worker_for_index(worker_index).work_queue.push(Work::Job(job));
        return;
    }
    sched.global_queue.push(Work::Job(job));
}

/// Submits a closure as a job, heap-allocating its captures. `F` must
/// outlive the job (enforced via `'static`) since the job may run well
/// after `run_lambda` returns.
pub fn run_lambda<F>(f: F, on_finished: Option<&Signal>, worker_index: u8)
where
    F: FnOnce() + Send + 'static,
{
    extern "C" fn trampoline<F: FnOnce() + Send + 'static>(data: *mut ()) {
        let f = unsafe { Box::from_raw(data as *mut F) };
        f();
    }
    let raw = Box::into_raw(Box::new(f)) as *mut ();
    run(raw, trampoline::<F>, on_finished, worker_index);
}

/// Runs `f` once on every worker (including the caller's own execution
/// context) and blocks until all have finished.
pub fn run_on_workers<F>(f: &F)
where
    F: Fn() + Sync,
{
    extern "C" fn trampoline<F: Fn() + Sync>(data: *mut ()) {
        let f = unsafe { &*(data as *const F) };
        f();
    }
    let signal = Signal::new();
    let count = workers_count();
    let ptr = f as *const F as *mut ();
    for _ in 1..count {
        run(ptr, trampoline::<F>, Some(&signal), ANY_WORKER);
    }
    f();
    wait(&signal);
}

/// Splits `[0, count)` into chunks of `step` and runs `f(start, end)` on
/// each chunk, fanned out across the worker pool, blocking until every
/// chunk has completed.
pub fn for_each<F>(count: u32, step: u32, f: &F)
where
    F: Fn(u32, u32) + Sync,
{
    if count == 0 {
        return;
    }
    if count <= step {
        f(0, count);
        return;
    }

    struct SharedState<'a, F> {
        f: &'a F,
        offset: AtomicI32,
        step: u32,
        count: u32,
    }

    extern "C" fn trampoline<F: Fn(u32, u32) + Sync>(data: *mut ()) {
        let state = unsafe { &*(data as *const SharedState<F>) };
        loop {
            let idx = state.offset.fetch_add(state.step as i32, Ordering::SeqCst);
            if idx < 0 || idx as u32 >= state.count {
                break;
            }
            let idx = idx as u32;
            let to = (idx + state.step).min(state.count);
            (state.f)(idx, to);
        }
    }

    let steps = count.div_ceil(step);
    let num_workers = workers_count() as u32;
    let num_jobs = steps.min(num_workers.max(1));

    let signal = Signal::new();
    let state = SharedState {
        f,
        offset: AtomicI32::new(0),
        step,
        count,
    };
    let ptr = &state as *const SharedState<F> as *mut ();

    for _ in 1..num_jobs {
        run(ptr, trampoline::<F>, Some(&signal), ANY_WORKER);
    }

    loop {
        let idx = state.offset.fetch_add(step as i32, Ordering::SeqCst);
        if idx < 0 || idx as u32 >= count {
            break;
        }
        let idx = idx as u32;
        let to = (idx + step).min(count);
        f(idx, to);
    }

    wait(&signal);
}

fn set_red_ex(signal: &Signal) -> bool {
    debug_assert!(signal.counter.load(Ordering::SeqCst) <= 1);
    let ok = signal
        .counter
        .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok();
    if ok {
        signal.generation.store(GENERATION.fetch_add(1, Ordering::SeqCst), Ordering::SeqCst);
    }
    ok
}

pub fn set_red(signal: &Signal) {
    set_red_ex(signal);
}

pub fn set_green(signal: &Signal) {
    debug_assert!(signal.counter.load(Ordering::SeqCst) <= 1);
    trigger(scheduler(), signal, true);
}

/// Decrements `signal`'s counter (or forces it to zero if `set_zero`),
/// and if it has reached zero, reschedules every fiber parked on it.
/// Returns whether anything was woken.
pub(crate) fn trigger(sched: &Scheduler, signal: &Signal, set_zero: bool) -> bool {
    sched.mutex.enter();
    if set_zero {
        signal.counter.store(0, Ordering::SeqCst);
    } else {
        let old = signal.counter.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(old > 0, "signal decremented below zero");
        if old > 1 {
            sched.mutex.exit();
            return false;
        }
    }
    let head = unsafe { (*signal.waitor.get()).take() };
    sched.mutex.exit();

    let Some(mut node) = head else {
        return false;
    };
    loop {
        let (next, fiber_idx) = unsafe { ((*node.as_ptr()).next, (*node.as_ptr()).fiber_idx) };
        let worker_idx = sched
            .current_job(fiber_idx)
            .map(|job| job.worker_index)
            .unwrap_or(ANY_WORKER);
        if worker_idx == ANY_WORKER {
            sched.global_queue.push(Work::Fiber(fiber_idx));
        } else {
            sched.worker_for_index(worker_idx).work_queue.push(Work::Fiber(fiber_idx));
        }
        match next {
            Some(n) => node = n,
            None => break,
        }
    }
    true
}

/// Blocks the calling job's fiber until `signal` turns green. Calling
/// this from a non-worker thread (e.g. the application's main thread)
/// instead spins with a short sleep, since there is no fiber to park.
pub(crate) fn wait_ex(sched: &Scheduler, signal: &Signal, _is_mutex: bool) {
    sched.mutex.enter();
    if signal.counter.load(Ordering::SeqCst) == 0 {
        sched.mutex.exit();
        return;
    }

    if !worker::has_current_worker() {
        while signal.counter.load(Ordering::SeqCst) > 0 {
            sched.mutex.exit();
            std::thread::sleep(std::time::Duration::from_millis(1));
            sched.mutex.enter();
        }
        sched.mutex.exit();
        return;
    }

    let worker = worker::current_worker();
    let this_idx = worker.current_fiber_idx();

    let mut waitor = Waitor {
        next: None,
        fiber_idx: this_idx,
    };
    unsafe {
        waitor.next = (*signal.waitor.get()).take();
        *signal.waitor.get() = Some(std::ptr::NonNull::from(&waitor));
    }

    let new_idx = {
        let pool = unsafe { sched.fiber_pool_mut() };
        pool.checkout().expect("fiber pool exhausted")
    };
    let new_fiber = {
        let pool = unsafe { sched.fiber_pool_mut() };
        pool.get(new_idx).ensure_created(sched.fiber_stack_size(), super::worker::manage_trampoline)
    };
    worker.set_current_fiber_idx(new_idx);
    unsafe {
        let pool = sched.fiber_pool_mut();
        crate::fiber::switch_to(pool.get(this_idx).fiber_mut(), new_fiber);
    }
    // Resumes once `trigger` re-queues `this_idx` and some worker's manage
    // loop switches back into it -- possibly a different OS thread.
    let worker = worker::current_worker();
    worker.set_current_fiber_idx(this_idx);
    sched.mutex.exit();
}

pub fn wait(signal: &Signal) {
    wait_ex(scheduler(), signal, false);
}

pub fn enter(mutex: &JobMutex) {
    debug_assert!(worker::has_current_worker());
    loop {
        for _ in 0..400 {
            if set_red_ex(&mutex.signal) {
                return;
            }
        }
        wait_ex(scheduler(), &mutex.signal, true);
    }
}

pub fn exit(mutex: &JobMutex) {
    debug_assert!(worker::has_current_worker());
    set_green(&mutex.signal);
}

/// Moves the calling job onto a specific worker's queue and parks the
/// current fiber until it is rescheduled there.
pub fn move_job_to_worker(worker_index: u8) {
    let sched = scheduler();
    sched.mutex.enter();
    let worker = worker::current_worker();
    let this_idx = worker.current_fiber_idx();
    sched.worker_for_index(worker_index).work_queue.push(Work::Fiber(this_idx));

    let new_idx = {
        let pool = unsafe { sched.fiber_pool_mut() };
        pool.checkout().expect("fiber pool exhausted")
    };
    let new_fiber = {
        let pool = unsafe { sched.fiber_pool_mut() };
        pool.get(new_idx).ensure_created(sched.fiber_stack_size(), super::worker::manage_trampoline)
    };
    if let Some(mut job) = sched.current_job(this_idx) {
        job.worker_index = worker_index;
        sched.set_current_job(this_idx, Some(job));
    }
    worker.set_current_fiber_idx(new_idx);
    unsafe {
        let pool = sched.fiber_pool_mut();
        crate::fiber::switch_to(pool.get(this_idx).fiber_mut(), new_fiber);
    }
    let worker = worker::current_worker();
    worker.set_current_fiber_idx(this_idx);
    debug_assert_eq!(worker.worker_index, worker_index);
    sched.mutex.exit();
}

/// Yields the calling job back to the global queue, letting any worker
/// (possibly this one) pick it back up.
pub fn yield_now() {
    let sched = scheduler();
    sched.mutex.enter();
    let worker = worker::current_worker();
    let this_idx = worker.current_fiber_idx();
    sched.global_queue.push(Work::Fiber(this_idx));

    let new_idx = {
        let pool = unsafe { sched.fiber_pool_mut() };
        pool.checkout().expect("fiber pool exhausted")
    };
    let new_fiber = {
        let pool = unsafe { sched.fiber_pool_mut() };
        pool.get(new_idx).ensure_created(sched.fiber_stack_size(), super::worker::manage_trampoline)
    };
    if let Some(mut job) = sched.current_job(this_idx) {
        job.worker_index = ANY_WORKER;
        sched.set_current_job(this_idx, Some(job));
    }
    worker.set_current_fiber_idx(new_idx);
    unsafe {
        let pool = sched.fiber_pool_mut();
        crate::fiber::switch_to(pool.get(this_idx).fiber_mut(), new_fiber);
    }
    sched.mutex.exit();
}
