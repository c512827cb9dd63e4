//! Fiber-based cooperative job scheduler, allocator hierarchy, and
//! lock-free ring buffer.
//!
//! Jobs run on a fixed pool of worker OS threads, each executing
//! lightweight fibers that park and resume cooperatively instead of
//! blocking their carrier thread -- see [`job`] for the scheduler itself.
//! [`memory`] is the allocator hierarchy jobs allocate through, built on
//! [`ring`]'s lock-free MPMC ring buffer. [`sync`] and [`fiber`] are the
//! OS- and coroutine-level primitives everything else is built from.

pub mod atomics;
pub mod error;
pub mod fiber;
pub mod job;
pub mod memory;
pub mod ring;
pub mod sync;

pub use error::{Result, RuntimeError};
pub use job::{
    current_worker_index, enter, exit, for_each, init, move_job_to_worker, run, run_lambda, run_on_workers,
    set_green, set_red, shutdown, wait, workers_count, yield_now, JobMutex, RuntimeConfig, Signal, ANY_WORKER,
};
