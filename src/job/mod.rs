//! Fiber-based cooperative job scheduler: a fixed pool of worker threads
//! run an ever-growing set of lightweight fibers, each either idling,
//! running a job, or parked on a [`Signal`] until some other job
//! triggers it green again.
//!
//! [`init`]/[`shutdown`] start and stop the whole system; [`run`]/
//! [`run_lambda`]/[`run_on_workers`]/[`for_each`] submit work;
//! [`wait`]/[`JobMutex`]/[`enter`]/[`exit`] synchronize on it.

mod config;
mod fiber_pool;
mod queue;
mod scheduler;
mod signal;
mod worker;

pub use config::RuntimeConfig;
pub use queue::Job;
pub use scheduler::{
    enable_backup_worker, enter, exit, for_each, init, move_job_to_worker, run, run_lambda, run_on_workers,
    scheduler, set_green, set_red, shutdown, wait, workers_count, yield_now, Scheduler, ANY_WORKER,
};
pub use signal::{JobMutex, Signal, Waitor};
pub use worker::current_worker_index;
