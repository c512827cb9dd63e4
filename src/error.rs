//! Crate-wide error type for the OS-boundary operations of the job runtime.
//!
//! Everything else in this crate follows the original engine's taxonomy:
//! programmer errors (a signal destroyed while red, a mutex destroyed while
//! held, an allocator leaking) are `assert!`/`debug_assert!`, never a
//! `Result`. Only failures that genuinely originate from the OS -- thread
//! spawn, virtual memory reserve/commit/release, semaphore/condvar
//! construction -- are represented here.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("failed to spawn worker thread: {0}")]
    ThreadSpawn(std::io::Error),

    #[error("failed to set thread affinity for worker {worker}: {source}")]
    ThreadAffinity {
        worker: usize,
        source: std::io::Error,
    },

    #[error("failed to reserve {size} bytes of virtual memory")]
    VirtualReserve { size: usize },

    #[error("failed to commit {size} bytes of virtual memory at {addr:#x}")]
    VirtualCommit { addr: usize, size: usize },

    #[error("job system failed to start: no worker threads came up")]
    NoWorkers,

    #[error("job system already initialized")]
    AlreadyInitialized,

    #[error("job system not initialized")]
    NotInitialized,
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
