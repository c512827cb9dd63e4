//! OS synchronization primitives: mutex, condition variable, counting
//! semaphore with multi-wait, and a named/affinity-pinnable thread handle.
//!
//! These sit directly on the OS (via `parking_lot`'s futex-based lock and
//! `std::thread`) and have no notion of fibers or jobs -- that layer is
//! built on top, in [`crate::job`].

mod condvar;
mod mutex;
mod semaphore;
mod thread;

pub use condvar::CondVar;
pub use mutex::{Mutex, MutexGuard};
pub use semaphore::Semaphore;
pub use thread::{Thread, ThreadTask, ThreadWaker};
