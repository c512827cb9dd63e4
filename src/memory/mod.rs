//! The allocator hierarchy the scheduler and its jobs allocate through.
//!
//! [`traits::Allocator`] is the common interface; [`bucket_allocator`] is
//! the process-wide default (small objects bucketed, large ones system-
//! allocated); [`arena`], [`stack_allocator`], [`tag_allocator`] and
//! [`proxy_allocator`] are the specialised wrappers jobs reach for when
//! the default's general-purpose tradeoffs don't fit. [`page_allocator`]
//! sits underneath all of them as the source of raw 4 KiB pages.

pub mod arena;
pub mod bucket_allocator;
pub mod os_mem;
pub mod page_allocator;
pub mod proxy_allocator;
pub mod stack_allocator;
pub mod tag_allocator;
pub mod traits;

pub use arena::ArenaAllocator;
pub use bucket_allocator::BucketAllocator;
pub use page_allocator::PageAllocator;
pub use proxy_allocator::ProxyAllocator;
pub use stack_allocator::StackAllocator;
pub use tag_allocator::TagAllocator;
pub use traits::Allocator;
