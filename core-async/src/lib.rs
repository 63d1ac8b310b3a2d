//! Runtime abstraction layer for OpusKit.
//!
//! This crate provides the execution contexts and synchronization primitives
//! the playback engine is built on. Everything is backed by Tokio; downstream
//! crates depend on this crate instead of depending on Tokio directly.
//!
//! # Modules
//!
//! - `runtime`: The shared Tokio runtimes and `block_on`
//! - `time`: Timers (`sleep`, `Duration`)
//! - `sync`: Async channels (`mpsc`, `oneshot`)
//! - `lock`: Blocking mutual exclusion with scoped regions ([`Lock`])
//! - `queue`: Serial and concurrent dispatch queues ([`Queue`])
//!
//! # Examples
//!
//! ```rust
//! use core_async::queue::Queue;
//! use core_async::lock::Lock;
//! use std::sync::Arc;
//!
//! let counter = Arc::new(Lock::new(0));
//! let queue = Queue::with_name("example");
//!
//! let c = Arc::clone(&counter);
//! queue.dispatch_sync(move || c.synchronized(|n| *n += 1)).unwrap();
//! assert_eq!(*counter.lock(), 1);
//! ```

// Re-export the entry-point/test macros so downstream crates never need
// direct Tokio dependencies.
pub use core_async_macros::{main, test};

pub mod lock;
pub mod queue;
pub mod runtime;
pub mod sync;
pub mod time;

pub use lock::{Lock, LockGuard};
pub use queue::{Queue, QueueError, QueuePriority};
