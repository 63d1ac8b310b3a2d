//! Timer primitives used by the dispatch queues.
//!
//! # Examples
//!
//! ```rust
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     sleep(Duration::from_millis(10)).await;
//! }
//! ```

pub use tokio::time::sleep;

pub use std::time::Duration;
