//! Async channels.
//!
//! Channels are async-aware and must not be used from the render path;
//! blocking mutual exclusion lives in [`crate::lock`].
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::oneshot;
//!
//! let (tx, rx) = oneshot::channel();
//! std::thread::spawn(move || tx.send(7).ok());
//! assert_eq!(rx.blocking_recv().unwrap(), 7);
//! ```

pub use tokio::sync::{mpsc, oneshot};
