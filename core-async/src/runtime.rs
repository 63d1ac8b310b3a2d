//! Runtime utilities that abstract over the underlying async executor.
//!
//! We wrap Tokio's runtime primitives so that downstream crates never need to
//! depend on Tokio directly. Three process-wide runtimes back the dispatch
//! queues, one per priority. Each is created on first use and lives until
//! the process exits.

use std::sync::OnceLock;

pub use tokio::runtime::{Builder, Handle, Runtime};

static DEFAULT_RUNTIME: OnceLock<Runtime> = OnceLock::new();
static BACKGROUND_RUNTIME: OnceLock<Runtime> = OnceLock::new();
static HIGH_RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Runs the provided future to completion using a lightweight runtime.
pub fn block_on<F>(future: F) -> F::Output
where
    F: std::future::Future,
{
    Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("core_async::runtime::block_on: failed to build Tokio runtime")
        .block_on(future)
}

/// Shared runtime used by default-priority queues.
pub fn default_runtime() -> &'static Runtime {
    DEFAULT_RUNTIME.get_or_init(|| {
        Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("opuskit-default")
            .enable_all()
            .build()
            .expect("core_async::runtime: failed to build default runtime")
    })
}

/// Shared runtime used by background-priority queues.
pub fn background_runtime() -> &'static Runtime {
    BACKGROUND_RUNTIME.get_or_init(|| {
        Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(64)
            .thread_name("opuskit-background")
            .enable_all()
            .build()
            .expect("core_async::runtime: failed to build background runtime")
    })
}

/// Shared runtime used by the main queue and other high-priority queues.
pub fn high_runtime() -> &'static Runtime {
    HIGH_RUNTIME.get_or_init(|| {
        Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("opuskit-high")
            .enable_all()
            .build()
            .expect("core_async::runtime: failed to build high-priority runtime")
    })
}
