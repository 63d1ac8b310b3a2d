//! Dispatch queues: named execution contexts that run submitted tasks.
//!
//! A [`Queue`] is either *serial* (tasks run one at a time in submission
//! order) or *concurrent* (tasks may run in parallel). Three process-wide
//! queues exist:
//!
//! - [`Queue::main`]: the serial context every delegate callback runs on
//! - [`Queue::concurrent_default`]: parallel work at default priority
//! - [`Queue::concurrent_background`]: parallel work at background priority
//!
//! Any number of private serial queues can be created with [`Queue::new`],
//! [`Queue::with_name`] or [`Queue::with_priority`]. A private queue closes
//! once every handle to it is dropped and its pending tasks have run.
//!
//! Queues run on shared Tokio runtimes, one per [`QueuePriority`] (see
//! [`crate::runtime`]); each task executes on the runtime's blocking pool, so
//! a task may block without stalling other queues. A panicking task is logged and does not take the
//! queue down.
//!
//! # Examples
//!
//! ```rust
//! use core_async::queue::Queue;
//! use std::time::Duration;
//!
//! let queue = Queue::with_name("decoder");
//! queue.dispatch(|| println!("async"));
//!
//! let answer = queue.dispatch_sync(|| 6 * 7).unwrap();
//! assert_eq!(answer, 42);
//!
//! queue.dispatch_after(Duration::from_millis(5), || println!("later"));
//! ```

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::runtime::{self, Handle};
use crate::sync::{mpsc, oneshot};
use crate::time::{self, Duration};

/// Unit of work accepted by a queue.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Scheduling priority of a queue.
///
/// Each priority has its own runtime, so load on one level never delays
/// tasks queued at another. The main queue runs at `High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QueuePriority {
    Low,
    #[default]
    Default,
    High,
}

impl QueuePriority {
    fn runtime_handle(self) -> Handle {
        match self {
            QueuePriority::Low => runtime::background_runtime().handle().clone(),
            QueuePriority::Default => runtime::default_runtime().handle().clone(),
            QueuePriority::High => runtime::high_runtime().handle().clone(),
        }
    }

    fn label(self) -> &'static str {
        match self {
            QueuePriority::Low => "low",
            QueuePriority::Default => "default",
            QueuePriority::High => "high",
        }
    }
}

/// Errors reported by synchronous dispatch.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Queue '{0}' is closed")]
    Closed(String),

    #[error("Task on queue '{0}' panicked")]
    TaskPanicked(String),
}

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);

static MAIN_QUEUE: OnceLock<Queue> = OnceLock::new();
static CONCURRENT_DEFAULT: OnceLock<Queue> = OnceLock::new();
static CONCURRENT_BACKGROUND: OnceLock<Queue> = OnceLock::new();

thread_local! {
    static CURRENT_QUEUE: Cell<Option<u64>> = const { Cell::new(None) };
}

enum Mode {
    Serial(mpsc::UnboundedSender<Task>),
    Concurrent,
}

struct QueueInner {
    id: u64,
    name: String,
    priority: QueuePriority,
    handle: Handle,
    mode: Mode,
}

/// Handle to an execution context. Cloning yields another handle to the
/// same queue.
#[derive(Clone)]
pub struct Queue {
    inner: Arc<QueueInner>,
}

impl Queue {
    /// The process-wide serial "main" context.
    pub fn main() -> Queue {
        MAIN_QUEUE
            .get_or_init(|| Queue::serial(QueuePriority::High, |_| "opuskit.main".to_string()))
            .clone()
    }

    /// Shared concurrent queue at default priority.
    pub fn concurrent_default() -> Queue {
        CONCURRENT_DEFAULT
            .get_or_init(|| {
                Queue::concurrent("opuskit.concurrent.default", QueuePriority::Default)
            })
            .clone()
    }

    /// Shared concurrent queue at background priority.
    pub fn concurrent_background() -> Queue {
        CONCURRENT_BACKGROUND
            .get_or_init(|| Queue::concurrent("opuskit.concurrent.background", QueuePriority::Low))
            .clone()
    }

    /// Creates a private serial queue at default priority.
    pub fn new() -> Queue {
        Queue::serial(QueuePriority::Default, |id| format!("opuskit.queue-{id}"))
    }

    /// Creates a private serial queue with a diagnostic name.
    pub fn with_name(name: impl Into<String>) -> Queue {
        let name = name.into();
        Queue::serial(QueuePriority::Default, move |_| name)
    }

    /// Creates a private serial queue scheduled at `priority`.
    pub fn with_priority(priority: QueuePriority) -> Queue {
        Queue::serial(priority, |id| format!("opuskit.queue-{}-{id}", priority.label()))
    }

    /// `name` receives the id allocated to the new queue.
    fn serial(priority: QueuePriority, name: impl FnOnce(u64) -> String) -> Queue {
        let id = NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed);
        let name = name(id);
        let handle = priority.runtime_handle();
        let (tx, mut rx) = mpsc::unbounded_channel::<Task>();

        // The drain loop owns only the receiver so the queue closes when the
        // last `Queue` handle drops its sender.
        let worker = handle.clone();
        let worker_name = name.clone();
        handle.spawn(async move {
            while let Some(task) = rx.recv().await {
                let task_name = worker_name.clone();
                if let Err(e) = worker
                    .spawn_blocking(move || run_task(id, &task_name, task))
                    .await
                {
                    warn!(queue = %worker_name, error = %e, "Serial task was cancelled");
                }
            }
            debug!(queue = %worker_name, "Serial queue closed");
        });

        debug!(queue = %name, priority = priority.label(), "Created serial queue");

        Queue {
            inner: Arc::new(QueueInner {
                id,
                name,
                priority,
                handle,
                mode: Mode::Serial(tx),
            }),
        }
    }

    fn concurrent(name: &str, priority: QueuePriority) -> Queue {
        let id = NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed);
        Queue {
            inner: Arc::new(QueueInner {
                id,
                name: name.to_string(),
                priority,
                handle: priority.runtime_handle(),
                mode: Mode::Concurrent,
            }),
        }
    }

    /// Diagnostic name of the queue.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn priority(&self) -> QueuePriority {
        self.inner.priority
    }

    pub fn is_serial(&self) -> bool {
        matches!(self.inner.mode, Mode::Serial(_))
    }

    /// Returns `true` when called from a task running on this queue.
    pub fn is_current(&self) -> bool {
        CURRENT_QUEUE.with(|current| current.get() == Some(self.inner.id))
    }

    /// Schedules `task` and returns immediately.
    pub fn dispatch<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Err(e) = self.enqueue(Box::new(task)) {
            warn!(error = %e, "Dropping task dispatched to closed queue");
        }
    }

    /// Runs `task` on this queue and blocks until it completes.
    ///
    /// When called from a task already running on this queue, `task` runs
    /// inline so a serial queue never waits on itself.
    ///
    /// Must not be called from inside an async task; use it from plain
    /// threads or from other queues.
    pub fn dispatch_sync<F, R>(&self, task: F) -> Result<R, QueueError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_current() {
            return catch_unwind(AssertUnwindSafe(task))
                .map_err(|_| QueueError::TaskPanicked(self.inner.name.clone()));
        }

        let (tx, rx) = oneshot::channel();
        self.enqueue(Box::new(move || {
            let _ = tx.send(task());
        }))?;

        rx.blocking_recv()
            .map_err(|_| QueueError::TaskPanicked(self.inner.name.clone()))
    }

    /// Dispatches `task` either synchronously or asynchronously.
    pub fn dispatch_with<F>(&self, task: F, synchronous: bool) -> Result<(), QueueError>
    where
        F: FnOnce() + Send + 'static,
    {
        if synchronous {
            self.dispatch_sync(task)
        } else {
            self.enqueue(Box::new(task))
        }
    }

    /// Schedules `task` to run on this queue no earlier than `delay` from now.
    pub fn dispatch_after<F>(&self, delay: Duration, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let queue = self.clone();
        self.inner.handle.spawn(async move {
            time::sleep(delay).await;
            queue.dispatch(task);
        });
    }

    fn enqueue(&self, task: Task) -> Result<(), QueueError> {
        match &self.inner.mode {
            Mode::Serial(tx) => tx
                .send(task)
                .map_err(|_| QueueError::Closed(self.inner.name.clone())),
            Mode::Concurrent => {
                let inner = Arc::clone(&self.inner);
                self.inner
                    .handle
                    .spawn_blocking(move || run_task(inner.id, &inner.name, task));
                Ok(())
            }
        }
    }
}

impl Default for Queue {
    fn default() -> Self {
        Queue::new()
    }
}

impl PartialEq for Queue {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Queue {}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.inner.name)
            .field("priority", &self.inner.priority)
            .field("serial", &self.is_serial())
            .finish()
    }
}

fn run_task(queue_id: u64, queue_name: &str, task: Task) {
    let previous = CURRENT_QUEUE.with(|current| current.replace(Some(queue_id)));
    let outcome = catch_unwind(AssertUnwindSafe(task));
    CURRENT_QUEUE.with(|current| current.set(previous));

    if let Err(payload) = outcome {
        error!(
            queue = queue_name,
            panic = %panic_message(payload.as_ref()),
            "Task panicked"
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
