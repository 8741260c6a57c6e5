//! Deferred executors
//!
//! The batching queue never runs deliveries inline. It hands a flush job to a
//! [`DeferredExecutor`], which runs it at low priority some time later:
//!
//! - `TokioIdleExecutor`: spawned task that yields first (preferred)
//! - `ThreadTimerExecutor`: detached thread after a short delay (no runtime)
//! - `ManualExecutor`: records jobs until the test runs them

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;

/// A deferred unit of work
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs a job at low priority, later
pub trait DeferredExecutor: Send + Sync {
    fn defer(&self, job: Job);

    /// Executor name (for logging)
    fn name(&self) -> &'static str;
}

/// Spawns each job on a tokio runtime behind a cooperative yield
pub struct TokioIdleExecutor {
    handle: Handle,
}

impl TokioIdleExecutor {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Bind to the runtime of the calling context, if any
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl DeferredExecutor for TokioIdleExecutor {
    fn defer(&self, job: Job) {
        self.handle.spawn(async move {
            tokio::task::yield_now().await;
            job();
        });
    }

    fn name(&self) -> &'static str {
        "tokio-idle"
    }
}

/// Runs each job on its own thread after a fixed delay
pub struct ThreadTimerExecutor {
    delay: Duration,
}

impl ThreadTimerExecutor {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for ThreadTimerExecutor {
    fn default() -> Self {
        Self::new(Duration::from_millis(1))
    }
}

impl DeferredExecutor for ThreadTimerExecutor {
    fn defer(&self, job: Job) {
        let delay = self.delay;
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            job();
        });
    }

    fn name(&self) -> &'static str {
        "thread-timer"
    }
}

/// Records deferred jobs; nothing runs until [`ManualExecutor::run_pending`]
#[derive(Default)]
pub struct ManualExecutor {
    jobs: Mutex<Vec<Job>>,
    deferred: AtomicU64,
}

impl ManualExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the jobs deferred so far, in order. Jobs deferred while running
    /// wait for the next call.
    pub fn run_pending(&self) -> usize {
        let jobs = std::mem::take(&mut *self.jobs.lock().unwrap_or_else(|e| e.into_inner()));
        let count = jobs.len();
        for job in jobs {
            job();
        }
        count
    }

    /// Jobs waiting to run
    pub fn pending(&self) -> usize {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Jobs ever deferred
    pub fn total_deferred(&self) -> u64 {
        self.deferred.load(Ordering::SeqCst)
    }
}

impl DeferredExecutor for ManualExecutor {
    fn defer(&self, job: Job) {
        self.deferred.fetch_add(1, Ordering::SeqCst);
        self.jobs.lock().unwrap_or_else(|e| e.into_inner()).push(job);
    }

    fn name(&self) -> &'static str {
        "manual"
    }
}

/// Best available executor for the calling context
pub fn default_executor() -> Arc<dyn DeferredExecutor> {
    match TokioIdleExecutor::current() {
        Some(executor) => Arc::new(executor),
        None => Arc::new(ThreadTimerExecutor::default()),
    }
}
