//! Worker pool for task execution
//!
//! Fixed number of worker threads with exactly-once completion callbacks and
//! graceful shutdown.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::context::WorkerContext;
use super::handle::{self, TaskHandle, TaskOutcome};
use crate::error::{panic_message, Error};
use crate::target::Target;

/// Worker pool configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    /// Pool name, used as the worker thread name prefix
    pub name: String,

    /// Number of worker threads
    pub max_workers: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            name: "taskbatch".to_string(),
            max_workers: 5,
        }
    }
}

impl WorkerPoolConfig {
    /// Create a configuration with `max_workers` threads
    pub fn new(max_workers: usize) -> Self {
        Self::default().with_max_workers(max_workers)
    }

    /// Set the pool name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the number of workers
    pub fn with_max_workers(mut self, max: usize) -> Self {
        self.max_workers = max.max(1);
        self
    }
}

/// Worker pool status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPoolStatus {
    /// Accepting tasks
    Running,
    /// Shut down, still finishing queued or running tasks
    Draining,
    /// Shut down with nothing left to run
    Stopped,
}

type SuccessHook<D, R> = Box<dyn FnOnce(Option<&Target<D>>, &R) + Send>;
type ErrorHook<D> = Box<dyn FnOnce(Option<&Target<D>>, &anyhow::Error) + Send>;

/// Callbacks fired when a task reaches its terminal state
///
/// At most one of them runs, exactly once, on the worker that ran the task.
/// A panicking callback is caught and logged; the worker keeps running and
/// the task handle still resolves.
pub struct CompletionHooks<D, R> {
    on_success: Option<SuccessHook<D, R>>,
    on_error: Option<ErrorHook<D>>,
}

impl<D, R> Default for CompletionHooks<D, R> {
    fn default() -> Self {
        Self {
            on_success: None,
            on_error: None,
        }
    }
}

impl<D, R> CompletionHooks<D, R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_success<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(Option<&Target<D>>, &R) + Send + 'static,
    {
        self.on_success = Some(Box::new(hook));
        self
    }

    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(Option<&Target<D>>, &anyhow::Error) + Send + 'static,
    {
        self.on_error = Some(Box::new(hook));
        self
    }

    fn dispatch(self, target: Option<&Target<D>>, outcome: &TaskOutcome<R>) {
        let Self {
            on_success,
            on_error,
        } = self;

        let result = panic::catch_unwind(AssertUnwindSafe(move || match outcome {
            Ok(value) => {
                if let Some(hook) = on_success {
                    hook(target, value);
                }
            }
            Err(err) => {
                if let Some(hook) = on_error {
                    hook(target, err);
                }
            }
        }));

        if let Err(payload) = result {
            error!(
                task = ?target.map(|t| t.logger().label()),
                panic = %panic_message(payload.as_ref()),
                "Completion callback panicked"
            );
        }
    }
}

type Job = Box<dyn FnOnce(&WorkerContext) + Send + 'static>;

/// Fixed-size pool of worker threads
///
/// Workers pull jobs from a shared queue as they free up, so completion order
/// is unrelated to submission order. Queueing is unbounded.
///
/// Dropping the pool runs [`shutdown(true)`](Self::shutdown): every
/// submitted task finishes and its callback fires before the drop returns.
///
/// # Example
///
/// ```
/// use taskbatch::worker::{CompletionHooks, WorkerPool, WorkerPoolConfig};
///
/// let pool = WorkerPool::new(WorkerPoolConfig::new(2)).unwrap();
///
/// let handle = pool
///     .submit::<(), _, _>(None, |_ctx| Ok(2 + 2), CompletionHooks::new())
///     .unwrap();
/// assert_eq!(handle.wait().unwrap(), 4);
///
/// pool.shutdown(true);
/// ```
pub struct WorkerPool {
    config: WorkerPoolConfig,
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    pending: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Create a pool and start its workers
    pub fn new(config: WorkerPoolConfig) -> Result<Self, Error> {
        let max_workers = config.max_workers.max(1);
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let mut workers = Vec::with_capacity(max_workers);
        for id in 0..max_workers {
            let receiver = Arc::clone(&receiver);
            let spawned = thread::Builder::new()
                .name(format!("{}-worker-{}", config.name, id))
                .spawn(move || worker_loop(WorkerContext::new(id), receiver));

            match spawned {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    // Close the queue so already-started workers exit
                    drop(sender);
                    for worker in workers {
                        let _ = worker.join();
                    }
                    return Err(Error::WorkerSpawn(e));
                }
            }
        }

        info!(pool = %config.name, max_workers, "Started worker pool");

        Ok(Self {
            config: WorkerPoolConfig {
                max_workers,
                ..config
            },
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            pending: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Submit a job
    ///
    /// `target` is handed to whichever hook fires. The job receives the
    /// worker's [`WorkerContext`]. A panicking job counts as a failure with
    /// [`Error::TaskPanicked`].
    ///
    /// Hooks must not block on other tasks of the same pool: they run on the
    /// worker thread.
    pub fn submit<D, R, F>(
        &self,
        target: Option<Arc<Target<D>>>,
        job: F,
        hooks: CompletionHooks<D, R>,
    ) -> Result<TaskHandle<R>, Error>
    where
        D: Send + Sync + 'static,
        R: Send + 'static,
        F: FnOnce(&WorkerContext) -> anyhow::Result<R> + Send + 'static,
    {
        let sender = self.sender.lock();
        let sender = sender.as_ref().ok_or(Error::PoolShutDown)?;

        let (completion, handle) = handle::channel();
        let pending = Arc::clone(&self.pending);

        let wrapped: Job = Box::new(move |ctx: &WorkerContext| {
            let outcome = match panic::catch_unwind(AssertUnwindSafe(|| job(ctx))) {
                Ok(outcome) => outcome,
                Err(payload) => Err(Error::from_panic(payload).into()),
            };

            hooks.dispatch(target.as_deref(), &outcome);
            pending.fetch_sub(1, Ordering::SeqCst);
            completion.complete(outcome);
        });

        self.pending.fetch_add(1, Ordering::SeqCst);
        if sender.send(wrapped).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::PoolShutDown);
        }

        Ok(handle)
    }

    /// Stop accepting new tasks
    ///
    /// Queued and running tasks still complete. With `wait`, blocks until
    /// every worker has drained the queue and exited. Idempotent.
    pub fn shutdown(&self, wait: bool) {
        if let Some(sender) = self.sender.lock().take() {
            info!(
                pool = %self.config.name,
                pending = self.pending(),
                wait,
                "Shutting down worker pool"
            );
            drop(sender);
        }

        if !wait {
            return;
        }

        let workers = std::mem::take(&mut *self.workers.lock());
        let current = thread::current().id();
        for worker in workers {
            if worker.thread().id() == current {
                // Shutdown requested from one of our own callbacks
                warn!(pool = %self.config.name, "Skipping join of the calling worker");
                continue;
            }
            if worker.join().is_err() {
                error!(pool = %self.config.name, "Worker thread panicked");
            }
        }

        debug!(pool = %self.config.name, "Worker pool stopped");
    }

    /// Get current status
    pub fn status(&self) -> WorkerPoolStatus {
        if self.sender.lock().is_some() {
            WorkerPoolStatus::Running
        } else if self.pending() > 0 {
            WorkerPoolStatus::Draining
        } else {
            WorkerPoolStatus::Stopped
        }
    }

    /// Check if accepting tasks
    pub fn is_accepting(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// Tasks submitted but not yet completed (queued or running)
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn max_workers(&self) -> usize {
        self.config.max_workers
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown(true);
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .field("status", &self.status())
            .field("pending", &self.pending())
            .finish()
    }
}

fn worker_loop(ctx: WorkerContext, receiver: Arc<Mutex<mpsc::Receiver<Job>>>) {
    debug!(worker = ctx.id(), "Worker started");

    loop {
        // Guard is released before the job runs
        let job = receiver.lock().recv();
        match job {
            Ok(job) => job(&ctx),
            Err(_) => break,
        }
    }

    debug!(worker = ctx.id(), "Worker exited");
}
