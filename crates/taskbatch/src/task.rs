// Task functions
//
// A task is either a plain blocking function or an async one. The variant is
// fixed when the task is built, so blocking tasks never touch a runtime.
// Async tasks run on the executing worker's own runtime (see WorkerContext).

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{FutureExt, LocalBoxFuture};

use crate::target::Target;
use crate::worker::WorkerContext;

type BlockingFn<D, R> = dyn Fn(&Target<D>) -> anyhow::Result<R> + Send + Sync;
type SuspendingFn<D, R> =
    dyn Fn(Arc<Target<D>>) -> LocalBoxFuture<'static, anyhow::Result<R>> + Send + Sync;

/// User-supplied task function
///
/// Extra arguments are captured by the closure. Failures are signalled by
/// returning `Err`; the error reaches `on_error` unchanged once retries are
/// exhausted.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use taskbatch::{Target, TaskFn};
///
/// let suffix = "!".to_string();
/// let shout: TaskFn<String, String> =
///     TaskFn::blocking(move |t: &Target<String>| Ok(format!("{}{}", t.data(), suffix)));
///
/// let fetch: TaskFn<usize, usize> = TaskFn::suspending(|t: Arc<Target<usize>>| async move {
///     Ok(*t.data() * 2)
/// });
/// assert!(fetch.is_suspending());
/// # let _ = shout;
/// ```
pub enum TaskFn<D, R> {
    /// Called directly on the worker thread
    Blocking(Arc<BlockingFn<D, R>>),
    /// Driven to completion on the worker's runtime
    Suspending(Arc<SuspendingFn<D, R>>),
}

impl<D, R> TaskFn<D, R> {
    /// Wrap a blocking function
    pub fn blocking<F>(f: F) -> Self
    where
        F: Fn(&Target<D>) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        TaskFn::Blocking(Arc::new(f))
    }

    /// Wrap an async function
    ///
    /// The future does not need to be `Send`: it never leaves the worker
    /// thread that created it.
    pub fn suspending<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<Target<D>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + 'static,
    {
        TaskFn::Suspending(Arc::new(move |target| f(target).boxed_local()))
    }

    pub fn is_suspending(&self) -> bool {
        matches!(self, TaskFn::Suspending(_))
    }

    /// Run one attempt on the current worker
    pub fn call(&self, target: &Arc<Target<D>>, ctx: &WorkerContext) -> anyhow::Result<R> {
        match self {
            TaskFn::Blocking(f) => f(target.as_ref()),
            TaskFn::Suspending(f) => ctx.block_on(f(Arc::clone(target)))?,
        }
    }
}

impl<D, R> Clone for TaskFn<D, R> {
    fn clone(&self) -> Self {
        match self {
            TaskFn::Blocking(f) => TaskFn::Blocking(Arc::clone(f)),
            TaskFn::Suspending(f) => TaskFn::Suspending(Arc::clone(f)),
        }
    }
}

impl<D, R> fmt::Debug for TaskFn<D, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskFn::Blocking(_) => f.write_str("TaskFn::Blocking"),
            TaskFn::Suspending(_) => f.write_str("TaskFn::Suspending"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_blocking_call_skips_runtime() {
        let ctx = WorkerContext::new(0);
        let task = TaskFn::blocking(|t: &Target<u32>| Ok(t.data() + 1));
        let target = Arc::new(Target::new(0, 41));

        assert!(!task.is_suspending());
        assert_eq!(task.call(&target, &ctx).unwrap(), 42);
        assert!(!ctx.has_runtime());
    }

    #[test]
    fn test_suspending_call_uses_worker_runtime() {
        let ctx = WorkerContext::new(0);
        let task = TaskFn::suspending(|t: Arc<Target<u32>>| async move {
            tokio::time::sleep(Duration::from_millis(1)).await;
            Ok(t.data() * 3)
        });
        let target = Arc::new(Target::new(0, 5));

        assert!(task.is_suspending());
        assert_eq!(task.call(&target, &ctx).unwrap(), 15);
        assert!(ctx.has_runtime());

        // Second call reuses the same runtime
        assert_eq!(task.clone().call(&target, &ctx).unwrap(), 15);
    }

    #[test]
    fn test_suspending_error_passes_through() {
        let ctx = WorkerContext::new(0);
        let task: TaskFn<(), ()> =
            TaskFn::suspending(|_| async { Err(anyhow::anyhow!("remote said no")) });

        let err = task.call(&Arc::new(Target::new(0, ())), &ctx).unwrap_err();
        assert_eq!(err.to_string(), "remote said no");
    }

    #[test]
    fn test_debug() {
        let task: TaskFn<(), ()> = TaskFn::blocking(|_| Ok(()));
        assert_eq!(format!("{task:?}"), "TaskFn::Blocking");
    }
}
