//! Task handles

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::Error;

/// Outcome of one submitted task
pub type TaskOutcome<R> = anyhow::Result<R>;

/// Handle to one submitted task
///
/// Resolves once, after the task's completion callback has run. Block on it
/// with [`wait`](Self::wait) or `.await` it from async code.
#[derive(Debug)]
pub struct TaskHandle<R> {
    rx: oneshot::Receiver<TaskOutcome<R>>,
    finished: Arc<AtomicBool>,
}

/// Worker-side half of a [`TaskHandle`]
#[derive(Debug)]
pub(crate) struct Completion<R> {
    tx: oneshot::Sender<TaskOutcome<R>>,
    finished: Arc<AtomicBool>,
}

pub(crate) fn channel<R>() -> (Completion<R>, TaskHandle<R>) {
    let (tx, rx) = oneshot::channel();
    let finished = Arc::new(AtomicBool::new(false));
    (
        Completion {
            tx,
            finished: Arc::clone(&finished),
        },
        TaskHandle { rx, finished },
    )
}

impl<R> Completion<R> {
    /// Resolve the handle; a dropped handle is fine
    pub(crate) fn complete(self, outcome: TaskOutcome<R>) {
        let _ = self.tx.send(outcome);
        self.finished.store(true, Ordering::Release);
    }
}

impl<R> TaskHandle<R> {
    /// Block the current thread until the task finishes
    ///
    /// Panics if called from within an async runtime; `.await` the handle
    /// there instead.
    pub fn wait(self) -> TaskOutcome<R> {
        self.rx
            .blocking_recv()
            .unwrap_or_else(|_| Err(Error::Abandoned.into()))
    }

    /// Whether the task has reached its terminal state
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

impl<R> Future for TaskHandle<R> {
    type Output = TaskOutcome<R>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(Error::Abandoned.into())))
    }
}
