//! Per-worker execution context

use std::cell::OnceCell;
use std::future::Future;

use tokio::runtime::{Builder, Runtime};
use tracing::debug;

use crate::error::Error;

/// State owned by a single worker thread for its whole lifetime
///
/// Holds the worker's async runtime. The runtime is built on the first
/// [`block_on`](Self::block_on) and reused for every later call on the same
/// worker, across retries and across tasks. Contexts are never shared between
/// workers (`WorkerContext` is `!Sync`).
#[derive(Debug)]
pub struct WorkerContext {
    id: usize,
    runtime: OnceCell<Runtime>,
}

impl WorkerContext {
    pub(crate) fn new(id: usize) -> Self {
        Self {
            id,
            runtime: OnceCell::new(),
        }
    }

    /// Zero-based worker number within its pool
    pub fn id(&self) -> usize {
        self.id
    }

    /// Whether this worker has built its runtime yet
    pub fn has_runtime(&self) -> bool {
        self.runtime.get().is_some()
    }

    /// Drive `future` to completion on this worker's runtime
    ///
    /// Blocks the worker thread until the future resolves. Must not be called
    /// from inside another runtime.
    pub fn block_on<F: Future>(&self, future: F) -> Result<F::Output, Error> {
        Ok(self.runtime()?.block_on(future))
    }

    fn runtime(&self) -> Result<&Runtime, Error> {
        if let Some(runtime) = self.runtime.get() {
            return Ok(runtime);
        }

        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(Error::Runtime)?;
        debug!(worker = self.id, "Built worker runtime");

        Ok(self.runtime.get_or_init(|| runtime))
    }
}
