//! # Taskbatch
//!
//! Bounded-concurrency batch execution of a user function over many inputs.
//!
//! ## Features
//!
//! - **Batch sources**: a count, a list of payloads, a JSON value or a text file of separated fields
//! - **Fixed-size worker pool**: at most `max_workers` tasks run at once; extra tasks queue
//! - **Retries**: a fixed number of retries with a fixed delay and a notification before each retry
//! - **Callbacks**: exactly one of success/error fires per task, after retries are exhausted
//! - **Async tasks**: async task functions run on a runtime owned by the executing worker
//! - **Proxy templating**: per-task proxy URLs derived from the task payload
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        TaskRunner                            │
//! │  (settings, source expansion, shuffle, proxy, callbacks)    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │  Target + retrying(TaskFn)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        WorkerPool                            │
//! │  (N threads, shared queue, completion hooks, TaskHandle)    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      WorkerContext                           │
//! │  (lazy current-thread runtime, reused across tasks)         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use taskbatch::prelude::*;
//!
//! taskbatch::telemetry::init();
//!
//! let runner = TaskRunner::with_overrides(
//!     "words",
//!     SettingsOverrides::new().with_max_workers(2).with_retries(0),
//! )?;
//!
//! let handles = runner.submit_tasks(
//!     vec!["alpha".to_string(), "beta".to_string()],
//!     TaskFn::blocking(|t: &Target<String>| Ok(t.data().len())),
//!     Callbacks::new().on_error(|t: &Target<String>, err: &anyhow::Error| {
//!         t.logger().error(format!("giving up: {err}"))
//!     }),
//!     SubmitOptions::new(),
//! )?;
//!
//! let lengths: Vec<usize> = handles.into_iter().map(|h| h.wait().unwrap()).collect();
//! assert_eq!(lengths, vec![5, 4]);
//! # Ok::<(), taskbatch::Error>(())
//! ```

pub mod config;
pub mod error;
pub mod files;
pub mod reliability;
pub mod runner;
pub mod source;
pub mod target;
pub mod task;
pub mod telemetry;
pub mod worker;

/// Prelude for common imports
pub mod prelude {
    pub use crate::config::{Settings, SettingsOverrides};
    pub use crate::error::{Error, Result};
    pub use crate::reliability::RetryPolicy;
    pub use crate::runner::{Callbacks, SubmitOptions, TaskRunner, DEFAULT_SEPARATOR};
    pub use crate::target::{ProxyKey, Target};
    pub use crate::task::TaskFn;
    pub use crate::telemetry::TaskLogger;
    pub use crate::worker::{TaskHandle, TaskOutcome};
}

// Re-export key types at crate root
pub use config::{ConfigSource, EnvSource, Settings, SettingsOverrides};
pub use error::{Error, Result};
pub use reliability::{retrying, RetryPolicy, RetryState};
pub use runner::{Callbacks, SubmitOptions, TaskRunner, DEFAULT_SEPARATOR};
pub use source::{TaskSource, Units};
pub use target::{ProxyKey, Target};
pub use task::TaskFn;
pub use telemetry::TaskLogger;
pub use worker::{
    CompletionHooks, TaskHandle, TaskOutcome, WorkerContext, WorkerPool, WorkerPoolConfig,
    WorkerPoolStatus,
};
