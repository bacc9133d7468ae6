// Error types for batch submission and the worker pool
//
// Task functions report failures as `anyhow::Error`; those pass through the
// retry executor and the pool untouched. This enum covers what the framework
// itself can reject or observe.

use thiserror::Error;

/// Result type alias for framework operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the framework (not by task functions)
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source cannot be expanded into work units
    #[error("Invalid task source: {0}")]
    InvalidSource(String),

    /// Pool no longer accepts work
    #[error("worker pool is shut down")]
    PoolShutDown,

    /// Task function panicked instead of returning an error
    #[error("task panicked: {0}")]
    TaskPanicked(String),

    /// Worker thread could not be spawned
    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    /// Per-worker async runtime could not be built
    #[error("failed to build worker runtime: {0}")]
    Runtime(#[source] std::io::Error),

    /// Worker went away without resolving the task handle
    #[error("task was abandoned before completing")]
    Abandoned,
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create an invalid source error
    pub fn invalid_source(msg: impl Into<String>) -> Self {
        Error::InvalidSource(msg.into())
    }

    /// Build a panic error from a `catch_unwind` payload
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        Error::TaskPanicked(panic_message(payload.as_ref()))
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
