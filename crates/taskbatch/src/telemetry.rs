// Logging setup and per-task loggers
//
// Nothing here runs implicitly: the owning application calls `init()` once.
// Per-task loggers are spans labelled with the task name, so every line a task
// emits carries its label without touching global state.

use std::fmt::Display;
use std::sync::Arc;

use tracing::Span;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "info";

/// Install the global `tracing` subscriber with the default filter
///
/// Returns `false` if a subscriber was already installed.
pub fn init() -> bool {
    init_with_filter(DEFAULT_FILTER)
}

/// Install the global `tracing` subscriber
///
/// `RUST_LOG` takes precedence over `default_filter`. Safe to call more than
/// once; only the first call installs anything.
pub fn init_with_filter(default_filter: &str) -> bool {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_names(true),
        )
        .try_init()
        .is_ok()
}

/// Label for the task at `index` (1-based, zero-padded to five digits)
pub fn task_label(index: usize) -> String {
    format!("{:05}", index + 1)
}

/// Logger bound to one task
///
/// Cheap to clone; clones share the same span.
#[derive(Debug, Clone)]
pub struct TaskLogger {
    label: Arc<str>,
    span: Span,
}

impl TaskLogger {
    /// Create a logger whose span is a child of the current span
    pub fn new(label: impl Into<String>) -> Self {
        let label: Arc<str> = label.into().into();
        let span = tracing::info_span!("task", task = %label);
        Self { label, span }
    }

    /// Logger for the task at `index`
    pub fn for_index(index: usize) -> Self {
        Self::new(task_label(index))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn info(&self, message: impl Display) {
        self.span.in_scope(|| tracing::info!("{message}"));
    }

    pub fn warn(&self, message: impl Display) {
        self.span.in_scope(|| tracing::warn!("{message}"));
    }

    pub fn error(&self, message: impl Display) {
        self.span.in_scope(|| tracing::error!("{message}"));
    }

    /// Info-level line tagged `outcome = "success"`
    pub fn success(&self, message: impl Display) {
        self.span
            .in_scope(|| tracing::info!(outcome = "success", "{message}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_label_is_one_based_and_padded() {
        assert_eq!(task_label(0), "00001");
        assert_eq!(task_label(41), "00042");
        assert_eq!(task_label(123_455), "123456");
    }

    #[test]
    fn test_logger_label() {
        let logger = TaskLogger::for_index(9);
        assert_eq!(logger.label(), "00010");

        let clone = logger.clone();
        assert_eq!(clone.label(), logger.label());
    }

    #[test]
    fn test_init_is_idempotent() {
        let _ = init();
        assert!(!init());
    }

    #[test_log::test]
    fn test_leveled_calls_do_not_panic() {
        let logger = TaskLogger::new("unit");
        logger.info("info line");
        logger.warn("warn line");
        logger.error("error line");
        logger.success("success line");
    }
}
