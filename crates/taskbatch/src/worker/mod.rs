//! Worker pool for task execution
//!
//! This module provides:
//! - [`WorkerPool`] - Fixed-size thread pool with completion callbacks
//! - [`WorkerContext`] - Per-worker state, including the lazily built async runtime
//! - [`TaskHandle`] - Blocking or awaitable handle to one submitted task
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       WorkerPool                             │
//! │                                                              │
//! │   submit() ──► mpsc queue (unbounded) ──┐                    │
//! │                                         ▼                    │
//! │  ┌──────────────┐ ┌──────────────┐ ┌──────────────┐          │
//! │  │  worker-0    │ │  worker-1    │ │  worker-N    │          │
//! │  │ WorkerContext│ │ WorkerContext│ │ WorkerContext│          │
//! │  │ (runtime)    │ │ (runtime)    │ │ (runtime)    │          │
//! │  └──────┬───────┘ └──────┬───────┘ └──────┬───────┘          │
//! │         ▼                ▼                ▼                  │
//! │   CompletionHooks (exactly one fires) ──► TaskHandle         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod context;
mod handle;
mod pool;

pub use context::WorkerContext;
pub use handle::{TaskHandle, TaskOutcome};
pub use pool::{CompletionHooks, WorkerPool, WorkerPoolConfig, WorkerPoolStatus};
