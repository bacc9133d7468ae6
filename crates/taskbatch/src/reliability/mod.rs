//! Reliability patterns for task execution
//!
//! This module provides:
//! - [`RetryPolicy`] - Fixed-delay retry configuration
//! - [`retrying`] - Wraps an operation with bounded retries

mod retry;

pub use retry::{retrying, RetryPolicy, RetryState};
