//! Retry policy and the retrying executor

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for task retries
///
/// Attempts are spaced by a fixed delay. A delay of zero retries immediately.
///
/// # Example
///
/// ```
/// use taskbatch::RetryPolicy;
/// use std::time::Duration;
///
/// // 2 retries after the first attempt, 3 seconds apart
/// let policy = RetryPolicy::from_retries(2, Duration::from_secs(3));
/// assert_eq!(policy.max_attempts, 3);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including initial)
    pub max_attempts: u32,

    /// Delay between a failed attempt and the next one
    #[serde(with = "duration_millis")]
    pub delay: Duration,

    /// Emit the pre-retry notification even when there is no delay
    #[serde(default = "default_notify_without_delay")]
    pub notify_without_delay: bool,
}

fn default_notify_without_delay() -> bool {
    true
}

impl Default for RetryPolicy {
    /// Two retries, no delay
    fn default() -> Self {
        Self::from_retries(2, Duration::ZERO)
    }
}

impl RetryPolicy {
    /// Create a policy that never retries
    pub fn no_retry() -> Self {
        Self::fixed(Duration::ZERO, 1)
    }

    /// Create a policy with a fixed interval
    ///
    /// `max_attempts` is clamped to at least one.
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            notify_without_delay: true,
        }
    }

    /// Create a policy from a retry count (`max_attempts = retries + 1`)
    pub fn from_retries(retries: u32, delay: Duration) -> Self {
        Self::fixed(delay, retries.saturating_add(1))
    }

    /// Set the maximum number of attempts
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the delay between attempts
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Choose whether zero-delay retries still emit a notification
    pub fn with_notify_without_delay(mut self, notify: bool) -> Self {
        self.notify_without_delay = notify;
        self
    }

    /// Number of retries after the first attempt
    pub fn retries(&self) -> u32 {
        self.max_attempts.saturating_sub(1)
    }

    /// Delay before the given attempt (1-based)
    ///
    /// The first attempt never waits.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            Duration::ZERO
        } else {
            self.delay
        }
    }

    /// Check if there are remaining attempts
    pub fn has_attempts_remaining(&self, current_attempt: u32) -> bool {
        current_attempt < self.max_attempts
    }

    fn should_notify(&self, sleep: Duration) -> bool {
        !sleep.is_zero() || self.notify_without_delay
    }
}

/// State handed to the pre-retry hook
#[derive(Debug)]
pub struct RetryState<'a> {
    /// Attempt that just failed (1-based)
    pub attempt: u32,

    /// Total attempts allowed by the policy
    pub max_attempts: u32,

    /// Wait before the next attempt
    pub sleep: Duration,

    /// Error raised by the failed attempt
    pub error: &'a anyhow::Error,
}

/// Wrap `op` with bounded fixed-delay retries
///
/// The returned closure calls `op` until it succeeds or the policy runs out of
/// attempts. Before each retry it calls `before_retry`, then sleeps on the
/// current thread. When every attempt fails the last error is returned as-is,
/// so callers can still `downcast_ref` to the original error type.
pub fn retrying<R, F, N>(
    policy: RetryPolicy,
    mut before_retry: N,
    mut op: F,
) -> impl FnMut() -> anyhow::Result<R>
where
    F: FnMut() -> anyhow::Result<R>,
    N: FnMut(&RetryState<'_>),
{
    move || {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(error) if policy.has_attempts_remaining(attempt) => {
                    let sleep = policy.delay_for_attempt(attempt + 1);
                    if policy.should_notify(sleep) {
                        before_retry(&RetryState {
                            attempt,
                            max_attempts: policy.max_attempts,
                            sleep,
                            error: &error,
                        });
                    }
                    if !sleep.is_zero() {
                        std::thread::sleep(sleep);
                    }
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// Serde support for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
