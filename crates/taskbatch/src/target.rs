//! Work unit handed to task functions and callbacks

use std::fmt;

use crate::telemetry::TaskLogger;

/// One unit of submitted work
///
/// Built once by the submitter and never mutated; shared between the task
/// function, the retry loop and the completion callbacks.
pub struct Target<D> {
    index: usize,
    data: D,
    proxy: Option<String>,
    logger: TaskLogger,
}

impl<D> Target<D> {
    /// Create a target with a logger labelled from its index
    pub fn new(index: usize, data: D) -> Self {
        Self {
            index,
            data,
            proxy: None,
            logger: TaskLogger::for_index(index),
        }
    }

    /// Set the assigned proxy
    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    /// Replace the logger
    pub fn with_logger(mut self, logger: TaskLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Zero-based position within the batch
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn data(&self) -> &D {
        &self.data
    }

    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    pub fn logger(&self) -> &TaskLogger {
        &self.logger
    }
}

impl<D: fmt::Debug> fmt::Debug for Target<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("index", &self.index)
            .field("data", &self.data)
            .field("proxy", &self.proxy)
            .finish_non_exhaustive()
    }
}

/// Text substituted for the proxy placeholder
///
/// Implement this for custom payload types that should drive proxy
/// assignment.
pub trait ProxyKey {
    fn proxy_key(&self) -> String;
}

macro_rules! display_proxy_key {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ProxyKey for $ty {
                fn proxy_key(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

display_proxy_key!(usize, u8, u16, u32, u64, i8, i16, i32, i64, String, &str);

/// Fields of a split file line join with `_`
impl ProxyKey for Vec<String> {
    fn proxy_key(&self) -> String {
        self.join("_")
    }
}

/// Strings are used unquoted; other values use their JSON text
impl ProxyKey for serde_json::Value {
    fn proxy_key(&self) -> String {
        match self {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_target_creation() {
        let target = Target::new(4, "payload".to_string());

        assert_eq!(target.index(), 4);
        assert_eq!(target.data(), "payload");
        assert_eq!(target.proxy(), None);
        assert_eq!(target.logger().label(), "00005");
    }

    #[test]
    fn test_target_with_proxy_and_logger() {
        let target = Target::new(0, 1u32)
            .with_proxy(Some("http://p".to_string()))
            .with_logger(TaskLogger::new("custom"));

        assert_eq!(target.proxy(), Some("http://p"));
        assert_eq!(target.logger().label(), "custom");
    }

    #[test]
    fn test_debug_omits_logger() {
        let target = Target::new(1, 7usize);
        let debug = format!("{target:?}");
        assert!(debug.contains("index: 1"));
        assert!(debug.contains("data: 7"));
        assert!(!debug.contains("logger"));
    }

    #[test]
    fn test_proxy_keys() {
        assert_eq!(42usize.proxy_key(), "42");
        assert_eq!("abc".proxy_key(), "abc");
        assert_eq!(
            vec!["user".to_string(), "pass".to_string()].proxy_key(),
            "user_pass"
        );
        assert_eq!(json!("session").proxy_key(), "session");
        assert_eq!(json!(3).proxy_key(), "3");
    }
}
