// Runner configuration
//
// Settings are resolved once per runner: explicit overrides win, then the
// external source (process environment, optionally seeded from `.env`), then
// built-in defaults. Blank strings count as "unset" at every layer.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::reliability::RetryPolicy;

/// Literal marker replaced by the payload key inside proxy templates
pub const PROXY_PLACEHOLDER: &str = "*****";

/// Environment keys read by [`Settings::resolve`]
pub mod keys {
    pub const MAX_WORKERS: &str = "MAX_WORKERS";
    pub const SHUFFLE: &str = "SHUFFLE";
    pub const RETRIES: &str = "RETRIES";
    pub const RETRY_DELAY: &str = "RETRY_DELAY";
    pub const PROXY: &str = "PROXY";
    pub const PROXY_IPV6: &str = "PROXY_IPV6";
    pub const USE_IPV6: &str = "USE_IPV6";
    pub const DISABLE_PROXY: &str = "DISABLE_PROXY";
}

const DEFAULT_MAX_WORKERS: usize = 5;
const DEFAULT_RETRIES: u32 = 2;
const DEFAULT_RETRY_DELAY: f64 = 0.0;

/// External configuration source consulted after explicit overrides
pub trait ConfigSource {
    /// Raw value for `key`, if the source has one
    fn get(&self, key: &str) -> Option<String>;
}

/// Process environment as a configuration source
#[derive(Debug, Clone, Default)]
pub struct EnvSource;

impl EnvSource {
    /// Read the process environment as-is
    pub fn new() -> Self {
        Self
    }

    /// Load `.env` from the working directory (if present) into the process
    /// environment, then read the environment
    ///
    /// Variables already set in the environment are not overwritten.
    pub fn with_dotenv() -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env file");
        }
        Self
    }
}

impl ConfigSource for EnvSource {
    /// Exact match first, then any variable whose name matches ignoring case
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok().or_else(|| {
            env::vars_os().find_map(|(name, value)| {
                name.to_str()
                    .filter(|name| name.eq_ignore_ascii_case(key))
                    .and_then(|_| value.into_string().ok())
            })
        })
    }
}

impl ConfigSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key)
            .or_else(|| {
                self.iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(key))
                    .map(|(_, value)| value)
            })
            .cloned()
    }
}

/// Explicit per-runner overrides
///
/// Every field is optional; `None` defers to the external source. An empty
/// proxy string resets that field to its default rather than being used
/// literally.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsOverrides {
    pub max_workers: Option<usize>,
    pub shuffle: Option<bool>,
    pub retries: Option<u32>,
    pub retry_delay: Option<f64>,
    pub proxy: Option<String>,
    pub proxy_ipv6: Option<String>,
    pub use_ipv6: Option<bool>,
    pub disable_proxy: Option<bool>,
}

impl SettingsOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = Some(max_workers);
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = Some(shuffle);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Set the retry delay in seconds
    pub fn with_retry_delay(mut self, seconds: f64) -> Self {
        self.retry_delay = Some(seconds);
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn with_proxy_ipv6(mut self, proxy: impl Into<String>) -> Self {
        self.proxy_ipv6 = Some(proxy.into());
        self
    }

    pub fn with_use_ipv6(mut self, use_ipv6: bool) -> Self {
        self.use_ipv6 = Some(use_ipv6);
        self
    }

    pub fn with_disable_proxy(mut self, disable_proxy: bool) -> Self {
        self.disable_proxy = Some(disable_proxy);
        self
    }
}

/// Resolved runner settings
///
/// Read-only after construction and shared by all workers.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Number of worker threads
    pub max_workers: usize,

    /// Shuffle list sources before assigning indices
    pub shuffle: bool,

    /// Retries after the first attempt
    pub retries: u32,

    /// Fixed delay between attempts, in seconds
    pub retry_delay: f64,

    /// IPv4 proxy template
    pub proxy: Option<String>,

    /// IPv6 proxy template
    pub proxy_ipv6: Option<String>,

    /// Prefer the IPv6 template when it is configured
    pub use_ipv6: bool,

    /// Never assign proxies
    pub disable_proxy: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            shuffle: false,
            retries: DEFAULT_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            proxy: None,
            proxy_ipv6: None,
            use_ipv6: false,
            disable_proxy: false,
        }
    }
}

impl Settings {
    /// Resolve settings from `.env`, the process environment and defaults
    pub fn from_env() -> Result<Self> {
        Self::resolve(&SettingsOverrides::default(), &EnvSource::with_dotenv())
    }

    /// Resolve settings: overrides > source > defaults
    ///
    /// Fails on values that cannot be parsed or violate a bound (see
    /// [`validate`](Self::validate)).
    pub fn resolve(overrides: &SettingsOverrides, source: &dyn ConfigSource) -> Result<Self> {
        let defaults = Settings::default();

        let max_workers = match overrides.max_workers {
            Some(v) => v,
            None => parse_from(source, keys::MAX_WORKERS, |s| s.parse::<usize>().ok())?
                .unwrap_or(defaults.max_workers),
        };
        let shuffle = match overrides.shuffle {
            Some(v) => v,
            None => parse_from(source, keys::SHUFFLE, to_bool)?.unwrap_or(defaults.shuffle),
        };

        let retries = match overrides.retries {
            Some(v) => v,
            None => parse_from(source, keys::RETRIES, |s| s.parse::<u32>().ok())?
                .unwrap_or(defaults.retries),
        };

        let retry_delay = match overrides.retry_delay {
            Some(v) => v,
            None => parse_from(source, keys::RETRY_DELAY, |s| s.parse::<f64>().ok())?
                .unwrap_or(defaults.retry_delay),
        };
        let proxy = resolve_string(overrides.proxy.as_deref(), source, keys::PROXY);
        let proxy_ipv6 = resolve_string(overrides.proxy_ipv6.as_deref(), source, keys::PROXY_IPV6);

        let use_ipv6 = match overrides.use_ipv6 {
            Some(v) => v,
            None => parse_from(source, keys::USE_IPV6, to_bool)?.unwrap_or(defaults.use_ipv6),
        };

        let disable_proxy = match overrides.disable_proxy {
            Some(v) => v,
            None => {
                parse_from(source, keys::DISABLE_PROXY, to_bool)?.unwrap_or(defaults.disable_proxy)
            }
        };

        let settings = Self {
            max_workers,
            shuffle,
            retries,
            retry_delay,
            proxy,
            proxy_ipv6,
            use_ipv6,
            disable_proxy,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Check the bounds `resolve` enforces
    ///
    /// `max_workers` must be positive and `retry_delay` must convert to a
    /// [`Duration`] (finite, non-negative, within range).
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(Error::config("max_workers must be greater than 0"));
        }
        if Duration::try_from_secs_f64(self.retry_delay).is_err() {
            return Err(Error::config(format!(
                "retry_delay must be a non-negative number of seconds within range, got {}",
                self.retry_delay
            )));
        }
        Ok(())
    }

    /// Retry delay as a duration
    ///
    /// Unvalidated values saturate: negative or NaN delays become zero and
    /// oversized ones become [`Duration::MAX`].
    pub fn retry_delay_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.retry_delay.max(0.0)).unwrap_or(Duration::MAX)
    }

    /// Runner-level retry policy (`retries + 1` attempts, fixed delay)
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.retry_delay_duration(), self.retries.saturating_add(1))
    }

    /// Proxy template in effect, if any
    ///
    /// The IPv6 template wins when `use_ipv6` is set and it is configured.
    pub fn proxy_template(&self) -> Option<&str> {
        if self.disable_proxy {
            return None;
        }
        match (&self.proxy_ipv6, &self.proxy) {
            (Some(v6), _) if self.use_ipv6 => Some(v6.as_str()),
            (_, Some(v4)) => Some(v4.as_str()),
            _ => None,
        }
    }

    /// Proxy for one unit: the template with every placeholder replaced by `key`
    pub fn proxy_for(&self, key: &str) -> Option<String> {
        self.proxy_template()
            .map(|template| template.replace(PROXY_PLACEHOLDER, key))
    }

    /// Human-readable label/value pairs for the startup log
    pub fn describe(&self) -> Vec<(&'static str, String)> {
        fn yes_no(v: bool) -> String {
            (if v { "yes" } else { "no" }).to_string()
        }
        fn or_unset(v: &Option<String>) -> String {
            v.clone().unwrap_or_else(|| "not set".to_string())
        }

        vec![
            ("Max workers", self.max_workers.to_string()),
            ("Shuffle tasks", yes_no(self.shuffle)),
            ("Retries", self.retries.to_string()),
            ("Retry delay (s)", self.retry_delay.to_string()),
            ("Proxy", or_unset(&self.proxy)),
            ("IPv6 proxy", or_unset(&self.proxy_ipv6)),
            ("Use IPv6 proxy", yes_no(self.use_ipv6)),
            ("Disable proxy", yes_no(self.disable_proxy)),
        ]
    }
}

/// Parse a permissive boolean (`1/true/t/yes/y/on`, `0/false/f/no/n/off`)
pub fn to_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Trimmed value, or `None` for blank strings
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_from<T>(
    source: &dyn ConfigSource,
    key: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Option<T>> {
    match non_blank(source.get(key)) {
        None => Ok(None),
        Some(raw) => parse(&raw)
            .map(Some)
            .ok_or_else(|| Error::config(format!("invalid value for {key}: '{raw}'"))),
    }
}

fn resolve_string(
    explicit: Option<&str>,
    source: &dyn ConfigSource,
    key: &str,
) -> Option<String> {
    match explicit {
        // A blank override resets to the default (unset), skipping the source
        Some(v) => non_blank(Some(v.to_string())),
        None => non_blank(source.get(key)),
    }
}
