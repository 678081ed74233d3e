//! Configuration structures consumed by the forwarding adapter.
//!
//! [`ForwarderBuilder`](crate::builder::ForwarderBuilder) and
//! [`ForwarderConfig::from_env`] construct these values before handing them
//! to [`FluentdAdapter`](super::FluentdAdapter) for runtime use. Nothing here
//! is process-global: every adapter owns its own copy.

use std::time::Duration;

use log::warn;
use thiserror::Error;

use crate::rate_limited_warner::DEFAULT_WARN_INTERVAL;

use super::{envelope::PayloadFormat, retry::RetryPolicy};

/// Default number of retries for both same-connection writes and reconnects.
pub const DEFAULT_RETRY_COUNT: u32 = 10;
/// Default base delay of the exponential backoff schedule.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(10);
/// Default upper bound on a single backoff sleep.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(600);
/// Default bounded channel capacity used by spawned adapters.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;
/// Default connection timeout applied when establishing sockets.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default write timeout applied to socket writes.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);
/// Default maximum encoded payload size (in bytes).
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 1 << 20; // 1 MiB

/// Environment variable overriding the retry count.
pub const RETRY_COUNT_ENV: &str = "RETRY_COUNT";
/// Environment variable enabling debug diagnostics when present.
pub const DEBUG_ENV: &str = "DEBUG";

/// Errors raised while reading configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// `RETRY_COUNT` was present but not a non-negative integer.
    #[error("invalid {RETRY_COUNT_ENV} value {0:?}")]
    InvalidRetryCount(String),
}

/// Runtime configuration of one forwarding adapter.
#[derive(Clone, Debug)]
pub struct ForwarderConfig {
    pub retry: RetryPolicy,
    pub format: PayloadFormat,
    pub max_payload_size: usize,
    pub capacity: usize,
    pub warn_interval: Duration,
    pub debug: bool,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            format: PayloadFormat::default(),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            capacity: DEFAULT_CHANNEL_CAPACITY,
            warn_interval: DEFAULT_WARN_INTERVAL,
            debug: false,
        }
    }
}

impl ForwarderConfig {
    /// Read `RETRY_COUNT` and `DEBUG` from the process environment.
    ///
    /// An unparsable retry count falls back to [`DEFAULT_RETRY_COUNT`] with a
    /// warning rather than failing adapter construction.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reading through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        config.debug = lookup(DEBUG_ENV).is_some_and(|value| !value.is_empty());
        match parse_retry_count(lookup(RETRY_COUNT_ENV).as_deref()) {
            Ok(count) => config.retry.max_retries = count,
            Err(err) => warn!("FluentdAdapter: {err}; using {DEFAULT_RETRY_COUNT}"),
        }
        config
    }

    /// Override the retry count used for write retries and reconnects.
    pub fn with_retry_count(mut self, count: u32) -> Self {
        self.retry.max_retries = count;
        self
    }

    /// Override the retry policy wholesale.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn with_format(mut self, format: PayloadFormat) -> Self {
        self.format = format;
        self
    }
}

/// Parse a raw `RETRY_COUNT` value. A missing or empty value yields the
/// default.
pub fn parse_retry_count(raw: Option<&str>) -> Result<u32, ConfigError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(DEFAULT_RETRY_COUNT),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidRetryCount(value.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(None, Ok(10))]
    #[case(Some(""), Ok(10))]
    #[case(Some("3"), Ok(3))]
    #[case(Some(" 0 "), Ok(0))]
    #[case(Some("-1"), Err(ConfigError::InvalidRetryCount("-1".into())))]
    #[case(Some("many"), Err(ConfigError::InvalidRetryCount("many".into())))]
    fn parses_retry_count(#[case] raw: Option<&str>, #[case] expected: Result<u32, ConfigError>) {
        assert_eq!(parse_retry_count(raw), expected);
    }

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[rstest]
    fn lookup_applies_retry_count_and_debug() {
        let config = ForwarderConfig::from_lookup(lookup_from(&[("RETRY_COUNT", "4"), ("DEBUG", "1")]));
        assert_eq!(config.retry.max_retries, 4);
        assert!(config.debug);
    }

    #[rstest]
    fn invalid_retry_count_falls_back_to_default() {
        let config = ForwarderConfig::from_lookup(lookup_from(&[("RETRY_COUNT", "lots")]));
        assert_eq!(config.retry.max_retries, DEFAULT_RETRY_COUNT);
        assert!(!config.debug);
    }
}
