//! Client configuration and validation.
//!
//! [`ClientConfig`] is the plain-data form of the settings a
//! [`ClientBuilder`](crate::ClientBuilder) applies. It deserializes with
//! `serde`, expressing durations in milliseconds, so it can be loaded from
//! any serde format:
//!
//! ```
//! use perconn::ClientConfig;
//!
//! let config: ClientConfig = serde_json::from_str(
//!     r#"{ "address": "127.0.0.1:7000", "retry_min_ms": 100, "retry_max_ms": 5000 }"#,
//! )
//! .unwrap();
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Default minimum time to wait before redialing after a failure.
pub const DEFAULT_RETRY_MIN: Duration = Duration::from_secs(1);

/// Default maximum time to wait between dial attempts.
pub const DEFAULT_RETRY_MAX: Duration = Duration::from_secs(60);

/// Default bound on a single dial attempt.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of work items that may wait for the connection.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Default number of clients held by a [`ClientPool`](crate::pool::ClientPool).
pub const DEFAULT_POOL_SIZE: usize = 5;

/// Settings for one persistent connection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Remote address (`host:port`).
    pub address: String,
    /// Backoff after the first failed dial, and after a live connection drops.
    #[serde(rename = "retry_min_ms", with = "millis")]
    pub retry_min: Duration,
    /// Upper bound of the doubling backoff.
    #[serde(rename = "retry_max_ms", with = "millis")]
    pub retry_max: Duration,
    /// Bound on a single dial attempt.
    #[serde(rename = "dial_timeout_ms", with = "millis")]
    pub dial_timeout: Duration,
    /// Number of work items that may be queued before callers wait.
    pub queue_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            retry_min: DEFAULT_RETRY_MIN,
            retry_max: DEFAULT_RETRY_MAX,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl ClientConfig {
    /// Create a configuration for `address` with default tuning.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    /// Check the invariants required before a manager may be started.
    ///
    /// Checks run in a fixed order, so the first violation is reported.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry_min.is_zero() {
            return Err(ConfigError::ZeroRetryMin);
        }
        if self.retry_max.is_zero() {
            return Err(ConfigError::ZeroRetryMax);
        }
        if self.retry_max < self.retry_min {
            return Err(ConfigError::RetryMaxBelowMin {
                min: self.retry_min,
                max: self.retry_max,
            });
        }
        if self.address.is_empty() {
            return Err(ConfigError::EmptyAddress);
        }
        if self.dial_timeout.is_zero() {
            return Err(ConfigError::ZeroDialTimeout);
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        Ok(())
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
