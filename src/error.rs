//! Error types for perconn.

use std::time::Duration;

use thiserror::Error;

/// Main error type for all perconn operations.
#[derive(Debug, Error)]
pub enum PerconnError {
    /// Configuration rejected at construction time.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// I/O error while the request was serviced on the live connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection failed after accepting the first `written` bytes of
    /// a write.
    #[error("I/O error after writing {written} bytes: {source}")]
    PartialWrite {
        written: usize,
        #[source]
        source: std::io::Error,
    },

    /// The connection manager has stopped; the request was not serviced.
    #[error("client shut down")]
    Shutdown,

    /// The per-call deadline elapsed before the request completed.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Construction was attempted outside a tokio runtime.
    #[error("no tokio runtime available to spawn the connection manager")]
    NoRuntime,

    /// The pool has been closed.
    #[error("pool closed")]
    PoolClosed,

    /// Every pooled resource is currently checked out.
    #[error("pool exhausted")]
    PoolExhausted,
}

/// Validation failures for client and pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("cannot create client with empty address")]
    EmptyAddress,

    #[error("cannot create client with zero retry minimum")]
    ZeroRetryMin,

    #[error("cannot create client with zero retry maximum")]
    ZeroRetryMax,

    #[error("retry maximum ({max:?}) is less than retry minimum ({min:?})")]
    RetryMaxBelowMin { min: Duration, max: Duration },

    #[error("cannot create client with zero dial timeout")]
    ZeroDialTimeout,

    #[error("queue capacity must be greater than 0")]
    ZeroQueueCapacity,

    #[error("pool size must be greater than 0")]
    ZeroPoolSize,
}

/// Result type alias using PerconnError.
pub type Result<T> = std::result::Result<T, PerconnError>;

impl PerconnError {
    /// Returns the underlying I/O error kind, if this is an I/O failure.
    pub fn io_kind(&self) -> Option<std::io::ErrorKind> {
        match self {
            PerconnError::Io(e) | PerconnError::PartialWrite { source: e, .. } => Some(e.kind()),
            _ => None,
        }
    }
}
