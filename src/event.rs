//! Connection state and manager events.
//!
//! The manager never gives up dialing, so failures are not returned to
//! anyone. They are reported to an [`EventSink`] instead. The default,
//! [`TracingSink`], writes them to `tracing`.
//!
//! # Example
//!
//! ```
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! use perconn::{Client, ManagerEvent};
//!
//! let dial_failures = Arc::new(AtomicUsize::new(0));
//! let counter = dial_failures.clone();
//!
//! let _builder = Client::builder()
//!     .address("127.0.0.1:7000")
//!     .event_sink(move |event: &ManagerEvent| {
//!         if let ManagerEvent::DialFailed { .. } = event {
//!             counter.fetch_add(1, Ordering::Relaxed);
//!         }
//!     });
//! ```

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// Where the connection manager is in its dial/proxy cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection, and no dial in progress.
    Disconnected,
    /// Dialing, or backing off between failed dials.
    Connecting,
    /// Connected and servicing queued requests.
    Proxying,
    /// The manager has shut down. Terminal.
    Stopped,
}

impl ConnectionState {
    /// Returns true if a live connection is being used.
    #[inline]
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Proxying
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Proxying => "proxying",
            ConnectionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Something the connection manager did or suffered.
#[derive(Debug, Clone)]
pub enum ManagerEvent {
    /// A dial attempt is starting. `attempt` counts from 1 since the last
    /// successful session.
    Connecting { address: Arc<str>, attempt: u32 },
    /// A dial succeeded.
    Connected { address: Arc<str> },
    /// A dial failed; the manager sleeps `retry_in` before the next one.
    DialFailed {
        address: Arc<str>,
        error: Arc<io::Error>,
        retry_in: Duration,
    },
    /// I/O on a live connection failed; the connection was closed and the
    /// manager redials after `retry_in`.
    ConnectionLost {
        address: Arc<str>,
        error: Arc<io::Error>,
        retry_in: Duration,
    },
    /// The manager shut down.
    Stopped { address: Arc<str> },
}

impl ManagerEvent {
    /// Address of the client that produced this event.
    pub fn address(&self) -> &str {
        let address: &Arc<str> = match self {
            ManagerEvent::Connecting { address, .. }
            | ManagerEvent::Connected { address }
            | ManagerEvent::DialFailed { address, .. }
            | ManagerEvent::ConnectionLost { address, .. }
            | ManagerEvent::Stopped { address } => address,
        };
        address
    }

    /// Returns true for dial and connection failures.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ManagerEvent::DialFailed { .. } | ManagerEvent::ConnectionLost { .. }
        )
    }
}

/// Receives manager events. Called inline on the manager task, so
/// implementations must not block.
pub trait EventSink: Send + Sync + 'static {
    fn on_event(&self, event: &ManagerEvent);
}

impl<F> EventSink for F
where
    F: Fn(&ManagerEvent) + Send + Sync + 'static,
{
    fn on_event(&self, event: &ManagerEvent) {
        self(event)
    }
}

/// Default sink: failures are warnings, the rest is informational.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn on_event(&self, event: &ManagerEvent) {
        match event {
            ManagerEvent::Connecting { address, attempt } => {
                tracing::debug!(address = %address, attempt, "dialing");
            }
            ManagerEvent::Connected { address } => {
                tracing::info!(address = %address, "connected");
            }
            ManagerEvent::DialFailed {
                address,
                error,
                retry_in,
            } => {
                tracing::warn!(address = %address, retry_in = ?retry_in, "cannot connect: {}", error);
            }
            ManagerEvent::ConnectionLost {
                address,
                error,
                retry_in,
            } => {
                tracing::warn!(address = %address, retry_in = ?retry_in, "cannot proxy requests: {}", error);
            }
            ManagerEvent::Stopped { address } => {
                tracing::debug!(address = %address, "connection manager stopped");
            }
        }
    }
}
