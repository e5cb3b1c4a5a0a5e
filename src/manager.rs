//! Connection manager: the one task that owns the physical connection.
//!
//! Replaces a lock around a shared socket with a dedicated task fed by a
//! bounded queue. Callers never touch the connection; they enqueue a
//! [`WorkItem`] and wait on its reply slot.
//!
//! # Architecture
//!
//! ```text
//! Caller 1 ─┐
//! Caller 2 ─┼─► mpsc::Sender<WorkItem> ─► Manager ─► Connection
//! Caller N ─┘          (bounded)            │
//!    ▲                                      │
//!    └──────────── oneshot reply ◄──────────┘
//! ```
//!
//! # States
//!
//! ```text
//!                dial ok
//!  Connecting ───────────► Proxying
//!   ▲   │  ▲                  │
//!   │   └──┘ dial failed:     │ I/O failed: reply with the error,
//!   │        sleep, double    │ close, reset backoff
//!   │                         ▼
//!   └──── sleep(min) ──── Disconnected
//! ```
//!
//! Items still queued when a connection fails stay queued and are
//! serviced on the next connection. Cancellation of the token moves the
//! manager to `Stopped` from any state.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::backoff::Backoff;
use crate::event::{ConnectionState, EventSink, ManagerEvent};
use crate::transport::Dialer;
use crate::work::{Failed, Reply, Transfer, WorkItem};

/// Why a proxying session ended.
enum SessionEnd {
    /// The connection failed; redial after this delay.
    Lost(Duration),
    Shutdown,
}

/// Dial and backoff tuning for one manager, taken from a validated
/// [`ClientConfig`](crate::ClientConfig).
#[derive(Debug, Clone)]
pub(crate) struct ManagerConfig {
    pub address: Arc<str>,
    pub retry_min: Duration,
    pub retry_max: Duration,
    pub dial_timeout: Duration,
}

pub(crate) struct Manager<D: Dialer> {
    address: Arc<str>,
    dial_timeout: Duration,
    backoff: Backoff,
    dialer: D,
    jobs: mpsc::Receiver<WorkItem>,
    state: watch::Sender<ConnectionState>,
    sink: Arc<dyn EventSink>,
    cancel: CancellationToken,
}

impl<D: Dialer> Manager<D> {
    pub(crate) fn new(
        config: ManagerConfig,
        dialer: D,
        jobs: mpsc::Receiver<WorkItem>,
        state: watch::Sender<ConnectionState>,
        sink: Arc<dyn EventSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            address: config.address,
            dial_timeout: config.dial_timeout,
            backoff: Backoff::new(config.retry_min, config.retry_max),
            dialer,
            jobs,
            state,
            sink,
            cancel,
        }
    }

    /// Dial, proxy, and redial until cancelled or every client handle is gone.
    pub(crate) async fn run(mut self) {
        loop {
            let Some(conn) = self.connect().await else {
                break;
            };
            match self.proxy(conn).await {
                SessionEnd::Shutdown => break,
                SessionEnd::Lost(retry_in) => {
                    self.set_state(ConnectionState::Disconnected);
                    if !self.pause(retry_in).await {
                        break;
                    }
                }
            }
        }

        self.set_state(ConnectionState::Stopped);
        self.emit(ManagerEvent::Stopped {
            address: self.address.clone(),
        });
        // Dropping the receiver fails every queued item with `Shutdown`.
        self.jobs.close();
    }

    /// Dial until a connection is established. `None` on shutdown.
    async fn connect(&mut self) -> Option<D::Conn> {
        loop {
            self.set_state(ConnectionState::Connecting);
            self.emit(ManagerEvent::Connecting {
                address: self.address.clone(),
                attempt: self.backoff.failures() + 1,
            });

            let dialed = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                dialed = tokio::time::timeout(self.dial_timeout, self.dialer.dial(&self.address)) => dialed,
            };

            let error = match dialed {
                Ok(Ok(conn)) => {
                    self.emit(ManagerEvent::Connected {
                        address: self.address.clone(),
                    });
                    return Some(conn);
                }
                Ok(Err(e)) => e,
                Err(_) => io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("dial timed out after {:?}", self.dial_timeout),
                ),
            };

            let retry_in = self.backoff.next_delay();
            self.emit(ManagerEvent::DialFailed {
                address: self.address.clone(),
                error: Arc::new(error),
                retry_in,
            });
            if !self.pause(retry_in).await {
                return None;
            }
        }
    }

    /// Service queued items in order against `conn` until it fails.
    async fn proxy(&mut self, mut conn: D::Conn) -> SessionEnd {
        self.set_state(ConnectionState::Proxying);

        loop {
            let item = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return SessionEnd::Shutdown,
                item = self.jobs.recv() => match item {
                    Some(item) => item,
                    None => return SessionEnd::Shutdown,
                },
            };

            if item.is_abandoned() {
                tracing::debug!(address = %self.address, "skipping request abandoned by its caller");
                continue;
            }

            let WorkItem { op, reply } = item;
            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return SessionEnd::Shutdown,
                outcome = op.perform(&mut conn) => outcome,
            };

            match outcome {
                Ok(transfer) => self.deliver(reply, transfer),
                Err(failed) => {
                    let retry_in = self.backoff.reset();
                    self.emit(ManagerEvent::ConnectionLost {
                        address: self.address.clone(),
                        error: Arc::new(copy_error(&failed)),
                        retry_in,
                    });
                    // The failing caller gets the error itself; the event carries a copy.
                    let _ = reply.send(Err(failed));
                    drop(conn);
                    return SessionEnd::Lost(retry_in);
                }
            }
        }
    }

    fn deliver(&self, reply: Reply, transfer: Transfer) {
        if reply.send(Ok(transfer)).is_err() {
            tracing::debug!(address = %self.address, "caller went away before its request completed");
        }
    }

    /// Sleep unless cancelled first. Returns false on cancellation.
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn emit(&self, event: ManagerEvent) {
        self.sink.on_event(&event);
    }
}

fn copy_error(failed: &Failed) -> io::Error {
    io::Error::new(failed.error.kind(), failed.error.to_string())
}
