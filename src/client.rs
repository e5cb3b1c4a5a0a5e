//! Client builder and request façade.
//!
//! The [`ClientBuilder`] provides a fluent API for configuring the
//! connection. [`ClientBuilder::build`] validates the configuration and
//! starts the connection manager, which immediately begins dialing. The
//! [`Client`] is the handle callers share:
//! 1. `write` / `read` enqueue a request
//! 2. The manager services requests in enqueue order on its connection
//! 3. The call returns once its own request has been serviced
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use perconn::Client;
//!
//! #[tokio::main]
//! async fn main() -> perconn::Result<()> {
//!     let client = Client::builder()
//!         .address("127.0.0.1:7000")
//!         .retry_min(Duration::from_millis(100))
//!         .retry_max(Duration::from_secs(1))
//!         .build()?;
//!
//!     client.write(b"hello").await?;
//!     let mut buf = [0u8; 5];
//!     let n = client.read(&mut buf).await?;
//!     println!("{:?}", &buf[..n]);
//!
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::{PerconnError, Result};
use crate::event::{ConnectionState, EventSink, TracingSink};
use crate::manager::{Manager, ManagerConfig};
use crate::transport::{Dialer, TcpDialer};
use crate::work::{Failed, Pending, Transfer, WorkItem};

/// Builder for configuring and starting a [`Client`].
///
/// Settings are applied in call order; later calls override earlier ones.
/// Nothing is validated until [`build`](Self::build).
pub struct ClientBuilder {
    config: ClientConfig,
    sink: Option<Arc<dyn EventSink>>,
}

impl ClientBuilder {
    /// Create a builder with default tuning and no address.
    pub fn new() -> Self {
        Self::from_config(ClientConfig::default())
    }

    /// Start from an existing configuration, e.g. one loaded from a file.
    pub fn from_config(config: ClientConfig) -> Self {
        Self { config, sink: None }
    }

    /// Set the remote address (`host:port`, or a socket path for
    /// [`UnixDialer`](crate::transport::UnixDialer)).
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.config.address = address.into();
        self
    }

    /// Set the backoff after the first failed dial and after a dropped
    /// connection.
    ///
    /// Default: 1 second
    pub fn retry_min(mut self, duration: Duration) -> Self {
        self.config.retry_min = duration;
        self
    }

    /// Set the upper bound of the doubling backoff.
    ///
    /// Default: 60 seconds
    pub fn retry_max(mut self, duration: Duration) -> Self {
        self.config.retry_max = duration;
        self
    }

    /// Set how long a single dial attempt may take.
    ///
    /// Default: 5 seconds
    pub fn dial_timeout(mut self, duration: Duration) -> Self {
        self.config.dial_timeout = duration;
        self
    }

    /// Set how many requests may wait for the connection before callers
    /// themselves wait.
    ///
    /// Default: 10
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Report dial and connection failures to `sink` instead of `tracing`.
    pub fn event_sink(mut self, sink: impl EventSink) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Share an already boxed sink, e.g. across the clients of a pool.
    pub(crate) fn shared_event_sink(mut self, sink: Option<Arc<dyn EventSink>>) -> Self {
        self.sink = sink;
        self
    }

    /// Validate and start a client that dials TCP.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Result<Client> {
        self.build_with_dialer(TcpDialer::new())
    }

    /// Validate and start a client that opens connections with `dialer`.
    ///
    /// On error no background task has been started.
    pub fn build_with_dialer<D: Dialer>(self, dialer: D) -> Result<Client> {
        self.config.validate()?;
        let runtime = Handle::try_current().map_err(|_| PerconnError::NoRuntime)?;

        let ClientConfig {
            address,
            retry_min,
            retry_max,
            dial_timeout,
            queue_capacity,
        } = self.config;
        let address: Arc<str> = Arc::from(address);

        let (jobs_tx, jobs_rx) = mpsc::channel(queue_capacity);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let cancel = CancellationToken::new();
        let sink = self.sink.unwrap_or_else(|| Arc::new(TracingSink));

        let manager = Manager::new(
            ManagerConfig {
                address: address.clone(),
                retry_min,
                retry_max,
                dial_timeout,
            },
            dialer,
            jobs_rx,
            state_tx,
            sink,
            cancel.clone(),
        );
        let task = runtime.spawn(manager.run());

        Ok(Client {
            jobs: jobs_tx,
            shared: Arc::new(Shared {
                address,
                state: state_rx,
                cancel,
                task: Mutex::new(Some(task)),
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// State common to every clone of a client.
struct Shared {
    address: Arc<str>,
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        // Last handle gone: nobody can submit work, so stop dialing.
        self.cancel.cancel();
    }
}

/// A persistent connection to one remote address.
///
/// Cheaply cloneable; every clone shares one queue and one connection
/// manager. Dropping the last clone stops the manager.
///
/// # Thread Safety
///
/// All methods take `&self` and may be called concurrently from any
/// number of tasks. Requests are serviced strictly in the order they were
/// enqueued, each as one atomic read or write on the connection.
#[derive(Clone)]
pub struct Client {
    jobs: mpsc::Sender<WorkItem>,
    shared: Arc<Shared>,
}

impl Client {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Remote address this client dials.
    pub fn address(&self) -> &str {
        &self.shared.address
    }

    /// Write all of `data` on the connection.
    ///
    /// Waits while the queue is full, then until the write has been
    /// performed. Returns the number of bytes written, or the I/O error the
    /// connection produced for this write. If the connection failed after
    /// accepting part of `data`, the error is
    /// [`PerconnError::PartialWrite`] with the count that went out.
    pub async fn write(&self, data: &[u8]) -> Result<usize> {
        self.write_bytes(Bytes::copy_from_slice(data)).await
    }

    /// Write an owned buffer without copying it.
    pub async fn write_bytes(&self, data: Bytes) -> Result<usize> {
        let (item, pending) = WorkItem::write(data);
        let transfer = self.submit(item, pending).await?;
        Ok(transfer.n)
    }

    /// Read up to `buf.len()` bytes from the connection.
    ///
    /// The manager reads into a private buffer; `buf` is only written once
    /// the read has completed, and not at all if it fails.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let (item, pending) = WorkItem::read(buf.len());
        let transfer = self.submit(item, pending).await?;
        buf[..transfer.n].copy_from_slice(&transfer.data);
        Ok(transfer.n)
    }

    /// [`write`](Self::write) bounded by `timeout`.
    ///
    /// If the deadline passes while the request is still queued it is
    /// dropped unwritten. If it passes mid-write the write may still
    /// complete on the connection.
    pub async fn write_timeout(&self, data: &[u8], timeout: Duration) -> Result<usize> {
        tokio::time::timeout(timeout, self.write(data))
            .await
            .map_err(|_| PerconnError::Timeout(timeout))?
    }

    /// [`read`](Self::read) bounded by `timeout`. On timeout `buf` is left
    /// untouched.
    pub async fn read_timeout(&self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        tokio::time::timeout(timeout, self.read(buf))
            .await
            .map_err(|_| PerconnError::Timeout(timeout))?
    }

    async fn submit(&self, item: WorkItem, pending: Pending) -> Result<Transfer> {
        if self.shared.cancel.is_cancelled() {
            return Err(PerconnError::Shutdown);
        }
        self.jobs
            .send(item)
            .await
            .map_err(|_| PerconnError::Shutdown)?;

        match pending.await {
            Ok(Ok(transfer)) => Ok(transfer),
            Ok(Err(Failed { n: 0, error })) => Err(PerconnError::Io(error)),
            Ok(Err(Failed { n, error })) => Err(PerconnError::PartialWrite {
                written: n,
                source: error,
            }),
            Err(_) => Err(PerconnError::Shutdown),
        }
    }

    /// Current state of the connection manager.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Subscribe to connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.clone()
    }

    /// Number of requests queued and not yet picked up by the manager.
    #[inline]
    pub fn pending(&self) -> usize {
        self.jobs.max_capacity() - self.jobs.capacity()
    }

    /// Maximum number of requests that may be queued.
    #[inline]
    pub fn queue_capacity(&self) -> usize {
        self.jobs.max_capacity()
    }

    /// Check if the queue is full, i.e. new requests will wait to enqueue.
    #[inline]
    pub fn is_backpressure_active(&self) -> bool {
        self.jobs.capacity() == 0
    }

    /// Returns true once [`close`](Self::close) or
    /// [`shutdown`](Self::shutdown) has been called.
    pub fn is_closed(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Stop the connection manager without waiting for it.
    ///
    /// Queued and future requests fail with [`PerconnError::Shutdown`].
    pub fn close(&self) {
        self.shared.cancel.cancel();
    }

    /// Stop the connection manager and wait until it has exited and closed
    /// its connection.
    ///
    /// Safe to call from several clones at once; every caller waits.
    pub async fn shutdown(&self) {
        self.close();
        let task = self
            .shared
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!(address = %self.shared.address, "connection manager panicked: {}", e);
            }
        }
        // Another clone may own the task handle. The manager publishes
        // `Stopped` only after dropping its connection.
        let mut states = self.watch_state();
        let _ = states.wait_for(|s| *s == ConnectionState::Stopped).await;
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("address", &self.shared.address)
            .field("state", &self.state())
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use crate::transport::mock::{ScriptedDialer, PIPE_CAPACITY};

    async fn wait_for_state(client: &Client, wanted: ConnectionState) {
        let mut states = client.watch_state();
        states.wait_for(|s| *s == wanted).await.unwrap();
    }

    fn config_error(result: Result<Client>) -> ConfigError {
        match result {
            Err(PerconnError::Config(e)) => e,
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_builder_configuration() {
        let builder = Client::builder()
            .address("10.1.1.1:2000")
            .retry_min(Duration::from_millis(100))
            .retry_max(Duration::from_secs(2))
            .dial_timeout(Duration::from_millis(300))
            .queue_capacity(32);

        assert_eq!(builder.config.address, "10.1.1.1:2000");
        assert_eq!(builder.config.retry_min, Duration::from_millis(100));
        assert_eq!(builder.config.retry_max, Duration::from_secs(2));
        assert_eq!(builder.config.dial_timeout, Duration::from_millis(300));
        assert_eq!(builder.config.queue_capacity, 32);
    }

    #[test]
    fn test_builder_later_setting_wins() {
        let builder = Client::builder().address("a:1").address("b:2");
        assert_eq!(builder.config.address, "b:2");
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_config() {
        let (dialer, _) = ScriptedDialer::new(0);
        assert_eq!(
            config_error(Client::builder().build_with_dialer(dialer)),
            ConfigError::EmptyAddress
        );

        assert_eq!(
            config_error(
                Client::builder()
                    .address("a:1")
                    .retry_min(Duration::ZERO)
                    .build()
            ),
            ConfigError::ZeroRetryMin
        );

        assert_eq!(
            config_error(
                Client::builder()
                    .address("a:1")
                    .retry_max(Duration::ZERO)
                    .build()
            ),
            ConfigError::ZeroRetryMax
        );

        assert!(matches!(
            config_error(
                Client::builder()
                    .address("a:1")
                    .retry_min(Duration::from_secs(2))
                    .retry_max(Duration::from_secs(1))
                    .build()
            ),
            ConfigError::RetryMaxBelowMin { .. }
        ));
    }

    #[tokio::test]
    async fn test_invalid_config_never_dials() {
        let (dialer, log) = ScriptedDialer::new(0);
        let result = Client::builder()
            .address("")
            .build_with_dialer(dialer);
        assert!(result.is_err());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(log.attempts().is_empty());
    }

    #[test]
    fn test_build_outside_runtime() {
        let result = Client::builder().address("127.0.0.1:1").build();
        assert!(matches!(result, Err(PerconnError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_build_starts_dialing_immediately() {
        let (dialer, mut log) = ScriptedDialer::new(0);
        let client = Client::builder()
            .address("scripted:1")
            .build_with_dialer(dialer)
            .unwrap();

        let _peer = log.next_peer().await;
        assert_eq!(log.attempts().len(), 1);
        assert_eq!(client.address(), "scripted:1");
    }

    #[tokio::test]
    async fn test_queue_introspection() {
        let (dialer, _log) = ScriptedDialer::new(usize::MAX);
        let client = Client::builder()
            .address("scripted:1")
            .retry_min(Duration::from_secs(60))
            .queue_capacity(2)
            .build_with_dialer(dialer)
            .unwrap();

        assert_eq!(client.queue_capacity(), 2);
        assert_eq!(client.pending(), 0);
        assert!(!client.is_backpressure_active());

        for _ in 0..2 {
            let client = client.clone();
            tokio::spawn(async move { client.write(b"x").await });
        }
        tokio::task::yield_now().await;

        assert_eq!(client.pending(), 2);
        assert!(client.is_backpressure_active());
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_full_queue_waits_then_proceeds() {
        let (dialer, mut log) = ScriptedDialer::new(1);
        let client = Client::builder()
            .address("scripted:1")
            .retry_min(Duration::from_millis(50))
            .retry_max(Duration::from_millis(50))
            .queue_capacity(1)
            .build_with_dialer(dialer)
            .unwrap();

        let first = {
            let client = client.clone();
            tokio::spawn(async move { client.write(b"1").await })
        };
        tokio::task::yield_now().await;
        assert!(client.is_backpressure_active());

        // Waits for room in the queue, then for its own turn.
        let second = {
            let client = client.clone();
            tokio::spawn(async move { client.write(b"2").await })
        };

        let _peer = log.next_peer().await;
        assert_eq!(first.await.unwrap().unwrap(), 1);
        assert_eq!(second.await.unwrap().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_read_timeout_leaves_buffer_untouched() {
        let (dialer, mut log) = ScriptedDialer::new(0);
        let client = Client::builder()
            .address("scripted:1")
            .build_with_dialer(dialer)
            .unwrap();
        let _peer = log.next_peer().await;

        let mut buf = [0xAAu8; 8];
        let err = client
            .read_timeout(&mut buf, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, PerconnError::Timeout(_)));
        assert_eq!(buf, [0xAA; 8]);
    }

    #[tokio::test]
    async fn test_drop_last_handle_stops_manager() {
        let (dialer, mut log) = ScriptedDialer::new(0);
        let client = Client::builder()
            .address("scripted:1")
            .build_with_dialer(dialer)
            .unwrap();
        let mut peer = log.next_peer().await;
        let mut states = client.watch_state();

        let clone = client.clone();
        drop(client);
        assert!(!clone.is_closed());
        drop(clone);

        states
            .wait_for(|s| *s == ConnectionState::Stopped)
            .await
            .unwrap();
        // The manager closed its end of the connection.
        let mut buf = [0u8; 1];
        let n = tokio::io::AsyncReadExt::read(&mut peer, &mut buf)
            .await
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_concurrent_shutdown_waits_for_manager() {
        let (dialer, mut log) = ScriptedDialer::new(0);
        let client = Client::builder()
            .address("scripted:1")
            .build_with_dialer(dialer)
            .unwrap();
        let mut peer = log.next_peer().await;
        wait_for_state(&client, ConnectionState::Proxying).await;

        let other = client.clone();
        let (first, second) = tokio::join!(
            async {
                client.shutdown().await;
                client.state()
            },
            async {
                other.shutdown().await;
                other.state()
            }
        );
        assert_eq!(first, ConnectionState::Stopped);
        assert_eq!(second, ConnectionState::Stopped);

        let mut buf = [0u8; 1];
        let n = tokio::io::AsyncReadExt::read(&mut peer, &mut buf)
            .await
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_write_cut_short_reports_bytes_written() {
        let (dialer, mut log) = ScriptedDialer::new(0);
        let client = Client::builder()
            .address("scripted:1")
            .build_with_dialer(dialer)
            .unwrap();
        let peer = log.next_peer().await;

        // Larger than the in-memory pipe, so the write stalls part way.
        let data = vec![1u8; 3 * PIPE_CAPACITY];
        let write = {
            let client = client.clone();
            tokio::spawn(async move { client.write(&data).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(peer);

        let err = write.await.unwrap().unwrap_err();
        match &err {
            PerconnError::PartialWrite { written, source } => {
                assert_eq!(*written, PIPE_CAPACITY);
                assert_eq!(source.kind(), std::io::ErrorKind::BrokenPipe);
            }
            other => panic!("expected partial write, got {:?}", other),
        }
        assert_eq!(err.io_kind(), Some(std::io::ErrorKind::BrokenPipe));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (dialer, _log) = ScriptedDialer::new(0);
        let client = Client::builder()
            .address("scripted:1")
            .build_with_dialer(dialer)
            .unwrap();

        client.close();
        client.close();
        assert!(client.is_closed());
        client.shutdown().await;
        client.shutdown().await;
        assert_eq!(client.state(), ConnectionState::Stopped);
    }
}
