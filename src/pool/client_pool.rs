//! Pool of persistent clients to a single host.

use std::sync::Arc;
use std::time::Duration;

use crate::client::{Client, ClientBuilder};
use crate::config::{ClientConfig, DEFAULT_POOL_SIZE};
use crate::error::{ConfigError, Result};
use crate::event::EventSink;
use crate::transport::{Dialer, TcpDialer};

use super::{Pool, Pooled};

/// Builder for a [`ClientPool`].
pub struct ClientPoolBuilder {
    config: ClientConfig,
    size: usize,
    sink: Option<Arc<dyn EventSink>>,
}

impl ClientPoolBuilder {
    /// Create a builder with default tuning, a pool size of 5 and no address.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            size: DEFAULT_POOL_SIZE,
            sink: None,
        }
    }

    /// Set the address every pooled client dials.
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.config.address = address.into();
        self
    }

    /// Set the number of clients (and so connections) to maintain.
    ///
    /// Default: 5
    pub fn size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Set the backoff after the first failed dial and after a dropped
    /// connection, for every pooled client.
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

    /// Set the queue capacity of each pooled client.
    ///
    /// Default: 10
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Report events from every pooled client to one shared `sink`.
    ///
    /// Default: [`TracingSink`](crate::TracingSink)
    pub fn event_sink(mut self, sink: impl EventSink) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Validate and start `size` TCP clients.
    pub fn build(self) -> Result<ClientPool> {
        self.build_with_dialer(TcpDialer::new())
    }

    /// Validate and start `size` clients, each dialing with a clone of
    /// `dialer`.
    pub fn build_with_dialer<D: Dialer + Clone>(self, dialer: D) -> Result<ClientPool> {
        if self.config.address.is_empty() {
            return Err(ConfigError::EmptyAddress.into());
        }
        if self.size == 0 {
            return Err(ConfigError::ZeroPoolSize.into());
        }
        self.config.validate()?;

        let Self { config, size, sink } = self;
        let pool = Pool::new(
            size,
            || {
                ClientBuilder::from_config(config.clone())
                    .shared_event_sink(sink.clone())
                    .build_with_dialer(dialer.clone())
            },
            |client: Client| {
                client.close();
                Ok(())
            },
        )?;

        tracing::debug!(address = %config.address, size, "client pool started");
        Ok(ClientPool { pool })
    }
}

impl Default for ClientPoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A fixed number of [`Client`]s to one address.
///
/// Each client owns its own connection, so requests on different pooled
/// clients proceed in parallel while each client still serializes its own.
///
/// Never close a client obtained from the pool: release it (or drop the
/// guard) and let [`close`](Self::close) shut everything down.
///
/// # Example
///
/// ```no_run
/// use perconn::pool::ClientPool;
///
/// # async fn run() -> perconn::Result<()> {
/// let pool = ClientPool::builder()
///     .address("echo-server.example.com:7")
///     .size(4)
///     .build()?;
///
/// let conn = pool.acquire().await?;
/// conn.write(b"hello, world").await?;
/// let mut buf = [0u8; 512];
/// conn.read(&mut buf).await?;
/// pool.release(conn);
///
/// pool.close()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ClientPool {
    pool: Pool<Client>,
}

impl ClientPool {
    /// Create a new client pool builder.
    pub fn builder() -> ClientPoolBuilder {
        ClientPoolBuilder::new()
    }

    /// Take a client, waiting until one is free.
    pub async fn acquire(&self) -> Result<Pooled<Client>> {
        self.pool.acquire().await
    }

    /// Take a client without waiting.
    pub fn try_acquire(&self) -> Result<Pooled<Client>> {
        self.pool.try_acquire()
    }

    /// Give a client back.
    pub fn release(&self, client: Pooled<Client>) {
        self.pool.release(client);
    }

    /// Close every client: idle ones now, checked-out ones on release.
    pub fn close(&self) -> Result<()> {
        self.pool.close()
    }

    /// Number of clients the pool was built with.
    pub fn size(&self) -> usize {
        self.pool.capacity()
    }

    /// Number of clients free to acquire right now.
    pub fn available(&self) -> usize {
        self.pool.available()
    }
}
