//! # perconn
//!
//! Persistent connection to a single remote endpoint, shared by any number
//! of concurrent callers.
//!
//! One background task per [`Client`] owns the physical connection. It
//! dials with exponential backoff, services queued reads and writes in the
//! order they were submitted, and redials whenever the connection fails.
//! Callers see plain `read`/`write` calls that return once their own
//! request has been serviced.
//!
//! ## Architecture
//!
//! - **Client**: cloneable handle; validates configuration and starts the
//!   connection manager
//! - **Connection manager**: dial/backoff/reconnect state machine that drains
//!   a bounded queue against the live connection
//! - **Pool**: fixed set of clients to one host, acquired and released by
//!   callers
//!
//! Bytes pass through unmodified; there is no framing.
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//! use perconn::Client;
//!
//! #[tokio::main]
//! async fn main() -> perconn::Result<()> {
//!     let client = Client::builder()
//!         .address("127.0.0.1:7000")
//!         .retry_min(Duration::from_millis(10))
//!         .retry_max(Duration::from_millis(100))
//!         .build()?;
//!
//!     assert_eq!(client.write(b"hi").await?, 2);
//!
//!     let mut buf = [0u8; 2];
//!     client.read(&mut buf).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod pool;
pub mod transport;

mod backoff;
mod client;
mod manager;
mod work;

pub use client::{Client, ClientBuilder};
pub use config::ClientConfig;
pub use error::{ConfigError, PerconnError, Result};
pub use event::{ConnectionState, EventSink, ManagerEvent, TracingSink};
