//! Transport module - establishing the physical connection.
//!
//! The connection manager never looks inside a connection: anything that is
//! `AsyncRead + AsyncWrite` can carry the caller's bytes. A [`Dialer`] knows
//! how to open one for an address.
//!
//! Provides:
//! - [`TcpDialer`]: TCP sockets (the default)
//! - [`UnixDialer`]: Unix Domain Sockets, where the address is a socket path

use std::future::Future;
use std::io;

use tokio::io::{AsyncRead, AsyncWrite};

#[cfg(test)]
pub(crate) mod mock;
mod tcp;
#[cfg(unix)]
mod unix;

pub use tcp::TcpDialer;
#[cfg(unix)]
pub use unix::UnixDialer;

/// A live, bidirectional byte stream owned by the connection manager.
pub trait Connection: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> Connection for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// Opens connections to a remote address.
///
/// The manager bounds every call with the configured dial timeout, so
/// implementations do not need their own.
pub trait Dialer: Send + Sync + 'static {
    /// The connection type this dialer produces.
    type Conn: Connection;

    /// Open a new connection to `address`.
    fn dial(&self, address: &str) -> impl Future<Output = io::Result<Self::Conn>> + Send;
}
