use std::future::Future;
use std::io;

use tokio::net::UnixStream;

use super::Dialer;

/// Dials Unix Domain Sockets. The address is the socket path.
#[derive(Debug, Clone, Default)]
pub struct UnixDialer {
    _priv: (),
}

impl UnixDialer {
    /// Create a Unix socket dialer.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Dialer for UnixDialer {
    type Conn = UnixStream;

    fn dial(&self, address: &str) -> impl Future<Output = io::Result<UnixStream>> + Send {
        let path = address.to_owned();
        async move { UnixStream::connect(path).await }
    }
}
