use std::future::Future;
use std::io;

use tokio::net::TcpStream;

use super::Dialer;

/// Dials TCP sockets with `TCP_NODELAY` set.
///
/// Addresses are anything `TcpStream::connect` resolves, e.g.
/// `"127.0.0.1:7000"` or `"echo.example.com:7"`.
#[derive(Debug, Clone, Default)]
pub struct TcpDialer {
    _priv: (),
}

impl TcpDialer {
    /// Create a TCP dialer.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Dialer for TcpDialer {
    type Conn = TcpStream;

    fn dial(&self, address: &str) -> impl Future<Output = io::Result<TcpStream>> + Send {
        let address = address.to_owned();
        async move {
            let stream = TcpStream::connect(&address).await?;
            stream.set_nodelay(true)?;
            Ok(stream)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_dial_connects_with_nodelay() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let accept = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).await.unwrap();
            buf
        });

        let mut stream = TcpDialer::new().dial(&address).await.unwrap();
        assert!(stream.nodelay().unwrap());
        stream.write_all(b"ping").await.unwrap();

        assert_eq!(&accept.await.unwrap(), b"ping");
    }

    #[tokio::test]
    async fn test_dial_refused() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = TcpDialer::new().dial(&address).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
    }
}
