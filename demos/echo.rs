//! Echo client - keeps talking to a server that comes and goes.
//!
//! This example demonstrates:
//! - Building a client with the builder pattern
//! - Writing and reading through the shared connection
//! - Riding out a server restart without touching the client
//!
//! # Running
//!
//! ```sh
//! RUST_LOG=perconn=debug cargo run --example echo
//! ```

use std::time::Duration;

use perconn::Client;
use tokio::net::TcpListener;
use tokio::task::{JoinHandle, JoinSet};

/// Echo every connection on `listener` until the task is aborted.
///
/// Connections live in a `JoinSet` owned by the server task, so aborting
/// the server closes them too.
fn serve(listener: TcpListener) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut connections = JoinSet::new();
        while let Ok((mut stream, peer)) = listener.accept().await {
            tracing::info!(%peer, "echo server accepted connection");
            connections.spawn(async move {
                let (mut reader, mut writer) = stream.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
            // Reap finished connections.
            while connections.try_join_next().is_some() {}
        }
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("perconn=info".parse()?),
        )
        .init();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let address = listener.local_addr()?.to_string();
    let server = serve(listener);

    let client = Client::builder()
        .address(&address)
        .retry_min(Duration::from_millis(50))
        .retry_max(Duration::from_secs(1))
        .build()?;

    let mut buf = [0u8; 64];
    client.write(b"hello").await?;
    let n = client.read(&mut buf).await?;
    println!("echoed: {}", String::from_utf8_lossy(&buf[..n]));

    // Take the server down. The next request fails and the manager starts
    // redialing in the background.
    server.abort();
    let _ = server.await;
    if let Err(e) = client.read(&mut buf).await {
        println!("server gone: {}", e);
    }

    // Bring it back on the same port; the client reconnects on its own.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let server = serve(TcpListener::bind(&address).await?);

    client.write(b"hello again").await?;
    let n = client.read(&mut buf).await?;
    println!("echoed: {}", String::from_utf8_lossy(&buf[..n]));

    client.shutdown().await;
    server.abort();
    Ok(())
}
