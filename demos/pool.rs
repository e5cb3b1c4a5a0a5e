//! Client pool - several workers sharing a fixed set of connections.
//!
//! # Running
//!
//! ```sh
//! RUST_LOG=perconn=debug cargo run --example pool
//! ```

use perconn::pool::ClientPool;
use perconn::TracingSink;
use tokio::net::TcpListener;

const WORKERS: usize = 8;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("perconn=info".parse()?),
        )
        .init();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let address = listener.local_addr()?.to_string();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });

    let pool = ClientPool::builder()
        .address(&address)
        .size(3)
        .event_sink(TracingSink)
        .build()?;

    let mut workers = Vec::with_capacity(WORKERS);
    for id in 0..WORKERS {
        let pool = pool.clone();
        workers.push(tokio::spawn(async move {
            let conn = pool.acquire().await?;
            let message = format!("worker {} says hi", id);
            conn.write(message.as_bytes()).await?;

            let mut echoed = vec![0u8; message.len()];
            let mut filled = 0;
            while filled < echoed.len() {
                filled += conn.read(&mut echoed[filled..]).await?;
            }
            pool.release(conn);
            Ok::<_, perconn::PerconnError>(String::from_utf8_lossy(&echoed).into_owned())
        }));
    }

    for worker in workers {
        println!("{}", worker.await??);
    }

    pool.close()?;
    Ok(())
}
