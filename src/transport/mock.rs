//! Scripted in-memory dialer for manager tests.

use std::future::Future;
use std::io;
use std::sync::{Arc, Mutex};

use tokio::io::{duplex, DuplexStream};
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::Dialer;

pub(crate) const PIPE_CAPACITY: usize = 4096;

struct Script {
    refusals: usize,
    attempts: Vec<Instant>,
}

/// Refuses a configurable number of dials, then hands out duplex pipes.
///
/// The far end of every accepted connection is delivered to the paired
/// [`DialLog`].
#[derive(Clone)]
pub(crate) struct ScriptedDialer {
    script: Arc<Mutex<Script>>,
    peers: mpsc::UnboundedSender<DuplexStream>,
}

/// Test-side view of a [`ScriptedDialer`].
pub(crate) struct DialLog {
    script: Arc<Mutex<Script>>,
    peers: mpsc::UnboundedReceiver<DuplexStream>,
}

impl ScriptedDialer {
    pub(crate) fn new(refusals: usize) -> (Self, DialLog) {
        let script = Arc::new(Mutex::new(Script {
            refusals,
            attempts: Vec::new(),
        }));
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                script: script.clone(),
                peers: tx,
            },
            DialLog { script, peers: rx },
        )
    }
}

impl Dialer for ScriptedDialer {
    type Conn = DuplexStream;

    fn dial(&self, _address: &str) -> impl Future<Output = io::Result<DuplexStream>> + Send {
        let outcome = {
            let mut script = self.script.lock().unwrap();
            script.attempts.push(Instant::now());
            if script.refusals > 0 {
                script.refusals -= 1;
                Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
            } else {
                let (local, remote) = duplex(PIPE_CAPACITY);
                let _ = self.peers.send(remote);
                Ok(local)
            }
        };
        async move { outcome }
    }
}

impl DialLog {
    /// Instants at which dials were attempted, in order.
    pub(crate) fn attempts(&self) -> Vec<Instant> {
        self.script.lock().unwrap().attempts.clone()
    }

    pub(crate) fn refuse_next(&self, count: usize) {
        self.script.lock().unwrap().refusals += count;
    }

    /// Wait for the next accepted connection and return its far end.
    pub(crate) async fn next_peer(&mut self) -> DuplexStream {
        self.peers.recv().await.expect("dialer dropped")
    }
}
