//! Work items: one queued read or write and the slot its result goes to.

use std::io;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::oneshot;

use crate::transport::Connection;

/// Outcome of a serviced item: bytes transferred and, for reads, the
/// private buffer holding them.
#[derive(Debug)]
pub(crate) struct Transfer {
    pub n: usize,
    pub data: Vec<u8>,
}

/// A failed item: the I/O error and how many bytes went out before it.
#[derive(Debug)]
pub(crate) struct Failed {
    pub n: usize,
    pub error: io::Error,
}

impl Failed {
    fn before_any(error: io::Error) -> Self {
        Self { n: 0, error }
    }
}

pub(crate) type Outcome = Result<Transfer, Failed>;
pub(crate) type Reply = oneshot::Sender<Outcome>;
pub(crate) type Pending = oneshot::Receiver<Outcome>;

#[derive(Debug)]
pub(crate) enum Op {
    /// Read up to `len` bytes into a buffer owned by the item.
    Read { len: usize },
    /// Write all of `data`.
    Write { data: Bytes },
}

#[derive(Debug)]
pub(crate) struct WorkItem {
    pub op: Op,
    pub reply: Reply,
}

impl WorkItem {
    pub(crate) fn read(len: usize) -> (Self, Pending) {
        Self::new(Op::Read { len })
    }

    pub(crate) fn write(data: Bytes) -> (Self, Pending) {
        Self::new(Op::Write { data })
    }

    fn new(op: Op) -> (Self, Pending) {
        let (reply, pending) = oneshot::channel();
        (Self { op, reply }, pending)
    }

    /// The caller stopped waiting before this item was serviced.
    #[inline]
    pub(crate) fn is_abandoned(&self) -> bool {
        self.reply.is_closed()
    }
}

impl Op {
    /// Run the operation against the live connection.
    ///
    /// A read that returns no bytes for a non-empty buffer means the peer
    /// closed the connection, and is an error. Zero-length reads complete
    /// without touching the connection. A write that fails part way reports
    /// the bytes already accepted by the connection.
    pub(crate) async fn perform<C: Connection>(&self, conn: &mut C) -> Outcome {
        match self {
            Op::Read { len: 0 } => Ok(Transfer {
                n: 0,
                data: Vec::new(),
            }),
            Op::Read { len } => {
                let mut data = vec![0u8; *len];
                let n = conn.read(&mut data).await.map_err(Failed::before_any)?;
                if n == 0 {
                    return Err(Failed::before_any(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed by peer",
                    )));
                }
                data.truncate(n);
                Ok(Transfer { n, data })
            }
            Op::Write { data } => {
                let mut n = 0;
                while n < data.len() {
                    match conn.write(&data[n..]).await {
                        Ok(0) => {
                            return Err(Failed {
                                n,
                                error: io::ErrorKind::WriteZero.into(),
                            })
                        }
                        Ok(written) => n += written,
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                        Err(error) => return Err(Failed { n, error }),
                    }
                }
                conn.flush().await.map_err(|error| Failed { n, error })?;
                Ok(Transfer {
                    n,
                    data: Vec::new(),
                })
            }
        }
    }
}
