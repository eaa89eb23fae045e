use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::debug;

use crate::channel::socket::ChannelSocket;

/// Accepted TCP connection.
///
/// Reads are non-blocking `try_read`s on the read half. Writes are queued
/// to a writer task so the dispatch thread never waits on the peer.
pub struct TokioSocket {
    peer: SocketAddr,
    reader: Arc<OwnedReadHalf>,
    writer: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
}

impl TokioSocket {
    /// Split `stream` and spawn its writer task; needs a runtime context
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        let (reader, mut write_half) = stream.into_split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();

        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if let Err(e) = write_half.write_all(&frame).await {
                    debug!(%peer, %e, "Write failed");
                    return;
                }
            }
            let _ = write_half.shutdown().await;
        });

        Self {
            peer,
            reader: Arc::new(reader),
            writer: Mutex::new(Some(tx)),
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub(crate) fn reader(&self) -> Arc<OwnedReadHalf> {
        Arc::clone(&self.reader)
    }
}

impl ChannelSocket for TokioSocket {
    fn receive(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.try_read(buf)
    }

    fn send(&self, bufs: &[&[u8]]) -> io::Result<usize> {
        let writer = self.writer.lock();
        let Some(tx) = writer.as_ref() else {
            return Err(io::Error::from(io::ErrorKind::NotConnected));
        };
        let mut frame = BytesMut::with_capacity(bufs.iter().map(|b| b.len()).sum());
        for buf in bufs {
            frame.put_slice(buf);
        }
        let length = frame.len();
        tx.send(frame.freeze())
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))?;
        Ok(length)
    }

    fn close(&self) {
        // queued frames are still flushed before the write side shuts down
        self.writer.lock().take();
    }
}
