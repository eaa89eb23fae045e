//! Byte-oriented socket seam used by a channel

use std::io;

use parking_lot::Mutex;
use tracing::{error, warn};

use crate::error::ChannelError;
use crate::wire::DoIpMessage;

/// A connected, non-blocking stream socket.
///
/// `receive` returns `WouldBlock` when no data is available yet and `Ok(0)`
/// once the peer closed the connection.
pub trait ChannelSocket: Send + Sync {
    fn receive(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Send all buffers as one frame; returns the number of bytes accepted
    fn send(&self, bufs: &[&[u8]]) -> io::Result<usize>;

    fn close(&self);
}

/// Read what is available into `buf`.
///
/// No data yet is `Ok(0)`; end of stream is an error.
pub(crate) fn receive_available<S: ChannelSocket>(
    socket: &S,
    buf: &mut [u8],
) -> Result<usize, ChannelError> {
    if buf.is_empty() {
        return Ok(0);
    }
    match socket.receive(buf) {
        Ok(0) => Err(ChannelError::ClosedByPeer),
        Ok(n) => Ok(n),
        Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
            Ok(0)
        }
        Err(e) => Err(ChannelError::Io(e)),
    }
}

/// Send path of one channel, serialised by the channel's send lock
pub(crate) struct ResponseSender<'a, S> {
    slot: usize,
    socket: Option<&'a S>,
    lock: &'a Mutex<()>,
}

impl<'a, S: ChannelSocket> ResponseSender<'a, S> {
    pub(crate) fn new(slot: usize, socket: Option<&'a S>, lock: &'a Mutex<()>) -> Self {
        Self { slot, socket, lock }
    }

    /// Send a complete DoIP message; returns whether every byte was accepted
    pub(crate) fn send(&self, message: &DoIpMessage) -> bool {
        let frame = message.to_bytes();
        match self.send_frame(&[&frame]) {
            Ok(sent) if sent == frame.len() => true,
            Ok(sent) => {
                warn!(
                    slot = self.slot,
                    sent,
                    expected = frame.len(),
                    "Response only partially sent"
                );
                false
            }
            Err(e) => {
                error!(slot = self.slot, %e, "Connection closed while sending response");
                false
            }
        }
    }

    pub(crate) fn send_frame(&self, bufs: &[&[u8]]) -> Result<usize, ChannelError> {
        let _guard = self.lock.lock();
        let socket = self.socket.ok_or(ChannelError::NoSocket)?;
        Ok(socket.send(bufs)?)
    }
}
