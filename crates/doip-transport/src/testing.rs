//! Deterministic socket and timer doubles for driving a [`TcpHandler`](crate::TcpHandler)
//! without a network or a runtime.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::channel::socket::ChannelSocket;
use crate::channel::timer::{TimerKey, TimerService};
use crate::wire::{DoIpMessage, HEADER_LENGTH};

#[derive(Debug, Default)]
struct ScriptState {
    incoming: VecDeque<Vec<u8>>,
    eof: bool,
    closed: bool,
    close_calls: usize,
    sent: Vec<Vec<u8>>,
    send_limit: Option<usize>,
    fail_sends: bool,
}

/// Socket fed from a queue of chunks.
///
/// Each `receive` returns at most one queued chunk, so a test controls
/// exactly how the byte stream is split across reads. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSocket {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedSocket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes as one chunk
    pub fn push(&self, bytes: impl Into<Vec<u8>>) {
        let bytes = bytes.into();
        if !bytes.is_empty() {
            self.state.lock().incoming.push_back(bytes);
        }
    }

    /// Queue bytes split into chunks of `chunk_size`
    pub fn push_chunked(&self, bytes: &[u8], chunk_size: usize) {
        for chunk in bytes.chunks(chunk_size.max(1)) {
            self.push(chunk.to_vec());
        }
    }

    /// Peer closes once the queued chunks are consumed
    pub fn push_eof(&self) {
        self.state.lock().eof = true;
    }

    /// Accept at most `limit` bytes per send
    pub fn set_send_limit(&self, limit: Option<usize>) {
        self.state.lock().send_limit = limit;
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.state.lock().fail_sends = fail;
    }

    /// Bytes not yet consumed by the channel
    pub fn pending_bytes(&self) -> usize {
        self.state.lock().incoming.iter().map(Vec::len).sum()
    }

    /// Every accepted send, one entry per call
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.state.lock().sent.clone()
    }

    /// Sent bytes parsed into DoIP messages
    pub fn sent_messages(&self) -> Vec<DoIpMessage> {
        let bytes: Vec<u8> = self.state.lock().sent.concat();
        split_frames(&bytes)
    }

    pub fn clear_sent(&self) {
        self.state.lock().sent.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn close_calls(&self) -> usize {
        self.state.lock().close_calls
    }
}

impl ChannelSocket for ScriptedSocket {
    fn receive(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(io::Error::from(io::ErrorKind::NotConnected));
        }
        let Some(mut chunk) = state.incoming.pop_front() else {
            return if state.eof {
                Ok(0)
            } else {
                Err(io::Error::from(io::ErrorKind::WouldBlock))
            };
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            let rest = chunk.split_off(n);
            state.incoming.push_front(rest);
        }
        Ok(n)
    }

    fn send(&self, bufs: &[&[u8]]) -> io::Result<usize> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        if state.fail_sends {
            return Err(io::Error::from(io::ErrorKind::ConnectionReset));
        }
        let mut frame = bufs.concat();
        if let Some(limit) = state.send_limit {
            frame.truncate(limit);
        }
        let accepted = frame.len();
        state.sent.push(frame);
        Ok(accepted)
    }

    fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.close_calls += 1;
    }
}

/// Timer service that only records; tests fire expiries by hand
#[derive(Debug, Default)]
pub struct ManualTimers {
    active: Mutex<Vec<(TimerKey, Duration)>>,
}

impl ManualTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently armed timers in start order
    pub fn active(&self) -> Vec<(TimerKey, Duration)> {
        self.active.lock().clone()
    }

    /// Armed timer of one channel
    pub fn active_for(&self, slot: usize) -> Option<(TimerKey, Duration)> {
        self.active.lock().iter().copied().find(|(key, _)| key.slot == slot)
    }

    /// Disarm and return the armed timer of one channel, as if it had expired
    pub fn expire(&self, slot: usize) -> Option<TimerKey> {
        let mut active = self.active.lock();
        let index = active.iter().position(|(key, _)| key.slot == slot)?;
        Some(active.remove(index).0)
    }
}

impl TimerService for ManualTimers {
    fn start(&self, key: TimerKey, timeout: Duration) {
        let mut active = self.active.lock();
        active.retain(|(k, _)| *k != key);
        active.push((key, timeout));
    }

    fn stop(&self, key: TimerKey) {
        self.active.lock().retain(|(k, _)| *k != key);
    }
}

/// Split a byte stream into DoIP messages; a trailing partial frame is dropped
pub fn split_frames(mut bytes: &[u8]) -> Vec<DoIpMessage> {
    let mut messages = Vec::new();
    while bytes.len() >= HEADER_LENGTH {
        let mut header = [0u8; HEADER_LENGTH];
        header.copy_from_slice(&bytes[..HEADER_LENGTH]);
        let mut message = DoIpMessage::default();
        message.fill_header(&header);
        let end = HEADER_LENGTH + message.payload_length as usize;
        if bytes.len() < end {
            break;
        }
        message.payload = bytes[HEADER_LENGTH..end].to_vec();
        messages.push(message);
        bytes = &bytes[end..];
    }
    messages
}
