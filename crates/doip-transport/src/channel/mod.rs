//! Per-connection channel: framing loop, state machine and send path
//!
//! A channel is created once per pool slot and cycles
//! `Listen -> ... -> Finalize -> Listen` for the lifetime of the handler.
//! Everything except the send path runs on the dispatch thread; callers
//! pass the handler-owned collaborators in as a [`ChannelEnv`] on every call.

pub mod socket;
pub mod state;
pub mod timer;

use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::DoIpConfig;
use crate::error::ChannelError;
use crate::processors::ProcessorTable;
use crate::reader::{ActionForReader, MessageReaders, ReaderAction, ReaderContext, ReaderKind};
use crate::uds::{
    Address, ChannelId, GlobalChannelId, HandlerId, TransmissionResult, UdsMessage,
    UdsTransportProtocolMgr, UNREGISTERED_CHANNEL_ID,
};
use crate::wire::{
    encode_header, DoIpMessage, NackCode, PayloadType, ProtocolVersion, DISCARD_CHUNK_SIZE,
    SA_TA_LENGTH, UNREGISTERED_SOURCE_ADDRESS,
};

use socket::{receive_available, ChannelSocket, ResponseSender};
use state::ChannelState;
use timer::{InactivityTimer, TimerKey, TimerService};

/// Result of one read step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// Bytes were consumed; more may be waiting
    Progress,
    /// Nothing available right now
    WouldBlock,
    /// The channel no longer has a socket
    Closed,
}

/// The other channels of the pool, read-only
pub(crate) struct Peers<'a, S> {
    pub before: &'a [DoIpChannel<S>],
    pub after: &'a [DoIpChannel<S>],
}

impl<'a, S> Peers<'a, S> {
    pub(crate) fn iter(&self) -> impl Iterator<Item = &'a DoIpChannel<S>> {
        self.before.iter().chain(self.after.iter())
    }
}

/// Handler-owned collaborators a channel needs while processing
pub(crate) struct ChannelEnv<'a, S> {
    pub peers: Peers<'a, S>,
    pub config: &'a DoIpConfig,
    pub processors: &'a ProcessorTable,
    pub mgr: &'a dyn UdsTransportProtocolMgr,
    pub timers: &'a dyn TimerService,
    pub handler_id: HandlerId,
}

impl<'a, S: ChannelSocket> ChannelEnv<'a, S> {
    pub(crate) fn check_header(&self, message: &DoIpMessage) -> NackCode {
        self.processors
            .check_header(message, self.config.max_message_length)
    }

    /// Channels not in `Listen`, including `channel`
    pub(crate) fn established_channels(&self, channel: &DoIpChannel<S>) -> usize {
        self.peers
            .iter()
            .chain(std::iter::once(channel))
            .filter(|c| c.is_established())
            .count()
    }

    /// Whether another channel holds a routing activation for `source_address`
    pub(crate) fn is_source_address_registered(&self, source_address: Address) -> bool {
        self.peers
            .iter()
            .any(|c| c.state.is_registered() && c.source_address == source_address)
    }
}

pub struct DoIpChannel<S> {
    slot: usize,
    state: ChannelState,
    socket: Option<S>,
    send_lock: Mutex<()>,
    readers: MessageReaders,
    /// Message buffer while no reader holds it
    message: Option<DoIpMessage>,
    uds_message: Option<UdsMessage>,
    requested: usize,
    bytes_read: usize,
    pending: ReaderAction,
    /// Reader whose evaluation produced `pending`
    evaluated_by: ReaderKind,
    source_address: Address,
    channel_id: ChannelId,
    timer: InactivityTimer,
}

impl<S: ChannelSocket> DoIpChannel<S> {
    pub fn new(slot: usize) -> Self {
        Self {
            slot,
            state: ChannelState::Listen,
            socket: None,
            send_lock: Mutex::new(()),
            readers: MessageReaders::new(),
            message: Some(DoIpMessage::default()),
            uds_message: None,
            requested: 0,
            bytes_read: 0,
            pending: ReaderAction::finished(0),
            evaluated_by: ReaderKind::Header,
            source_address: UNREGISTERED_SOURCE_ADDRESS,
            channel_id: UNREGISTERED_CHANNEL_ID,
            timer: InactivityTimer::new(slot),
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn source_address(&self) -> Address {
        self.source_address
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub fn active_reader(&self) -> ReaderKind {
        self.readers.active()
    }

    pub fn has_socket(&self) -> bool {
        self.socket.is_some()
    }

    pub fn is_established(&self) -> bool {
        self.state != ChannelState::Listen
    }

    pub fn is_inactivity_timer_running(&self) -> bool {
        self.timer.is_running()
    }

    pub(crate) fn set_registration(&mut self, source_address: Address) {
        self.source_address = source_address;
        self.channel_id = ChannelId::from(source_address);
    }

    pub(crate) fn global_channel_id(&self, handler_id: HandlerId) -> GlobalChannelId {
        GlobalChannelId {
            handler_id,
            channel_id: self.channel_id,
        }
    }

    /// Run the exit action of the current state, switch, run the entry action
    pub(crate) fn try_change_state(&mut self, to: ChannelState, env: &ChannelEnv<'_, S>) -> bool {
        let from = self.state;
        if !from.is_valid_change(to) {
            debug!(slot = self.slot, %from, %to, "Rejected state change");
            return false;
        }
        from.on_leave(self, env);
        self.state = to;
        debug!(slot = self.slot, %from, %to, "State changed");
        to.on_enter(self, env);
        true
    }

    /// Take over a freshly accepted connection
    pub(crate) fn attach(&mut self, socket: S, env: &ChannelEnv<'_, S>) -> bool {
        if !self.try_change_state(ChannelState::Initialized, env) {
            socket.close();
            return false;
        }
        self.socket = Some(socket);
        true
    }

    pub(crate) fn start_inactivity_timer(&mut self, timeout: Duration, env: &ChannelEnv<'_, S>) {
        self.timer.start(env.timers, timeout);
    }

    pub(crate) fn stop_inactivity_timer(&mut self, env: &ChannelEnv<'_, S>) {
        self.timer.stop(env.timers);
    }

    pub(crate) fn on_inactivity_timeout(&mut self, key: TimerKey, env: &ChannelEnv<'_, S>) {
        if !self.timer.expire(key) {
            return;
        }
        info!(slot = self.slot, state = %self.state, "Inactivity timeout");
        self.try_change_state(ChannelState::Finalize, env);
    }

    /// Read as far as the socket allows without blocking.
    ///
    /// One call advances the framing by at most one step: a partial fill,
    /// a completed reader evaluation, or one discard chunk.
    pub(crate) fn handle_read(&mut self, env: &ChannelEnv<'_, S>) -> ReadStatus {
        if self.socket.is_none() {
            return ReadStatus::Closed;
        }

        let progressed = if self.pending.bytes_to_discard == 0 {
            self.read_step(env)
        } else {
            self.discard_step(env)
        };

        match (self.socket.is_some(), progressed) {
            (false, _) => ReadStatus::Closed,
            (true, true) => ReadStatus::Progress,
            (true, false) => ReadStatus::WouldBlock,
        }
    }

    fn read_step(&mut self, env: &ChannelEnv<'_, S>) -> bool {
        if self.pending.action == ActionForReader::FinishedReading {
            self.initialize_reader();
        }

        let received = match self.fill_requested() {
            Ok(received) => received,
            Err(e) => {
                debug!(slot = self.slot, %e, "Connection lost while reading");
                self.try_change_state(ChannelState::Finalize, env);
                return true;
            }
        };
        if self.bytes_read < self.requested {
            return received > 0;
        }

        self.evaluated_by = self.readers.active();
        self.pending = self.evaluate_reader(env);

        match self.pending.action {
            ActionForReader::ContinueReading if self.pending.bytes_to_discard == 0 => {
                self.initialize_reader();
            }
            ActionForReader::CloseSocket => {
                if let Err(e) = self.flush_socket(self.pending.bytes_to_discard) {
                    debug!(slot = self.slot, %e, "Flush before close failed");
                }
                self.pending.bytes_to_discard = 0;
            }
            _ => {}
        }
        if self.pending.bytes_to_discard == 0 {
            self.finish_message(env);
        }
        true
    }

    fn discard_step(&mut self, env: &ChannelEnv<'_, S>) -> bool {
        match self.flush_socket(self.pending.bytes_to_discard) {
            Ok(0) => false,
            Ok(discarded) => {
                self.pending.bytes_to_discard -= discarded;
                if self.pending.bytes_to_discard == 0 {
                    self.finish_message(env);
                }
                true
            }
            Err(e) => {
                debug!(slot = self.slot, %e, "Connection lost while discarding");
                self.try_change_state(ChannelState::Finalize, env);
                true
            }
        }
    }

    fn initialize_reader(&mut self) {
        let message = match self.message.take() {
            Some(message) => message,
            None => panic!("channel {} has no message buffer to read into", self.slot),
        };
        self.requested = self.readers.initialize(message);
        self.bytes_read = 0;
        self.pending = ReaderAction::continue_reading();
    }

    fn fill_requested(&mut self) -> Result<usize, ChannelError> {
        let socket = self.socket.as_ref().ok_or(ChannelError::NoSocket)?;
        let buffer = self.readers.buffer(&mut self.uds_message);
        let received = receive_available(socket, &mut buffer[self.bytes_read..self.requested])?;
        self.bytes_read += received;
        Ok(received)
    }

    fn evaluate_reader(&mut self, env: &ChannelEnv<'_, S>) -> ReaderAction {
        let mut ctx = ReaderContext {
            slot: self.slot,
            state: self.state,
            source_address: self.source_address,
            channel_id: self.channel_id,
            message: &mut self.message,
            uds_message: &mut self.uds_message,
            sender: ResponseSender::new(self.slot, self.socket.as_ref(), &self.send_lock),
            env,
        };
        self.readers.evaluate(&mut ctx)
    }

    /// Drain up to one chunk of obsolete bytes
    fn flush_socket(&mut self, bytes_to_flush: usize) -> Result<usize, ChannelError> {
        let socket = self.socket.as_ref().ok_or(ChannelError::NoSocket)?;
        let mut scratch = [0u8; DISCARD_CHUNK_SIZE];
        let length = bytes_to_flush.min(DISCARD_CHUNK_SIZE);
        receive_available(socket, &mut scratch[..length])
    }

    fn finish_message(&mut self, env: &ChannelEnv<'_, S>) {
        match self.pending.action {
            ActionForReader::CloseSocket => {
                self.try_change_state(ChannelState::Finalize, env);
                self.reset_reader();
            }
            ActionForReader::FinishedReading => {
                if self.evaluated_by.delivers_message() {
                    self.deliver_message(env);
                }
                self.reset_reader();
            }
            ActionForReader::ContinueReading => {}
        }
    }

    fn deliver_message(&mut self, env: &ChannelEnv<'_, S>) {
        let message = match self.message.take() {
            Some(message) => message,
            None => panic!("channel {} finished a message it does not hold", self.slot),
        };
        debug!(
            slot = self.slot,
            payload_type = message.payload_type,
            payload = %hex::encode(&message.payload),
            "Message complete"
        );
        let state = self.state;
        state.handle_message(&message, self, env);
        self.message = Some(message);
    }

    fn reset_reader(&mut self) {
        if let Some(message) = self.readers.reset() {
            self.message = Some(message);
        }
        self.requested = 0;
        self.bytes_read = 0;
        self.pending = ReaderAction::finished(0);
    }

    /// Return the channel to its pristine state; runs when leaving `Finalize`
    pub(crate) fn reset_channel(&mut self, env: &ChannelEnv<'_, S>) {
        self.stop_inactivity_timer(env);
        self.close_socket();
        self.notify_message_failure(env);
        self.reset_reader();
        self.source_address = UNREGISTERED_SOURCE_ADDRESS;
        self.channel_id = UNREGISTERED_CHANNEL_ID;
    }

    fn close_socket(&mut self) {
        if let Some(socket) = self.socket.take() {
            socket.close();
            debug!(slot = self.slot, "Socket closed");
        }
    }

    fn notify_message_failure(&mut self, env: &ChannelEnv<'_, S>) {
        if matches!(
            self.readers.active(),
            ReaderKind::PreDiagnostic | ReaderKind::Diagnostic
        ) {
            if let Some(uds_message) = self.uds_message.take() {
                warn!(slot = self.slot, "Diagnostic message reception aborted");
                env.mgr.notify_message_failure(uds_message);
            }
        }
    }

    /// Hand over the UDS message allocated during preprocessing
    pub(crate) fn release_uds_message(&mut self) -> Option<UdsMessage> {
        self.uds_message.take()
    }

    pub(crate) fn send_response(&self, message: &DoIpMessage) -> bool {
        ResponseSender::new(self.slot, self.socket.as_ref(), &self.send_lock).send(message)
    }

    /// Send an outbound UDS message as a diagnostic message and confirm it
    pub(crate) fn transmit(&self, message: UdsMessage, mgr: &dyn UdsTransportProtocolMgr) {
        let version = ProtocolVersion::RESPONSE;
        let payload = message.payload();
        let header = encode_header(
            version as u8,
            version.inverse(),
            PayloadType::DiagnosticMessage.code(),
            (payload.len() + SA_TA_LENGTH) as u32,
        );
        let sa = message.source_address().to_be_bytes();
        let ta = message.target_address().to_be_bytes();
        let addresses = [sa[0], sa[1], ta[0], ta[1]];
        let expected = header.len() + addresses.len() + payload.len();

        let sender = ResponseSender::new(self.slot, self.socket.as_ref(), &self.send_lock);
        let result = match sender.send_frame(&[&header, &addresses, payload]) {
            Ok(sent) if sent == expected => TransmissionResult::TransmitOk,
            Ok(sent) => {
                warn!(slot = self.slot, sent, expected, "Diagnostic message partially sent");
                TransmissionResult::TransmitFailed
            }
            Err(e) => {
                warn!(slot = self.slot, %e, "Connection closed while sending diagnostic message");
                TransmissionResult::TransmitFailed
            }
        };
        debug!(
            slot = self.slot,
            sa = message.source_address(),
            ta = message.target_address(),
            ?result,
            "Diagnostic message transmitted"
        );
        mgr.transmit_confirmation(message, result);
    }
}
