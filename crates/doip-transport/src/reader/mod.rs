//! Incremental message readers
//!
//! A channel frames one message at a time through a chain of readers:
//!
//! ```text
//!            +--------+   diagnostic   +----------------+  proceed  +------------+
//!   bytes -> | Header | -------------> | PreDiagnostic  | --------> | Diagnostic |
//!            +--------+                +----------------+           +------------+
//!                |  other                 | discard / close             |
//!                v                        v                             v
//!        +----------------+          back to Header              back to Header
//!        | NonDiagnostic  | --> back to Header
//!        +----------------+
//! ```
//!
//! Each reader declares how many bytes it needs, the channel fills them
//! across as many readiness events as it takes, then the reader evaluates
//! the bytes and tells the channel what to do next.

mod diagnostic;
mod header;
mod non_diagnostic;
mod pre_diagnostic;

use crate::channel::socket::{ChannelSocket, ResponseSender};
use crate::channel::state::ChannelState;
use crate::channel::ChannelEnv;
use crate::uds::{Address, ChannelId, UdsMessage};
use crate::wire::DoIpMessage;

use diagnostic::DiagnosticReader;
use header::HeaderReader;
use non_diagnostic::NonDiagnosticReader;
use pre_diagnostic::PreDiagnosticReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionForReader {
    /// The next reader is set and needs more bytes
    ContinueReading,
    /// The current message is complete
    FinishedReading,
    /// The connection must be closed
    CloseSocket,
}

/// What a reader's evaluation asks the channel to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderAction {
    pub action: ActionForReader,
    /// Payload bytes to drain from the socket before the action completes
    pub bytes_to_discard: usize,
}

impl ReaderAction {
    pub const fn continue_reading() -> Self {
        Self {
            action: ActionForReader::ContinueReading,
            bytes_to_discard: 0,
        }
    }

    pub const fn finished(bytes_to_discard: usize) -> Self {
        Self {
            action: ActionForReader::FinishedReading,
            bytes_to_discard,
        }
    }

    pub const fn close_socket(bytes_to_discard: usize) -> Self {
        Self {
            action: ActionForReader::CloseSocket,
            bytes_to_discard,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderKind {
    Header,
    NonDiagnostic,
    PreDiagnostic,
    Diagnostic,
}

impl ReaderKind {
    /// Readers whose completed message goes to the channel state
    pub fn delivers_message(self) -> bool {
        matches!(self, Self::NonDiagnostic | Self::Diagnostic)
    }
}

/// Channel data a reader may touch while evaluating
pub(crate) struct ReaderContext<'c, 'e, S> {
    pub slot: usize,
    pub state: ChannelState,
    pub source_address: Address,
    pub channel_id: ChannelId,
    /// Where a reader hands the message back to the channel
    pub message: &'c mut Option<DoIpMessage>,
    pub uds_message: &'c mut Option<UdsMessage>,
    pub sender: ResponseSender<'c, S>,
    pub env: &'c ChannelEnv<'e, S>,
}

/// The four readers of a channel plus the active one
#[derive(Debug)]
pub(crate) struct MessageReaders {
    active: ReaderKind,
    header: HeaderReader,
    non_diagnostic: NonDiagnosticReader,
    pre_diagnostic: PreDiagnosticReader,
    diagnostic: DiagnosticReader,
}

impl MessageReaders {
    pub(crate) fn new() -> Self {
        Self {
            active: ReaderKind::Header,
            header: HeaderReader::default(),
            non_diagnostic: NonDiagnosticReader::default(),
            pre_diagnostic: PreDiagnosticReader::default(),
            diagnostic: DiagnosticReader::default(),
        }
    }

    pub(crate) fn active(&self) -> ReaderKind {
        self.active
    }

    /// Hand `message` to the active reader; returns the number of bytes it needs
    pub(crate) fn initialize(&mut self, message: DoIpMessage) -> usize {
        match self.active {
            ReaderKind::Header => self.header.initialize(message),
            ReaderKind::NonDiagnostic => self.non_diagnostic.initialize(message),
            ReaderKind::PreDiagnostic => self.pre_diagnostic.initialize(message),
            ReaderKind::Diagnostic => self.diagnostic.initialize(message),
        }
    }

    /// Buffer the active reader wants filled
    pub(crate) fn buffer<'b>(&'b mut self, uds_message: &'b mut Option<UdsMessage>) -> &'b mut [u8] {
        match self.active {
            ReaderKind::Header => self.header.buffer(),
            ReaderKind::NonDiagnostic => self.non_diagnostic.buffer(),
            ReaderKind::PreDiagnostic => self.pre_diagnostic.buffer(),
            ReaderKind::Diagnostic => DiagnosticReader::buffer(uds_message),
        }
    }

    /// Evaluate the filled buffer and switch to the reader it selects
    pub(crate) fn evaluate<S: ChannelSocket>(
        &mut self,
        ctx: &mut ReaderContext<'_, '_, S>,
    ) -> ReaderAction {
        let (action, next) = match self.active {
            ReaderKind::Header => self.header.evaluate(ctx),
            ReaderKind::NonDiagnostic => self.non_diagnostic.evaluate(ctx),
            ReaderKind::PreDiagnostic => self.pre_diagnostic.evaluate(ctx),
            ReaderKind::Diagnostic => self.diagnostic.evaluate(ctx),
        };
        self.active = next;
        action
    }

    /// Abandon the message in flight and fall back to the header reader
    pub(crate) fn reset(&mut self) -> Option<DoIpMessage> {
        let message = match self.active {
            ReaderKind::Header => self.header.reset(),
            ReaderKind::NonDiagnostic => self.non_diagnostic.reset(),
            ReaderKind::PreDiagnostic => self.pre_diagnostic.reset(),
            ReaderKind::Diagnostic => self.diagnostic.reset(),
        };
        self.active = ReaderKind::Header;
        message
    }
}

/// Take the message out of a reader during evaluation
fn held_message(message: &mut Option<DoIpMessage>, reader: &str) -> DoIpMessage {
    match message.take() {
        Some(message) => message,
        None => panic!("{reader} reader evaluated without a message"),
    }
}
