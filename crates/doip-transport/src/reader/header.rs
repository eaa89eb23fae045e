use tracing::{debug, warn};

use super::{held_message, ReaderAction, ReaderContext, ReaderKind};
use crate::channel::socket::ChannelSocket;
use crate::wire::{DoIpMessage, NackCode, PayloadType, HEADER_LENGTH};

/// Reads and validates the 8-byte generic header
#[derive(Debug, Default)]
pub(crate) struct HeaderReader {
    buffer: [u8; HEADER_LENGTH],
    message: Option<DoIpMessage>,
}

impl HeaderReader {
    pub(crate) fn initialize(&mut self, mut message: DoIpMessage) -> usize {
        message.clear();
        self.message = Some(message);
        HEADER_LENGTH
    }

    pub(crate) fn buffer(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    pub(crate) fn evaluate<S: ChannelSocket>(
        &mut self,
        ctx: &mut ReaderContext<'_, '_, S>,
    ) -> (ReaderAction, ReaderKind) {
        let mut message = held_message(&mut self.message, "header");
        message.fill_header(&self.buffer);

        let nack_code = ctx.env.check_header(&message);
        let outcome = if nack_code != NackCode::ValidHeader {
            warn!(
                slot = ctx.slot,
                ?nack_code,
                payload_type = message.payload_type,
                payload_length = message.payload_length,
                "Rejecting DoIP header"
            );
            ctx.sender.send(&DoIpMessage::generic_nack(nack_code));
            let discard = message.payload_length as usize;
            let action = if nack_code.closes_socket() {
                ReaderAction::close_socket(discard)
            } else {
                ReaderAction::finished(discard)
            };
            (action, ReaderKind::Header)
        } else if message.kind() == Some(PayloadType::DiagnosticMessage) {
            (ReaderAction::continue_reading(), ReaderKind::PreDiagnostic)
        } else {
            (ReaderAction::continue_reading(), ReaderKind::NonDiagnostic)
        };

        debug!(
            slot = ctx.slot,
            payload_type = message.payload_type,
            payload_length = message.payload_length,
            next = ?outcome.1,
            "Header read"
        );
        *ctx.message = Some(message);
        outcome
    }

    pub(crate) fn reset(&mut self) -> Option<DoIpMessage> {
        self.message.take()
    }
}
