use super::{held_message, ReaderAction, ReaderContext, ReaderKind};
use crate::channel::socket::ChannelSocket;
use crate::wire::{DoIpMessage, MAX_NON_DIAGNOSTIC_PAYLOAD_LENGTH};

/// Reads the payload of every message except diagnostic messages.
///
/// At most [`MAX_NON_DIAGNOSTIC_PAYLOAD_LENGTH`] bytes are kept; anything
/// beyond is discarded from the stream.
#[derive(Debug, Default)]
pub(crate) struct NonDiagnosticReader {
    message: Option<DoIpMessage>,
}

impl NonDiagnosticReader {
    pub(crate) fn initialize(&mut self, mut message: DoIpMessage) -> usize {
        let length = (message.payload_length as usize).min(MAX_NON_DIAGNOSTIC_PAYLOAD_LENGTH);
        message.payload.clear();
        message.payload.resize(length, 0);
        self.message = Some(message);
        length
    }

    pub(crate) fn buffer(&mut self) -> &mut [u8] {
        match self.message.as_mut() {
            Some(message) => &mut message.payload,
            None => &mut [],
        }
    }

    pub(crate) fn evaluate<S: ChannelSocket>(
        &mut self,
        ctx: &mut ReaderContext<'_, '_, S>,
    ) -> (ReaderAction, ReaderKind) {
        let message = held_message(&mut self.message, "non-diagnostic");
        let excess = (message.payload_length as usize).saturating_sub(message.payload.len());
        *ctx.message = Some(message);
        (ReaderAction::finished(excess), ReaderKind::Header)
    }

    pub(crate) fn reset(&mut self) -> Option<DoIpMessage> {
        self.message.take()
    }
}
