use super::{held_message, ReaderAction, ReaderContext, ReaderKind};
use crate::channel::socket::ChannelSocket;
use crate::processors::{DiagnosticMessageProcessor, DiagnosticPreprocessResult};
use crate::wire::{DoIpMessage, SA_TA_LENGTH};

/// Reads source and target address of a diagnostic message and decides
/// whether its UDS payload is read or discarded.
#[derive(Debug, Default)]
pub(crate) struct PreDiagnosticReader {
    buffer: [u8; SA_TA_LENGTH],
    message: Option<DoIpMessage>,
}

impl PreDiagnosticReader {
    pub(crate) fn initialize(&mut self, message: DoIpMessage) -> usize {
        self.message = Some(message);
        SA_TA_LENGTH
    }

    pub(crate) fn buffer(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    pub(crate) fn evaluate<S: ChannelSocket>(
        &mut self,
        ctx: &mut ReaderContext<'_, '_, S>,
    ) -> (ReaderAction, ReaderKind) {
        let mut message = held_message(&mut self.message, "pre-diagnostic");
        message.payload.clear();
        message.payload.extend_from_slice(&self.buffer);

        let remaining = (message.payload_length as usize).saturating_sub(SA_TA_LENGTH);
        let outcome = match DiagnosticMessageProcessor::preprocess(&message, ctx) {
            DiagnosticPreprocessResult::Proceed => {
                (ReaderAction::continue_reading(), ReaderKind::Diagnostic)
            }
            DiagnosticPreprocessResult::Discard => {
                (ReaderAction::finished(remaining), ReaderKind::Header)
            }
            DiagnosticPreprocessResult::CloseSocket => {
                (ReaderAction::close_socket(remaining), ReaderKind::Header)
            }
        };
        *ctx.message = Some(message);
        outcome
    }

    pub(crate) fn reset(&mut self) -> Option<DoIpMessage> {
        self.message.take()
    }
}
