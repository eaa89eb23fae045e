use tracing::debug;

use super::{held_message, ReaderAction, ReaderContext, ReaderKind};
use crate::channel::socket::ChannelSocket;
use crate::uds::UdsMessage;
use crate::wire::{DoIpMessage, SA_TA_LENGTH};

/// Reads the UDS payload straight into the buffer the transport manager
/// allocated for it.
#[derive(Debug, Default)]
pub(crate) struct DiagnosticReader {
    message: Option<DoIpMessage>,
}

impl DiagnosticReader {
    pub(crate) fn initialize(&mut self, message: DoIpMessage) -> usize {
        let length = (message.payload_length as usize).saturating_sub(SA_TA_LENGTH);
        self.message = Some(message);
        length
    }

    pub(crate) fn buffer(uds_message: &mut Option<UdsMessage>) -> &mut [u8] {
        match uds_message.as_mut() {
            Some(uds_message) => uds_message.payload_mut(),
            None => panic!("diagnostic reader active without an allocated UDS message"),
        }
    }

    pub(crate) fn evaluate<S: ChannelSocket>(
        &mut self,
        ctx: &mut ReaderContext<'_, '_, S>,
    ) -> (ReaderAction, ReaderKind) {
        let message = held_message(&mut self.message, "diagnostic");
        if let Some(uds_message) = ctx.uds_message.as_ref() {
            debug!(
                slot = ctx.slot,
                sa = uds_message.source_address(),
                ta = uds_message.target_address(),
                payload = %hex::encode(uds_message.payload()),
                "Diagnostic message read"
            );
        }
        *ctx.message = Some(message);
        (ReaderAction::finished(0), ReaderKind::Header)
    }

    pub(crate) fn reset(&mut self) -> Option<DoIpMessage> {
        self.message.take()
    }
}
