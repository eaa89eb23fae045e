use tracing::{debug, warn};

use crate::channel::socket::ChannelSocket;
use crate::channel::state::ChannelState;
use crate::channel::{ChannelEnv, DoIpChannel};
use crate::reader::ReaderContext;
use crate::uds::{GlobalChannelId, IndicationResult, TargetAddressType};
use crate::wire::{DiagnosticMessageResponseCode, DoIpMessage, SA_TA_LENGTH};

/// Verdict on a diagnostic message once its addresses are known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticPreprocessResult {
    /// Read the UDS payload into the allocated message
    Proceed,
    /// Drain the UDS payload
    Discard,
    /// Close the connection
    CloseSocket,
}

/// Diagnostic message: UDS payload hand-off to the transport manager
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnosticMessageProcessor;

impl DiagnosticMessageProcessor {
    /// Check SA and TA of a diagnostic message and ask the transport manager
    /// for a buffer. Negative acknowledges are sent from here.
    pub(crate) fn preprocess<S: ChannelSocket>(
        message: &DoIpMessage,
        ctx: &mut ReaderContext<'_, '_, S>,
    ) -> DiagnosticPreprocessResult {
        let payload = &message.payload;
        let source_address = u16::from_be_bytes([payload[0], payload[1]]);
        let target_address = u16::from_be_bytes([payload[2], payload[3]]);

        if ctx.state != ChannelState::RegisteredRoutingActive {
            debug!(slot = ctx.slot, state = %ctx.state, "Diagnostic message without routing activation");
            return DiagnosticPreprocessResult::Discard;
        }

        let target_address_type = TargetAddressType::from_target_address(target_address);
        let (response_code, result) = if source_address != ctx.source_address {
            (
                DiagnosticMessageResponseCode::InvalidSa,
                DiagnosticPreprocessResult::CloseSocket,
            )
        } else if target_address_type == TargetAddressType::Physical
            && !ctx.env.config.is_known_target_address(target_address)
        {
            (
                DiagnosticMessageResponseCode::UnknownTa,
                DiagnosticPreprocessResult::Discard,
            )
        } else {
            match Self::request_uds_message(message, ctx, target_address, target_address_type) {
                Ok(()) => return DiagnosticPreprocessResult::Proceed,
                Err(code) => (code, DiagnosticPreprocessResult::Discard),
            }
        };

        warn!(
            slot = ctx.slot,
            sa = source_address,
            ta = target_address,
            %response_code,
            "Diagnostic message rejected"
        );
        ctx.sender.send(&DoIpMessage::diagnostic_response(
            target_address,
            source_address,
            response_code,
        ));
        result
    }

    /// Ask the transport manager for a buffer for the UDS payload
    fn request_uds_message<S: ChannelSocket>(
        message: &DoIpMessage,
        ctx: &mut ReaderContext<'_, '_, S>,
        target_address: u16,
        target_address_type: TargetAddressType,
    ) -> Result<(), DiagnosticMessageResponseCode> {
        let size = (message.payload_length as usize).saturating_sub(SA_TA_LENGTH);
        let global_channel_id = GlobalChannelId {
            handler_id: ctx.env.handler_id,
            channel_id: ctx.channel_id,
        };
        let (result, uds_message) = ctx.env.mgr.indicate_message(
            ctx.source_address,
            target_address,
            target_address_type,
            global_channel_id,
            size,
            None,
        );

        match uds_message {
            Some(uds_message) if uds_message.payload().len() == size => {
                *ctx.uds_message = Some(uds_message);
                Ok(())
            }
            Some(uds_message) => {
                warn!(
                    slot = ctx.slot,
                    expected = size,
                    allocated = uds_message.payload().len(),
                    "Transport manager allocated a buffer of the wrong size"
                );
                ctx.env.mgr.notify_message_failure(uds_message);
                Err(DiagnosticMessageResponseCode::OutOfMemory)
            }
            None if result == IndicationResult::Overflow => {
                Err(DiagnosticMessageResponseCode::MessageTooLarge)
            }
            None => Err(DiagnosticMessageResponseCode::OutOfMemory),
        }
    }

    /// Acknowledge a completely read diagnostic message and pass it on
    pub(crate) fn handle_message<S: ChannelSocket>(
        &self,
        channel: &mut DoIpChannel<S>,
        env: &ChannelEnv<'_, S>,
    ) {
        let uds_message = match channel.release_uds_message() {
            Some(uds_message) => uds_message,
            None => panic!(
                "channel {} completed a diagnostic message without a UDS message",
                channel.slot()
            ),
        };
        channel.send_response(&DoIpMessage::diagnostic_response(
            uds_message.target_address(),
            uds_message.source_address(),
            DiagnosticMessageResponseCode::ConfirmationAck,
        ));
        env.mgr.handle_message(uds_message);
    }
}
