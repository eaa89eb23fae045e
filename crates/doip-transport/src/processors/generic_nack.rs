use tracing::warn;

use crate::channel::socket::ChannelSocket;
use crate::channel::DoIpChannel;
use crate::wire::DoIpMessage;

/// Generic negative acknowledge sent by the tester; logged only
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenericNackProcessor;

impl GenericNackProcessor {
    pub(crate) fn handle_message<S: ChannelSocket>(
        &self,
        message: &DoIpMessage,
        channel: &mut DoIpChannel<S>,
    ) {
        warn!(
            slot = channel.slot(),
            nack_code = message.payload[0],
            "Tester rejected a message"
        );
    }
}
