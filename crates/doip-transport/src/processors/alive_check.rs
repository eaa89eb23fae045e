use tracing::{debug, warn};

use crate::channel::socket::ChannelSocket;
use crate::channel::DoIpChannel;
use crate::wire::DoIpMessage;

/// Alive check response from the tester
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AliveCheckProcessor;

impl AliveCheckProcessor {
    pub(crate) fn handle_message<S: ChannelSocket>(
        &self,
        message: &DoIpMessage,
        channel: &mut DoIpChannel<S>,
    ) {
        let source_address = u16::from_be_bytes([message.payload[0], message.payload[1]]);
        if source_address == channel.source_address() {
            debug!(slot = channel.slot(), sa = source_address, "Alive check response");
        } else {
            warn!(
                slot = channel.slot(),
                sa = source_address,
                registered_sa = channel.source_address(),
                "Alive check response from unexpected source address"
            );
        }
    }
}
