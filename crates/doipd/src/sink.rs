//! Transport manager that only logs what the channel engine hands it

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use doip_transport::uds::{Address, HandlerId, MetaInfo};
use doip_transport::{
    GlobalChannelId, IndicationResult, TargetAddressType, TransmissionResult, UdsMessage,
    UdsTransportProtocolMgr,
};
use tracing::{debug, info, warn};

/// Accepts every diagnostic message and logs it. Never answers.
#[derive(Debug, Default)]
pub struct LoggingUdsSink {
    received: AtomicU64,
}

impl LoggingUdsSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completely received UDS messages
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}

impl UdsTransportProtocolMgr for LoggingUdsSink {
    fn indicate_message(
        &self,
        source_address: Address,
        target_address: Address,
        target_address_type: TargetAddressType,
        global_channel_id: GlobalChannelId,
        size: usize,
        _meta_info: Option<Arc<MetaInfo>>,
    ) -> (IndicationResult, Option<UdsMessage>) {
        debug!(
            sa = format_args!("0x{source_address:04X}"),
            ta = format_args!("0x{target_address:04X}"),
            ?target_address_type,
            %global_channel_id,
            size,
            "Incoming UDS message"
        );
        let message = UdsMessage::with_capacity(
            source_address,
            target_address,
            target_address_type,
            global_channel_id,
            size,
        );
        (IndicationResult::Ok, Some(message))
    }

    fn notify_message_failure(&self, message: UdsMessage) {
        warn!(
            sa = format_args!("0x{:04X}", message.source_address()),
            channel = %message.global_channel_id(),
            "UDS message reception aborted"
        );
    }

    fn handle_message(&self, message: UdsMessage) {
        let count = self.received.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            sa = format_args!("0x{:04X}", message.source_address()),
            ta = format_args!("0x{:04X}", message.target_address()),
            channel = %message.global_channel_id(),
            payload = %hex::encode(message.payload()),
            count,
            "UDS request"
        );
    }

    fn transmit_confirmation(&self, message: UdsMessage, result: TransmissionResult) {
        debug!(channel = %message.global_channel_id(), ?result, "Transmit confirmation");
    }

    fn channel_reestablished(&self, global_channel_id: GlobalChannelId) {
        info!(channel = %global_channel_id, "Routing re-activated");
    }

    fn handler_stopped(&self, handler_id: HandlerId) {
        info!(handler_id, "Handler stopped");
    }
}
