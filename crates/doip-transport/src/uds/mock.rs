//! Mock transport protocol manager for testing

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::{
    Address, GlobalChannelId, HandlerId, IndicationResult, MetaInfo, TargetAddressType,
    TransmissionResult, UdsMessage, UdsTransportProtocolMgr,
};

/// Arguments of one `indicate_message` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Indication {
    pub source_address: Address,
    pub target_address: Address,
    pub target_address_type: TargetAddressType,
    pub global_channel_id: GlobalChannelId,
    pub size: usize,
}

/// Recording transport manager.
///
/// Allocates a buffer for every indication unless told otherwise, and keeps
/// every message it is handed so tests can assert on them.
pub struct MockTransportMgr {
    indication_result: Mutex<IndicationResult>,
    /// Withhold the message even when the result is `Ok`
    withhold_message: Mutex<bool>,
    /// Buffer size handed out instead of the indicated size
    allocation_size: Mutex<Option<usize>>,
    indications: Mutex<Vec<Indication>>,
    handled: Mutex<Vec<UdsMessage>>,
    failed: Mutex<Vec<UdsMessage>>,
    confirmations: Mutex<Vec<(UdsMessage, TransmissionResult)>>,
    reestablished: Mutex<Vec<GlobalChannelId>>,
    stopped: Mutex<Vec<HandlerId>>,
    handled_tx: broadcast::Sender<UdsMessage>,
}

impl MockTransportMgr {
    pub fn new() -> Self {
        let (handled_tx, _) = broadcast::channel(256);
        Self {
            indication_result: Mutex::new(IndicationResult::Ok),
            withhold_message: Mutex::new(false),
            allocation_size: Mutex::new(None),
            indications: Mutex::new(Vec::new()),
            handled: Mutex::new(Vec::new()),
            failed: Mutex::new(Vec::new()),
            confirmations: Mutex::new(Vec::new()),
            reestablished: Mutex::new(Vec::new()),
            stopped: Mutex::new(Vec::new()),
            handled_tx,
        }
    }

    /// Result returned by subsequent indications
    pub fn set_indication_result(&self, result: IndicationResult) {
        *self.indication_result.lock() = result;
    }

    /// Answer `Ok` but return no buffer
    pub fn set_withhold_message(&self, withhold: bool) {
        *self.withhold_message.lock() = withhold;
    }

    /// Allocate buffers of `size` bytes regardless of the indicated size
    pub fn set_allocation_size(&self, size: Option<usize>) {
        *self.allocation_size.lock() = size;
    }

    /// Receive every message passed to `handle_message`
    pub fn subscribe(&self) -> broadcast::Receiver<UdsMessage> {
        self.handled_tx.subscribe()
    }

    pub fn indications(&self) -> Vec<Indication> {
        self.indications.lock().clone()
    }

    pub fn handled(&self) -> Vec<UdsMessage> {
        self.handled.lock().clone()
    }

    pub fn failed(&self) -> Vec<UdsMessage> {
        self.failed.lock().clone()
    }

    pub fn confirmations(&self) -> Vec<(UdsMessage, TransmissionResult)> {
        self.confirmations.lock().clone()
    }

    pub fn reestablished(&self) -> Vec<GlobalChannelId> {
        self.reestablished.lock().clone()
    }

    pub fn stopped(&self) -> Vec<HandlerId> {
        self.stopped.lock().clone()
    }
}

impl Default for MockTransportMgr {
    fn default() -> Self {
        Self::new()
    }
}

impl UdsTransportProtocolMgr for MockTransportMgr {
    fn indicate_message(
        &self,
        source_address: Address,
        target_address: Address,
        target_address_type: TargetAddressType,
        global_channel_id: GlobalChannelId,
        size: usize,
        _meta_info: Option<Arc<MetaInfo>>,
    ) -> (IndicationResult, Option<UdsMessage>) {
        self.indications.lock().push(Indication {
            source_address,
            target_address,
            target_address_type,
            global_channel_id,
            size,
        });

        let result = *self.indication_result.lock();
        if result != IndicationResult::Ok || *self.withhold_message.lock() {
            return (result, None);
        }

        let allocated = self.allocation_size.lock().unwrap_or(size);
        let message = UdsMessage::with_capacity(
            source_address,
            target_address,
            target_address_type,
            global_channel_id,
            allocated,
        );
        (IndicationResult::Ok, Some(message))
    }

    fn notify_message_failure(&self, message: UdsMessage) {
        self.failed.lock().push(message);
    }

    fn handle_message(&self, message: UdsMessage) {
        self.handled.lock().push(message.clone());
        // No receivers is fine
        let _ = self.handled_tx.send(message);
    }

    fn transmit_confirmation(&self, message: UdsMessage, result: TransmissionResult) {
        self.confirmations.lock().push((message, result));
    }

    fn channel_reestablished(&self, global_channel_id: GlobalChannelId) {
        self.reestablished.lock().push(global_channel_id);
    }

    fn handler_stopped(&self, handler_id: HandlerId) {
        self.stopped.lock().push(handler_id);
    }
}
