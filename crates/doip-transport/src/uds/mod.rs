//! UDS transport collaborators
//!
//! The channel engine never interprets UDS payloads. It asks the transport
//! protocol manager for a message buffer once a diagnostic message's addresses
//! are known, fills it, and hands ownership back. Outbound messages travel the
//! opposite way and are confirmed through [`UdsTransportProtocolMgr::transmit_confirmation`].

pub mod mock;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::wire::FUNCTIONAL_ADDRESS_RANGE;

/// 16-bit diagnostic logical address
pub type Address = u16;

/// Channel identifier; equals the negotiated source address once routing is active
pub type ChannelId = u32;

/// Identifier of a transport handler instance towards the manager
pub type HandlerId = u8;

/// Channel id of a channel without routing activation
pub const UNREGISTERED_CHANNEL_ID: ChannelId = 0xFFFF_FFFF;

/// Maximum number of meta-info maps a message carries
pub const MAX_META_INFO: usize = 3;

/// Opaque key/value information attached to a message by upper layers
pub type MetaInfo = HashMap<String, String>;

/// Handler plus channel, unique across all transport handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalChannelId {
    pub handler_id: HandlerId,
    pub channel_id: ChannelId,
}

impl fmt::Display for GlobalChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:0x{:04X}", self.handler_id, self.channel_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetAddressType {
    /// Single ECU
    Physical,
    /// Group of ECUs
    Functional,
}

impl TargetAddressType {
    pub fn from_target_address(target_address: Address) -> Self {
        if FUNCTIONAL_ADDRESS_RANGE.contains(&target_address) {
            Self::Functional
        } else {
            Self::Physical
        }
    }
}

/// Outcome of asking the manager for a message buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicationResult {
    Ok,
    /// Manager cannot accept another message right now
    Busy,
    /// Message exceeds what the manager can buffer
    Overflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmissionResult {
    TransmitOk,
    TransmitFailed,
}

/// A UDS message owned by the transport protocol manager
#[derive(Debug, Clone, PartialEq)]
pub struct UdsMessage {
    source_address: Address,
    target_address: Address,
    target_address_type: TargetAddressType,
    global_channel_id: GlobalChannelId,
    payload: Vec<u8>,
    meta_info: Vec<Arc<MetaInfo>>,
}

impl UdsMessage {
    pub fn new(
        source_address: Address,
        target_address: Address,
        target_address_type: TargetAddressType,
        global_channel_id: GlobalChannelId,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            source_address,
            target_address,
            target_address_type,
            global_channel_id,
            payload,
            meta_info: Vec::new(),
        }
    }

    /// Message with a zeroed payload of `size` bytes, ready to be filled
    pub fn with_capacity(
        source_address: Address,
        target_address: Address,
        target_address_type: TargetAddressType,
        global_channel_id: GlobalChannelId,
        size: usize,
    ) -> Self {
        Self::new(
            source_address,
            target_address,
            target_address_type,
            global_channel_id,
            vec![0; size],
        )
    }

    pub fn source_address(&self) -> Address {
        self.source_address
    }

    pub fn target_address(&self) -> Address {
        self.target_address
    }

    pub fn target_address_type(&self) -> TargetAddressType {
        self.target_address_type
    }

    pub fn global_channel_id(&self) -> GlobalChannelId {
        self.global_channel_id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.payload
    }

    pub fn meta_info(&self) -> &[Arc<MetaInfo>] {
        &self.meta_info
    }

    /// Attach meta info; returns false once [`MAX_META_INFO`] maps are attached
    pub fn add_meta_info(&mut self, meta_info: Arc<MetaInfo>) -> bool {
        if self.meta_info.len() >= MAX_META_INFO {
            return false;
        }
        self.meta_info.push(meta_info);
        true
    }
}

/// Transport protocol manager consuming and producing UDS messages
pub trait UdsTransportProtocolMgr: Send + Sync {
    /// Ask for a buffer of `size` payload bytes for an incoming message.
    ///
    /// Returning `Ok` without a message is treated like `Busy`.
    fn indicate_message(
        &self,
        source_address: Address,
        target_address: Address,
        target_address_type: TargetAddressType,
        global_channel_id: GlobalChannelId,
        size: usize,
        meta_info: Option<Arc<MetaInfo>>,
    ) -> (IndicationResult, Option<UdsMessage>);

    /// Reception of a previously indicated message was aborted
    fn notify_message_failure(&self, message: UdsMessage);

    /// A complete message was received
    fn handle_message(&self, message: UdsMessage);

    /// Result of an outbound transmission
    fn transmit_confirmation(&self, message: UdsMessage, result: TransmissionResult);

    /// A tester re-established routing on an existing channel
    fn channel_reestablished(&self, _global_channel_id: GlobalChannelId) {}

    /// The transport handler stopped and will not deliver further messages
    fn handler_stopped(&self, _handler_id: HandlerId) {}
}
