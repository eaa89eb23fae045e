//! Payload-type specific handlers for completely read messages
//!
//! Only payload types with a processor are accepted over TCP; headers of
//! every other type are answered with `UnknownPayloadType`.

mod alive_check;
mod diagnostic;
mod generic_nack;
mod routing_activation;

use std::collections::HashMap;

pub use alive_check::AliveCheckProcessor;
pub use diagnostic::{DiagnosticMessageProcessor, DiagnosticPreprocessResult};
pub use generic_nack::GenericNackProcessor;
pub use routing_activation::RoutingActivationProcessor;

use crate::channel::socket::ChannelSocket;
use crate::channel::{ChannelEnv, DoIpChannel};
use crate::wire::{check_header, DoIpMessage, NackCode, PayloadLength, PayloadType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageProcessor {
    RoutingActivation(RoutingActivationProcessor),
    AliveCheck(AliveCheckProcessor),
    Diagnostic(DiagnosticMessageProcessor),
    GenericNack(GenericNackProcessor),
}

impl MessageProcessor {
    pub fn payload_type(&self) -> PayloadType {
        match self {
            Self::RoutingActivation(_) => PayloadType::RoutingActivationRequest,
            Self::AliveCheck(_) => PayloadType::AliveCheckResponse,
            Self::Diagnostic(_) => PayloadType::DiagnosticMessage,
            Self::GenericNack(_) => PayloadType::GenericNegativeAcknowledge,
        }
    }

    pub fn payload_length_rule(&self) -> PayloadLength {
        self.payload_type().payload_length_rule()
    }

    pub fn is_valid_payload_length(&self, length: u32) -> bool {
        self.payload_length_rule().accepts(length)
    }

    pub(crate) fn handle_message<S: ChannelSocket>(
        &self,
        message: &DoIpMessage,
        channel: &mut DoIpChannel<S>,
        env: &ChannelEnv<'_, S>,
    ) {
        match self {
            Self::RoutingActivation(p) => p.handle_message(message, channel, env),
            Self::AliveCheck(p) => p.handle_message(message, channel),
            Self::Diagnostic(p) => p.handle_message(channel, env),
            Self::GenericNack(p) => p.handle_message(message, channel),
        }
    }
}

/// Processors keyed by the payload type they handle
#[derive(Debug, Clone)]
pub struct ProcessorTable {
    processors: HashMap<PayloadType, MessageProcessor>,
}

impl ProcessorTable {
    /// The processors of a TCP data channel
    pub fn tcp() -> Self {
        let processors = [
            MessageProcessor::AliveCheck(AliveCheckProcessor),
            MessageProcessor::Diagnostic(DiagnosticMessageProcessor),
            MessageProcessor::RoutingActivation(RoutingActivationProcessor),
            MessageProcessor::GenericNack(GenericNackProcessor),
        ]
        .into_iter()
        .map(|p| (p.payload_type(), p))
        .collect();
        Self { processors }
    }

    pub fn get(&self, payload_type: PayloadType) -> Option<&MessageProcessor> {
        self.processors.get(&payload_type)
    }

    pub fn is_supported(&self, payload_type: PayloadType) -> bool {
        self.processors.contains_key(&payload_type)
    }

    /// Validate a generic header against the supported payload types
    pub fn check_header(&self, message: &DoIpMessage, max_message_length: u32) -> NackCode {
        check_header(message, max_message_length, |payload_type| {
            self.get(payload_type).map(MessageProcessor::payload_length_rule)
        })
    }
}

impl Default for ProcessorTable {
    fn default() -> Self {
        Self::tcp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcp_table_contents() {
        let table = ProcessorTable::tcp();
        assert!(table.is_supported(PayloadType::RoutingActivationRequest));
        assert!(table.is_supported(PayloadType::AliveCheckResponse));
        assert!(table.is_supported(PayloadType::DiagnosticMessage));
        assert!(table.is_supported(PayloadType::GenericNegativeAcknowledge));
        assert!(!table.is_supported(PayloadType::AliveCheckRequest));
        assert!(!table.is_supported(PayloadType::VehicleIdentificationRequest));
        assert!(!table.is_supported(PayloadType::EntityStatusRequest));
    }

    #[test]
    fn test_processor_length_rules() {
        let table = ProcessorTable::tcp();
        let routing = table.get(PayloadType::RoutingActivationRequest).unwrap();
        assert!(routing.is_valid_payload_length(7));
        assert!(routing.is_valid_payload_length(11));
        assert!(!routing.is_valid_payload_length(9));

        let alive = table.get(PayloadType::AliveCheckResponse).unwrap();
        assert!(alive.is_valid_payload_length(2));
        assert!(!alive.is_valid_payload_length(3));
    }

    #[test]
    fn test_entity_status_request_is_unknown_over_tcp() {
        let table = ProcessorTable::tcp();
        let message = DoIpMessage {
            protocol_version: 0x02,
            inv_protocol_version: 0xFD,
            payload_type: PayloadType::EntityStatusRequest.code(),
            payload_length: 0,
            payload: Vec::new(),
        };
        assert_eq!(table.check_header(&message, 4096), NackCode::UnknownPayloadType);
    }
}
