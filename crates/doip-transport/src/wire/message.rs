//! In-flight DoIP message buffer and outbound frame builders

use bytes::{BufMut, BytesMut};

use super::{
    DiagnosticMessageResponseCode, NackCode, PayloadType, ProtocolVersion,
    RoutingActivationResponseCode, DIAGNOSTIC_RESPONSE_PAYLOAD_LENGTH, HEADER_LENGTH,
    ROUTING_ACTIVATION_RESPONSE_PAYLOAD_LENGTH,
};

/// A DoIP message: generic header fields plus payload bytes.
///
/// The payload type is kept raw so that headers carrying an unknown type can
/// still be represented and answered with a NACK.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DoIpMessage {
    pub protocol_version: u8,
    pub inv_protocol_version: u8,
    pub payload_type: u16,
    pub payload_length: u32,
    pub payload: Vec<u8>,
}

impl DoIpMessage {
    /// Create an outbound message with the response protocol version
    pub fn new(payload_type: PayloadType, payload: Vec<u8>) -> Self {
        let version = ProtocolVersion::RESPONSE;
        Self {
            protocol_version: version as u8,
            inv_protocol_version: version.inverse(),
            payload_type: payload_type.code(),
            payload_length: payload.len() as u32,
            payload,
        }
    }

    /// Known payload type, if any
    pub fn kind(&self) -> Option<PayloadType> {
        PayloadType::try_from(self.payload_type).ok()
    }

    /// Populate the header fields from a received generic header
    pub fn fill_header(&mut self, header: &[u8; HEADER_LENGTH]) {
        self.protocol_version = header[0];
        self.inv_protocol_version = header[1];
        self.payload_type = u16::from_be_bytes([header[2], header[3]]);
        self.payload_length = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    }

    /// Forget header and payload so the buffer can frame the next message
    pub fn clear(&mut self) {
        self.protocol_version = 0;
        self.inv_protocol_version = 0;
        self.payload_type = 0;
        self.payload_length = 0;
        self.payload.clear();
    }

    /// Encode the generic header
    pub fn header_bytes(&self) -> [u8; HEADER_LENGTH] {
        encode_header(
            self.protocol_version,
            self.inv_protocol_version,
            self.payload_type,
            self.payload_length,
        )
    }

    /// Encode header and payload into one contiguous frame
    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(HEADER_LENGTH + self.payload.len());
        buf.put_slice(&self.header_bytes());
        buf.put_slice(&self.payload);
        buf
    }

    /// Generic negative acknowledge carrying a single NACK code
    pub fn generic_nack(code: NackCode) -> Self {
        Self::new(PayloadType::GenericNegativeAcknowledge, vec![code.into()])
    }

    /// Routing activation response.
    ///
    /// Layout: tester SA, entity TA, response code, four reserved bytes.
    pub fn routing_activation_response(
        tester_address: u16,
        entity_address: u16,
        code: RoutingActivationResponseCode,
    ) -> Self {
        let mut payload = Vec::with_capacity(ROUTING_ACTIVATION_RESPONSE_PAYLOAD_LENGTH);
        payload.put_u16(tester_address);
        payload.put_u16(entity_address);
        payload.put_u8(code as u8);
        payload.put_u32(0);
        Self::new(PayloadType::RoutingActivationResponse, payload)
    }

    /// Diagnostic message positive or negative acknowledge.
    ///
    /// `target_address` is the target of the acknowledged request, so it is
    /// echoed first, followed by the tester's `source_address`.
    pub fn diagnostic_response(
        target_address: u16,
        source_address: u16,
        code: DiagnosticMessageResponseCode,
    ) -> Self {
        let payload_type = if code.is_positive() {
            PayloadType::DiagnosticMessagePositiveAck
        } else {
            PayloadType::DiagnosticMessageNegativeAck
        };
        let mut payload = Vec::with_capacity(DIAGNOSTIC_RESPONSE_PAYLOAD_LENGTH);
        payload.put_u16(target_address);
        payload.put_u16(source_address);
        payload.put_u8(code as u8);
        Self::new(payload_type, payload)
    }
}

/// Encode a generic header from its raw fields
pub fn encode_header(
    protocol_version: u8,
    inv_protocol_version: u8,
    payload_type: u16,
    payload_length: u32,
) -> [u8; HEADER_LENGTH] {
    let mut header = [0u8; HEADER_LENGTH];
    header[0] = protocol_version;
    header[1] = inv_protocol_version;
    header[2..4].copy_from_slice(&payload_type.to_be_bytes());
    header[4..8].copy_from_slice(&payload_length.to_be_bytes());
    header
}
