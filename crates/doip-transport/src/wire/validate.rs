use super::{DoIpMessage, NackCode, PayloadLength, PayloadType, ProtocolVersion};

/// Validate a received generic header.
///
/// `supported` returns the length rule of every payload type the receiver
/// handles; any other type is unknown. Checks run in order: version pattern,
/// payload type, maximum length, type-specific length.
pub fn check_header<F>(message: &DoIpMessage, max_message_length: u32, supported: F) -> NackCode
where
    F: Fn(PayloadType) -> Option<PayloadLength>,
{
    let pattern_ok = ProtocolVersion::try_from(message.protocol_version).is_ok()
        && message.inv_protocol_version == !message.protocol_version;
    if !pattern_ok {
        return NackCode::IncorrectPattern;
    }

    let Some(rule) = message.kind().and_then(&supported) else {
        return NackCode::UnknownPayloadType;
    };

    if message.payload_length > max_message_length {
        return NackCode::MessageTooLarge;
    }

    if !rule.accepts(message.payload_length) {
        return NackCode::InvalidPayloadLength;
    }

    NackCode::ValidHeader
}
