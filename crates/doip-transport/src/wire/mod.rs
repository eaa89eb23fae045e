//! DoIP wire format
//!
//! Generic header (8 bytes, big-endian):
//!
//! ```text
//! +---------+-------------+--------------+----------------+
//! | version | inv version | payload type | payload length |
//! |   u8    |     u8      |     u16      |      u32       |
//! +---------+-------------+--------------+----------------+
//! ```

mod codes;
mod message;
mod payload;
mod validate;

pub use codes::{DiagnosticMessageResponseCode, RoutingActivationResponseCode};
pub use message::{encode_header, DoIpMessage};
pub use payload::{NackCode, PayloadLength, PayloadType, ProtocolVersion};
pub use validate::check_header;

/// Generic header length
pub const HEADER_LENGTH: usize = 8;

/// Source plus target address at the start of a diagnostic message payload
pub const SA_TA_LENGTH: usize = 4;

/// Largest payload a non-diagnostic message can carry
pub const MAX_NON_DIAGNOSTIC_PAYLOAD_LENGTH: usize = 33;

/// Upper bound of bytes drained from the socket per discard step
pub const DISCARD_CHUNK_SIZE: usize = 1024;

pub const ROUTING_ACTIVATION_RESPONSE_PAYLOAD_LENGTH: usize = 9;

pub const DIAGNOSTIC_RESPONSE_PAYLOAD_LENGTH: usize = 5;

/// Functional (group) target addresses
pub const FUNCTIONAL_ADDRESS_RANGE: std::ops::RangeInclusive<u16> = 0xE400..=0xEFFF;

/// Source address of a channel without routing activation
pub const UNREGISTERED_SOURCE_ADDRESS: u16 = 0x0000;
