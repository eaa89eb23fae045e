//! Generic header field values: protocol versions, payload types and NACK codes

use std::fmt;

/// DoIP protocol version carried in the first header byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProtocolVersion {
    /// ISO/DIS 13400-2:2010
    Iso13400_2010 = 0x01,
    /// ISO 13400-2:2012
    Iso13400_2012 = 0x02,
}

impl ProtocolVersion {
    /// Version used for every frame this entity emits
    pub const RESPONSE: ProtocolVersion = ProtocolVersion::Iso13400_2012;

    /// Bitwise inversion, as carried in the second header byte
    pub const fn inverse(self) -> u8 {
        !(self as u8)
    }
}

impl TryFrom<u8> for ProtocolVersion {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Iso13400_2010),
            0x02 => Ok(Self::Iso13400_2012),
            other => Err(other),
        }
    }
}

/// DoIP payload types (ISO 13400-2 table 17)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum PayloadType {
    // Node management (0x0XXX)
    GenericNegativeAcknowledge = 0x0000,
    VehicleIdentificationRequest = 0x0001,
    VehicleIdentificationRequestWithEid = 0x0002,
    VehicleIdentificationRequestWithVin = 0x0003,
    VehicleAnnouncementMessage = 0x0004,
    RoutingActivationRequest = 0x0005,
    RoutingActivationResponse = 0x0006,
    AliveCheckRequest = 0x0007,
    AliveCheckResponse = 0x0008,

    // Vehicle information (0x4XXX)
    EntityStatusRequest = 0x4001,
    EntityStatusResponse = 0x4002,
    DiagnosticPowerModeInfoRequest = 0x4003,
    DiagnosticPowerModeInfoResponse = 0x4004,

    // Diagnostic (0x8XXX)
    DiagnosticMessage = 0x8001,
    DiagnosticMessagePositiveAck = 0x8002,
    DiagnosticMessageNegativeAck = 0x8003,
}

impl PayloadType {
    /// Raw on-wire value
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Payload length the type must announce in the generic header
    pub const fn payload_length_rule(self) -> PayloadLength {
        match self {
            Self::GenericNegativeAcknowledge => PayloadLength::Exact(1),
            Self::VehicleIdentificationRequest => PayloadLength::Exact(0),
            Self::VehicleIdentificationRequestWithEid => PayloadLength::Exact(6),
            Self::VehicleIdentificationRequestWithVin => PayloadLength::Exact(17),
            // optional VIN/GID sync status
            Self::VehicleAnnouncementMessage => PayloadLength::OneOf(32, 33),
            // optional OEM specific part
            Self::RoutingActivationRequest => PayloadLength::OneOf(7, 11),
            Self::RoutingActivationResponse => PayloadLength::OneOf(9, 13),
            Self::AliveCheckRequest => PayloadLength::Exact(0),
            Self::AliveCheckResponse => PayloadLength::Exact(2),
            Self::EntityStatusRequest => PayloadLength::Exact(0),
            Self::EntityStatusResponse => PayloadLength::OneOf(3, 7),
            Self::DiagnosticPowerModeInfoRequest => PayloadLength::Exact(0),
            Self::DiagnosticPowerModeInfoResponse => PayloadLength::Exact(1),
            Self::DiagnosticMessage
            | Self::DiagnosticMessagePositiveAck
            | Self::DiagnosticMessageNegativeAck => PayloadLength::AtLeast(5),
        }
    }
}

impl TryFrom<u16> for PayloadType {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x0000 => Ok(Self::GenericNegativeAcknowledge),
            0x0001 => Ok(Self::VehicleIdentificationRequest),
            0x0002 => Ok(Self::VehicleIdentificationRequestWithEid),
            0x0003 => Ok(Self::VehicleIdentificationRequestWithVin),
            0x0004 => Ok(Self::VehicleAnnouncementMessage),
            0x0005 => Ok(Self::RoutingActivationRequest),
            0x0006 => Ok(Self::RoutingActivationResponse),
            0x0007 => Ok(Self::AliveCheckRequest),
            0x0008 => Ok(Self::AliveCheckResponse),
            0x4001 => Ok(Self::EntityStatusRequest),
            0x4002 => Ok(Self::EntityStatusResponse),
            0x4003 => Ok(Self::DiagnosticPowerModeInfoRequest),
            0x4004 => Ok(Self::DiagnosticPowerModeInfoResponse),
            0x8001 => Ok(Self::DiagnosticMessage),
            0x8002 => Ok(Self::DiagnosticMessagePositiveAck),
            0x8003 => Ok(Self::DiagnosticMessageNegativeAck),
            other => Err(other),
        }
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}(0x{:04X})", self, self.code())
    }
}

/// Payload length constraint of a payload type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadLength {
    /// Exactly this many bytes
    Exact(u32),
    /// Mandatory part, or mandatory plus optional part
    OneOf(u32, u32),
    /// Variable length with a lower bound
    AtLeast(u32),
}

impl PayloadLength {
    /// Whether `length` satisfies the constraint
    pub const fn accepts(self, length: u32) -> bool {
        match self {
            Self::Exact(n) => length == n,
            Self::OneOf(a, b) => length == a || length == b,
            Self::AtLeast(n) => length >= n,
        }
    }

    /// Smallest length the constraint accepts
    pub const fn minimum(self) -> u32 {
        match self {
            Self::Exact(n) | Self::AtLeast(n) => n,
            Self::OneOf(a, b) => {
                if a < b {
                    a
                } else {
                    b
                }
            }
        }
    }
}

/// Generic header negative acknowledge codes (ISO 13400-2 table 19)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NackCode {
    IncorrectPattern = 0x00,
    UnknownPayloadType = 0x01,
    MessageTooLarge = 0x02,
    OutOfMemory = 0x03,
    InvalidPayloadLength = 0x04,
    /// Not sent on the wire: header validation passed
    ValidHeader = 0xFF,
}

impl NackCode {
    /// Header errors after which the stream cannot be resynchronised
    pub const fn closes_socket(self) -> bool {
        matches!(self, Self::IncorrectPattern | Self::InvalidPayloadLength)
    }
}

impl From<NackCode> for u8 {
    fn from(code: NackCode) -> Self {
        code as u8
    }
}
