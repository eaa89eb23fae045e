//! Response codes of the routing activation and diagnostic message acknowledgements

use std::fmt;

/// Routing activation response codes (ISO 13400-2 table 25)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RoutingActivationResponseCode {
    UnknownSa = 0x00,
    NoAvailableSocket = 0x01,
    DifferentSa = 0x02,
    RegisteredSa = 0x03,
    MissingAuthentication = 0x04,
    RejectedConfirmation = 0x05,
    UnsupportedActivationType = 0x06,
    SuccessfullyActivated = 0x10,
    ConfirmationRequired = 0x11,
}

impl RoutingActivationResponseCode {
    /// Whether the tester may send diagnostic messages after this response
    pub const fn is_success(self) -> bool {
        matches!(self, Self::SuccessfullyActivated | Self::ConfirmationRequired)
    }
}

impl TryFrom<u8> for RoutingActivationResponseCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::UnknownSa),
            0x01 => Ok(Self::NoAvailableSocket),
            0x02 => Ok(Self::DifferentSa),
            0x03 => Ok(Self::RegisteredSa),
            0x04 => Ok(Self::MissingAuthentication),
            0x05 => Ok(Self::RejectedConfirmation),
            0x06 => Ok(Self::UnsupportedActivationType),
            0x10 => Ok(Self::SuccessfullyActivated),
            0x11 => Ok(Self::ConfirmationRequired),
            other => Err(other),
        }
    }
}

impl fmt::Display for RoutingActivationResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}(0x{:02X})", self, *self as u8)
    }
}

/// Diagnostic message acknowledge codes (ISO 13400-2 tables 28 and 30)
///
/// `ConfirmationAck` goes out as a positive acknowledge (0x8002), every
/// other code as a negative acknowledge (0x8003).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DiagnosticMessageResponseCode {
    ConfirmationAck = 0x00,
    InvalidSa = 0x02,
    UnknownTa = 0x03,
    MessageTooLarge = 0x04,
    OutOfMemory = 0x05,
    TargetUnreachable = 0x06,
    UnknownNetwork = 0x07,
    TransportProtocolError = 0x08,
}

impl DiagnosticMessageResponseCode {
    pub const fn is_positive(self) -> bool {
        matches!(self, Self::ConfirmationAck)
    }
}

impl TryFrom<u8> for DiagnosticMessageResponseCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::ConfirmationAck),
            0x02 => Ok(Self::InvalidSa),
            0x03 => Ok(Self::UnknownTa),
            0x04 => Ok(Self::MessageTooLarge),
            0x05 => Ok(Self::OutOfMemory),
            0x06 => Ok(Self::TargetUnreachable),
            0x07 => Ok(Self::UnknownNetwork),
            0x08 => Ok(Self::TransportProtocolError),
            other => Err(other),
        }
    }
}

impl fmt::Display for DiagnosticMessageResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}(0x{:02X})", self, *self as u8)
    }
}
