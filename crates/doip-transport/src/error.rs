//! DoIP transport errors

use thiserror::Error;

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Channel-level socket errors.
///
/// Never surfaced to callers: every variant ends the connection.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Connection closed by peer")]
    ClosedByPeer,

    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No socket attached")]
    NoSocket,
}

/// Errors returned by the TCP handler and server API
#[derive(Debug, Error)]
pub enum DoIpError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No channel available for new connection")]
    PoolSaturated,

    #[error("No routing-active channel with id 0x{0:04X}")]
    ChannelNotFound(u32),

    #[error("Server stopped")]
    ServerStopped,
}
