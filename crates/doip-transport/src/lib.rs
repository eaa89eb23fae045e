//! doip-transport - DoIP (ISO 13400) TCP channel engine
//!
//! Turns partially delivered TCP byte streams into validated DoIP messages,
//! performs routing activation and hands diagnostic payloads to a UDS
//! transport protocol manager.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  DoIpServer (tokio driver)                  │
//! │   accept / readiness / timers / transmit -> dispatch task   │
//! │                                                             │
//! │  ┌───────────────────────────────────────────────────────┐  │
//! │  │                     TcpHandler                        │  │
//! │  │  channel pool (max_channels + 1)   ProcessorTable     │  │
//! │  │                                                       │  │
//! │  │  ┌──────────────┐  ┌──────────────┐  ┌─────────────┐  │  │
//! │  │  │ DoIpChannel  │  │ ChannelState │  │ Processors  │  │  │
//! │  │  │ (readers)    │──│ (lifecycle)  │──│ (RA, diag)  │  │  │
//! │  │  └──────────────┘  └──────────────┘  └──────┬──────┘  │  │
//! │  └─────────────────────────────────────────────┼─────────┘  │
//! │                                                │            │
//! │                                ┌───────────────┴─────────┐  │
//! │                                │ UdsTransportProtocolMgr │  │
//! │                                └─────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The handler itself is runtime agnostic: it only sees the
//! [`ChannelSocket`] and [`TimerService`] seams, so it can be driven by the
//! bundled tokio [`DoIpServer`] or deterministically from tests.

pub mod channel;
pub mod config;
pub mod error;
pub mod processors;
pub mod reader;
pub mod runtime;
pub mod tcp;
pub mod testing;
pub mod uds;
pub mod wire;

pub use channel::socket::ChannelSocket;
pub use channel::state::ChannelState;
pub use channel::timer::{TimerKey, TimerService};
pub use channel::{DoIpChannel, ReadStatus};
pub use config::DoIpConfig;
pub use error::{ChannelError, ConfigError, DoIpError};
pub use processors::{MessageProcessor, ProcessorTable};
pub use runtime::{DoIpServer, TokioSocket, TransmitHandle};
pub use tcp::TcpHandler;
pub use uds::{
    GlobalChannelId, IndicationResult, TargetAddressType, TransmissionResult, UdsMessage,
    UdsTransportProtocolMgr,
};
pub use wire::{DoIpMessage, NackCode, PayloadType};
