//! TCP handler: channel pool, processor table and id-based transmit
//!
//! The handler is driven by its owner. Whoever holds it reports accepted
//! sockets, read readiness and timer expiries, and forwards outbound
//! messages. All calls must come from one thread at a time.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::channel::socket::ChannelSocket;
use crate::channel::state::ChannelState;
use crate::channel::timer::{TimerKey, TimerService};
use crate::channel::{ChannelEnv, DoIpChannel, Peers, ReadStatus};
use crate::config::DoIpConfig;
use crate::error::DoIpError;
use crate::processors::ProcessorTable;
use crate::uds::{
    Address, ChannelId, HandlerId, TransmissionResult, UdsMessage, UdsTransportProtocolMgr,
};
use crate::wire::{DoIpMessage, NackCode};

/// Read steps per readiness notification before yielding to other channels
pub const MAX_READ_STEPS_PER_EVENT: usize = 64;

pub struct TcpHandler<S> {
    channels: Vec<DoIpChannel<S>>,
    processors: ProcessorTable,
    config: DoIpConfig,
    mgr: Arc<dyn UdsTransportProtocolMgr>,
    timers: Arc<dyn TimerService>,
    handler_id: HandlerId,
}

impl<S: ChannelSocket> TcpHandler<S> {
    /// Create a handler with `max_channels + 1` channels.
    ///
    /// The spare channel lets one more tester connect and request routing
    /// activation while every other channel is established.
    pub fn new(
        config: DoIpConfig,
        handler_id: HandlerId,
        mgr: Arc<dyn UdsTransportProtocolMgr>,
        timers: Arc<dyn TimerService>,
    ) -> Result<Self, DoIpError> {
        config.validate()?;
        let channels = (0..config.tcp.max_channels + 1)
            .map(DoIpChannel::new)
            .collect();
        Ok(Self {
            channels,
            processors: ProcessorTable::tcp(),
            config,
            mgr,
            timers,
            handler_id,
        })
    }

    pub fn handler_id(&self) -> HandlerId {
        self.handler_id
    }

    pub fn config(&self) -> &DoIpConfig {
        &self.config
    }

    pub fn processors(&self) -> &ProcessorTable {
        &self.processors
    }

    pub fn capacity(&self) -> usize {
        self.channels.len()
    }

    pub fn channels(&self) -> &[DoIpChannel<S>] {
        &self.channels
    }

    pub fn channel(&self, slot: usize) -> Option<&DoIpChannel<S>> {
        self.channels.get(slot)
    }

    /// Channels not in `Listen`
    pub fn established_channels(&self) -> usize {
        self.channels.iter().filter(|c| c.is_established()).count()
    }

    pub fn is_source_address_registered(&self, source_address: Address) -> bool {
        self.channels
            .iter()
            .any(|c| c.state().is_registered() && c.source_address() == source_address)
    }

    pub fn check_header(&self, message: &DoIpMessage) -> NackCode {
        self.processors
            .check_header(message, self.config.max_message_length)
    }

    /// Attach a newly accepted connection to a listening channel.
    ///
    /// The socket is closed when no channel is free.
    pub fn on_accept(&mut self, socket: S) -> Result<usize, DoIpError> {
        let Some(slot) = self
            .channels
            .iter()
            .position(|c| c.state() == ChannelState::Listen)
        else {
            warn!(capacity = self.capacity(), "No listening channel, closing connection");
            socket.close();
            return Err(DoIpError::PoolSaturated);
        };

        let attached = self
            .with_channel(slot, |channel, env| channel.attach(socket, env))
            .unwrap_or(false);
        if !attached {
            return Err(DoIpError::PoolSaturated);
        }
        info!(slot, "Connection accepted");
        Ok(slot)
    }

    /// Process readable data on a channel until the socket runs dry, the
    /// channel closes, or the step budget is spent.
    pub fn on_readable(&mut self, slot: usize) -> ReadStatus {
        for _ in 0..MAX_READ_STEPS_PER_EVENT {
            let status = self
                .with_channel(slot, |channel, env| channel.handle_read(env))
                .unwrap_or(ReadStatus::Closed);
            if status != ReadStatus::Progress {
                return status;
            }
        }
        ReadStatus::Progress
    }

    /// Deliver an inactivity timer expiry; stale keys are ignored
    pub fn on_timeout(&mut self, key: TimerKey) {
        self.with_channel(key.slot, |channel, env| {
            channel.on_inactivity_timeout(key, env)
        });
    }

    /// Send `message` on the routing-active channel with `channel_id`.
    ///
    /// The transport manager receives a transmit confirmation in every case,
    /// including when no such channel exists.
    pub fn transmit(&self, message: UdsMessage, channel_id: ChannelId) -> Result<(), DoIpError> {
        let channel = self.channels.iter().find(|c| {
            c.state() == ChannelState::RegisteredRoutingActive && c.channel_id() == channel_id
        });
        match channel {
            Some(channel) => {
                channel.transmit(message, self.mgr.as_ref());
                Ok(())
            }
            None => {
                warn!(channel_id, "Transmit to unknown channel");
                self.mgr
                    .transmit_confirmation(message, TransmissionResult::TransmitFailed);
                Err(DoIpError::ChannelNotFound(channel_id))
            }
        }
    }

    /// Finalize every established channel
    pub fn shutdown(&mut self) {
        for slot in 0..self.channels.len() {
            self.with_channel(slot, |channel, env| {
                if channel.is_established() {
                    debug!(slot, state = %channel.state(), "Finalizing channel on shutdown");
                    channel.try_change_state(ChannelState::Finalize, env);
                }
            });
        }
    }

    fn with_channel<R>(
        &mut self,
        slot: usize,
        f: impl FnOnce(&mut DoIpChannel<S>, &ChannelEnv<'_, S>) -> R,
    ) -> Option<R> {
        if slot >= self.channels.len() {
            return None;
        }
        let (before, rest) = self.channels.split_at_mut(slot);
        let (channel, after) = rest.split_first_mut()?;
        let env = ChannelEnv {
            peers: Peers {
                before: &*before,
                after: &*after,
            },
            config: &self.config,
            processors: &self.processors,
            mgr: self.mgr.as_ref(),
            timers: self.timers.as_ref(),
            handler_id: self.handler_id,
        };
        Some(f(channel, &env))
    }
}
