use tracing::{debug, info, warn};

use crate::channel::socket::ChannelSocket;
use crate::channel::state::ChannelState;
use crate::channel::{ChannelEnv, DoIpChannel};
use crate::uds::Address;
use crate::wire::{DoIpMessage, RoutingActivationResponseCode};

/// Routing activation request: registers the tester's source address on the channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoutingActivationProcessor;

impl RoutingActivationProcessor {
    pub(crate) fn handle_message<S: ChannelSocket>(
        &self,
        message: &DoIpMessage,
        channel: &mut DoIpChannel<S>,
        env: &ChannelEnv<'_, S>,
    ) {
        let payload = &message.payload;
        let source_address = u16::from_be_bytes([payload[0], payload[1]]);
        let activation_type = payload[2];
        let rules = &env.config.routing_activation;

        let response_code = if !rules.is_known_source_address(source_address) {
            RoutingActivationResponseCode::UnknownSa
        } else if activation_type != rules.activation_type {
            RoutingActivationResponseCode::UnsupportedActivationType
        } else {
            self.register_socket(channel, env, source_address)
        };

        let response = DoIpMessage::routing_activation_response(
            source_address,
            env.config.primary_target_address,
            response_code,
        );

        if response_code.is_success() {
            info!(
                slot = channel.slot(),
                sa = source_address,
                channel_id = channel.channel_id(),
                "Routing activated"
            );
        } else {
            warn!(
                slot = channel.slot(),
                sa = source_address,
                activation_type,
                %response_code,
                "Routing activation rejected"
            );
        }

        channel.send_response(&response);
        if !response_code.is_success() {
            channel.try_change_state(ChannelState::Finalize, env);
        }
    }

    /// Decide whether `source_address` may use this channel
    fn register_socket<S: ChannelSocket>(
        &self,
        channel: &mut DoIpChannel<S>,
        env: &ChannelEnv<'_, S>,
        source_address: Address,
    ) -> RoutingActivationResponseCode {
        let already_registered = channel.state().is_registered();

        if env.established_channels(channel) == 0 {
            debug!(slot = channel.slot(), "First established channel");
        } else if already_registered {
            if source_address != channel.source_address() {
                return RoutingActivationResponseCode::DifferentSa;
            }
        } else if env.is_source_address_registered(source_address) {
            // TODO: alive check the channel already holding this SA and answer
            // RegisteredSa if it responds
            debug!(slot = channel.slot(), sa = source_address, "Source address active on another channel");
        } else if env.established_channels(channel) >= env.config.tcp.max_channels {
            // TODO: alive check all registered channels and answer NoAvailableSocket
            // if every one responds
            debug!(slot = channel.slot(), "All channels established");
        }

        channel.set_registration(source_address);
        if already_registered {
            env.mgr
                .channel_reestablished(channel.global_channel_id(env.handler_id));
        } else {
            channel.try_change_state(ChannelState::RegisteredAuthenticationPending, env);
        }
        RoutingActivationResponseCode::SuccessfullyActivated
    }
}
