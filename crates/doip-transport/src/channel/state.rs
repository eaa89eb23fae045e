//! Connection states and their transition table
//!
//! ```text
//! Listen -> Initialized -> RegisteredAuthenticationPending
//!              |                -> RegisteredConfirmationPending
//!              |                    -> RegisteredRoutingActive
//!              v                             |
//!           Finalize <-----------------------+  (from every state but Listen)
//!              |
//!              v
//!           Listen
//! ```
//!
//! Authentication and confirmation are not implemented, so both pending
//! states pass straight through on entry.

use std::fmt;

use tracing::debug;

use super::socket::ChannelSocket;
use super::{ChannelEnv, DoIpChannel};
use crate::wire::{DoIpMessage, PayloadType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    Listen,
    Initialized,
    RegisteredAuthenticationPending,
    RegisteredConfirmationPending,
    RegisteredRoutingActive,
    Finalize,
}

impl ChannelState {
    pub fn is_valid_change(self, to: ChannelState) -> bool {
        use ChannelState::*;
        matches!(
            (self, to),
            (Listen, Initialized)
                | (Initialized, RegisteredAuthenticationPending)
                | (Initialized, Finalize)
                | (RegisteredAuthenticationPending, RegisteredConfirmationPending)
                | (RegisteredAuthenticationPending, Finalize)
                | (RegisteredConfirmationPending, RegisteredRoutingActive)
                | (RegisteredConfirmationPending, Finalize)
                | (RegisteredRoutingActive, Finalize)
                | (Finalize, Listen)
        )
    }

    /// Routing activation accepted for this channel
    pub fn is_registered(self) -> bool {
        matches!(
            self,
            Self::RegisteredAuthenticationPending
                | Self::RegisteredConfirmationPending
                | Self::RegisteredRoutingActive
        )
    }

    pub(crate) fn on_enter<S: ChannelSocket>(
        self,
        channel: &mut DoIpChannel<S>,
        env: &ChannelEnv<'_, S>,
    ) {
        let timing = &env.config.timing;
        match self {
            Self::Listen => {}
            Self::Initialized => channel.start_inactivity_timer(timing.initial_inactivity(), env),
            Self::RegisteredAuthenticationPending => {
                channel.start_inactivity_timer(timing.general_inactivity(), env);
                channel.try_change_state(Self::RegisteredConfirmationPending, env);
            }
            Self::RegisteredConfirmationPending => {
                channel.try_change_state(Self::RegisteredRoutingActive, env);
            }
            Self::RegisteredRoutingActive => {
                channel.start_inactivity_timer(timing.general_inactivity(), env)
            }
            Self::Finalize => {
                channel.stop_inactivity_timer(env);
                channel.try_change_state(Self::Listen, env);
            }
        }
    }

    pub(crate) fn on_leave<S: ChannelSocket>(
        self,
        channel: &mut DoIpChannel<S>,
        env: &ChannelEnv<'_, S>,
    ) {
        match self {
            Self::Initialized => channel.stop_inactivity_timer(env),
            Self::Finalize => channel.reset_channel(env),
            _ => {}
        }
    }

    /// Handle a completely read message
    pub(crate) fn handle_message<S: ChannelSocket>(
        self,
        message: &DoIpMessage,
        channel: &mut DoIpChannel<S>,
        env: &ChannelEnv<'_, S>,
    ) {
        let kind = message.kind();
        match self {
            Self::Initialized => {
                if kind == Some(PayloadType::RoutingActivationRequest) {
                    if let Some(processor) = env.processors.get(PayloadType::RoutingActivationRequest)
                    {
                        channel.stop_inactivity_timer(env);
                        processor.handle_message(message, channel, env);
                    }
                } else {
                    debug!(slot = channel.slot(), ?kind, "Ignoring message before routing activation");
                }
            }
            Self::RegisteredConfirmationPending => match kind {
                Some(
                    PayloadType::DiagnosticMessage
                    | PayloadType::AliveCheckResponse
                    | PayloadType::RoutingActivationRequest,
                ) => {
                    channel.start_inactivity_timer(env.config.timing.general_inactivity(), env)
                }
                _ => {}
            },
            Self::RegisteredRoutingActive => {
                channel.start_inactivity_timer(env.config.timing.general_inactivity(), env);
                if let Some(processor) = kind.and_then(|kind| env.processors.get(kind)) {
                    processor.handle_message(message, channel, env);
                }
            }
            Self::Listen | Self::RegisteredAuthenticationPending | Self::Finalize => {
                debug!(slot = channel.slot(), state = ?self, ?kind, "Message ignored in state");
            }
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ChannelState::*;

    const ALL: [ChannelState; 6] = [
        Listen,
        Initialized,
        RegisteredAuthenticationPending,
        RegisteredConfirmationPending,
        RegisteredRoutingActive,
        Finalize,
    ];

    #[test]
    fn test_transition_table() {
        let valid: Vec<(ChannelState, ChannelState)> = ALL
            .iter()
            .flat_map(|from| ALL.iter().map(move |to| (*from, *to)))
            .filter(|(from, to)| from.is_valid_change(*to))
            .collect();

        assert_eq!(
            valid,
            vec![
                (Listen, Initialized),
                (Initialized, RegisteredAuthenticationPending),
                (Initialized, Finalize),
                (RegisteredAuthenticationPending, RegisteredConfirmationPending),
                (RegisteredAuthenticationPending, Finalize),
                (RegisteredConfirmationPending, RegisteredRoutingActive),
                (RegisteredConfirmationPending, Finalize),
                (RegisteredRoutingActive, Finalize),
                (Finalize, Listen),
            ]
        );
    }

    #[test]
    fn test_routing_active_cannot_reactivate() {
        assert!(!RegisteredRoutingActive.is_valid_change(RegisteredAuthenticationPending));
        assert!(!Listen.is_valid_change(Finalize));
    }

    #[test]
    fn test_registered_states() {
        assert!(!Listen.is_registered());
        assert!(!Initialized.is_registered());
        assert!(RegisteredAuthenticationPending.is_registered());
        assert!(RegisteredRoutingActive.is_registered());
        assert!(!Finalize.is_registered());
    }
}
