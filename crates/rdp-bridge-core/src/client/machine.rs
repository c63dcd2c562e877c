//! Connection lifecycle of one session window.
//!
//! The machine only decides. Side effects come back as [`Effect`] values that
//! the window executes, so every transition can be tested without I/O.

use crate::client::types::{ConnectionState, ConnectionStatus, HANDOFF_TIMEOUT};
use crate::error::{BridgeError, Result};

/// Inputs to the state machine, applied in arrival order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MachineEvent {
    /// Window started, handoff not resolved yet
    Startup,
    /// Config restored or delivered by the opener
    ConfigDelivered,
    /// Gateway confirmed the session
    TunnelConnected,
    /// Protocol error, transport error or close, with its detail
    TunnelFailed(String),
    /// No config arrived within the handoff timeout
    HandoffTimedOut,
    /// User asked to reconnect
    ReconnectRequested { config_held: bool },
    /// Window is closing
    Teardown,
}

impl MachineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            MachineEvent::Startup => "startup",
            MachineEvent::ConfigDelivered => "config_delivered",
            MachineEvent::TunnelConnected => "tunnel_connected",
            MachineEvent::TunnelFailed(_) => "tunnel_failed",
            MachineEvent::HandoffTimedOut => "handoff_timed_out",
            MachineEvent::ReconnectRequested { .. } => "reconnect_requested",
            MachineEvent::Teardown => "teardown",
        }
    }
}

/// Work the window must do after a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Open the tunnel with the held config now
    Connect,
    /// Close the tunnel
    Disconnect,
    /// Open the tunnel once the reconnect delay has passed
    ScheduleReconnect,
    /// Ask the opener for credentials again
    RequestConfig,
}

pub struct ConnectionStateMachine {
    state: ConnectionState,
    detail: Option<String>,
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Idle,
            detail: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            state: self.state,
            detail: self.detail.clone(),
        }
    }

    /// Apply one event. Rejected events leave the state untouched.
    pub fn apply(&mut self, event: MachineEvent) -> Result<Vec<Effect>> {
        use ConnectionState::*;

        let (next, detail, effects) = match (self.state, event) {
            (Closed, event) => return Err(self.invalid(&event)),

            (_, MachineEvent::Teardown) => (Closed, None, vec![Effect::Disconnect]),

            (Idle, MachineEvent::Startup) => (AwaitingConfig, None, vec![]),

            // Errored here means the handoff timed out and the config came late
            (AwaitingConfig | Errored, MachineEvent::ConfigDelivered) => {
                (Connecting, None, vec![Effect::Connect])
            }

            (Connecting, MachineEvent::TunnelConnected) => (Connected, None, vec![]),

            (Connecting | Connected, MachineEvent::TunnelFailed(detail)) => {
                (Errored, Some(detail), vec![])
            }
            // First failure wins
            (Errored, MachineEvent::TunnelFailed(_)) => return Ok(vec![]),

            (AwaitingConfig, MachineEvent::HandoffTimedOut) => {
                (Errored, Some(HANDOFF_TIMEOUT.to_string()), vec![])
            }

            (_, MachineEvent::ReconnectRequested { config_held: true }) => (
                Connecting,
                None,
                vec![Effect::Disconnect, Effect::ScheduleReconnect],
            ),
            (_, MachineEvent::ReconnectRequested { config_held: false }) => {
                (AwaitingConfig, None, vec![Effect::RequestConfig])
            }

            (_, event) => return Err(self.invalid(&event)),
        };

        log::debug!("Connection state {:?} -> {:?}", self.state, next);
        self.state = next;
        self.detail = detail;
        Ok(effects)
    }

    fn invalid(&self, event: &MachineEvent) -> BridgeError {
        BridgeError::InvalidTransition {
            from: self.state,
            event: event.name(),
        }
    }
}
