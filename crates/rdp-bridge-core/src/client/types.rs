use crate::error::BridgeError;
use serde::{Deserialize, Serialize};

/// Lifecycle of the single connection owned by a session window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Window not started yet
    Idle,
    /// Waiting for the handoff to deliver a config
    AwaitingConfig,
    /// Transport opening or waiting for the gateway to confirm
    Connecting,
    /// Gateway confirmed the remote-desktop session
    Connected,
    /// Tunnel failed; manual reconnect available
    Errored,
    /// Window torn down (terminal)
    Closed,
}

impl ConnectionState {
    pub fn is_terminal(self) -> bool {
        self == ConnectionState::Closed
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ConnectionState::Idle => "Idle",
            ConnectionState::AwaitingConfig => "Waiting for credentials",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Errored => "Error",
            ConnectionState::Closed => "Closed",
        }
    }
}

/// State plus the human-readable detail shown next to it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub detail: Option<String>,
}

impl ConnectionStatus {
    pub fn new(state: ConnectionState) -> Self {
        Self {
            state,
            detail: None,
        }
    }
}

/// Event sent from a transport task back to the window loop.
#[derive(Clone, Debug)]
pub struct TunnelEvent {
    /// Transport generation that produced the event
    pub generation: u64,
    pub kind: TunnelEventKind,
}

#[derive(Clone, Debug)]
pub enum TunnelEventKind {
    /// Gateway sent `{"type":"connected"}`
    Connected,
    /// Protocol error, transport error or close
    Failed(BridgeError),
}

/// Receives opaque frame payloads from the gateway.
///
/// Called from the transport task on a tokio worker thread, in arrival
/// order. Implementations must not block; hand slow work off to another
/// thread or channel.
pub trait FrameSink: Send + Sync + 'static {
    fn on_frame(&self, payload: &[u8]);
}

/// Sink that discards frames.
pub struct NullSink;

impl FrameSink for NullSink {
    fn on_frame(&self, payload: &[u8]) {
        log::trace!("Discarding {} byte frame", payload.len());
    }
}

/// Default detail for a transport runtime failure.
pub const CONNECTION_ERROR: &str = "connection error";
/// Default detail when the transport closes without a prior error.
pub const CONNECTION_CLOSED: &str = "connection closed";
/// Detail when the gateway error carries no message.
pub const UNKNOWN_GATEWAY_ERROR: &str = "unknown error";
/// Detail when no config arrived in time.
pub const HANDOFF_TIMEOUT: &str = "timed out waiting for session credentials";
