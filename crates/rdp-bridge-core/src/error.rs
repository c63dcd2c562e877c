use crate::client::types::{ConnectionState, CONNECTION_ERROR};

/// Anomalies raised inside the bridge.
///
/// Handoff-layer variants are recovered locally and never shown to the user.
/// Tunnel-layer variants end up as `ConnectionState::Errored` plus a detail.
#[derive(Clone, Debug, thiserror::Error)]
pub enum BridgeError {
    /// Origin mismatch or malformed handoff payload.
    #[error("handoff message rejected: {0}")]
    HandoffRejected(String),
    /// Stored record older than the TTL.
    #[error("stored session config expired")]
    ConfigExpired,
    /// Transport could not be built, or failed at runtime.
    #[error("transport error: {0}")]
    TransportError(String),
    /// Gateway sent an explicit error control message.
    #[error("{0}")]
    ProtocolError(String),
    /// Transport closed without a prior error.
    #[error("{0}")]
    UnexpectedClose(String),
    /// Key-value backing store failed.
    #[error("storage error: {0}")]
    Storage(String),
    #[error("invalid transition from {from:?} on {event}")]
    InvalidTransition {
        from: ConnectionState,
        event: &'static str,
    },
}

impl BridgeError {
    /// Detail string shown next to an `Errored` status.
    pub fn detail(&self) -> String {
        match self {
            BridgeError::TransportError(_) => CONNECTION_ERROR.to_string(),
            other => other.to_string(),
        }
    }
}

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;
