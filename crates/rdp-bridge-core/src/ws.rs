use crate::types::SessionConfig;
use serde::{Deserialize, Serialize};

// ── Gateway wire protocol ─────────────────────────────────────────────────

/// Connection parameters sent once right after the transport opens.
/// Display-only identifiers are not part of it.
#[derive(Serialize)]
pub struct ConnectParams<'a> {
    pub ip: &'a str,
    pub username: &'a str,
    pub password: &'a str,
    pub port: u16,
    pub quality: &'a str,
    pub security: &'a str,
}

impl<'a> From<&'a SessionConfig> for ConnectParams<'a> {
    fn from(config: &'a SessionConfig) -> Self {
        Self {
            ip: &config.ip,
            username: &config.username,
            password: &config.password,
            port: config.port,
            quality: &config.quality,
            security: &config.security,
        }
    }
}

/// Serialize the connection parameters for `config` as JSON text.
pub fn encode_connect_params(config: &SessionConfig) -> String {
    // Only strings and integers: serialization cannot fail
    serde_json::to_string(&ConnectParams::from(config)).unwrap_or_default()
}

/// Inbound text control messages (gateway → client)
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayControl {
    Connected,
    Error {
        #[serde(default)]
        message: Option<String>,
    },
}

/// Kind of a control message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlKind {
    Connected,
    Error,
}

/// A classified inbound gateway message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TunnelMessage {
    Control {
        kind: ControlKind,
        detail: Option<String>,
    },
    /// Opaque display payload, forwarded as-is
    FrameData { payload: Vec<u8> },
}

/// Parse a text frame as a control message. `None` if it is not one.
pub fn parse_control(text: &str) -> Option<TunnelMessage> {
    let control = serde_json::from_str::<GatewayControl>(text).ok()?;
    Some(match control {
        GatewayControl::Connected => TunnelMessage::Control {
            kind: ControlKind::Connected,
            detail: None,
        },
        GatewayControl::Error { message } => TunnelMessage::Control {
            kind: ControlKind::Error,
            detail: message,
        },
    })
}
