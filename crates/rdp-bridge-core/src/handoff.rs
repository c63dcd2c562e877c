//! Credential handoff between the opener (parent) context and a session window.
//!
//! The opener is the source of truth for credentials. A window receives its
//! `SessionConfig` at most once, either restored from its own store or
//! delivered by the opener, and only from a sender sharing its origin.

use crate::error::BridgeError;
use crate::store::SessionStore;
use crate::types::SessionConfig;

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

pub const REQUEST_CONFIG: &str = "rdp_config";
pub const CREDENTIALS_TYPE: &str = "rdp_credentials";
pub const ACK: &str = "rdp_ack";
pub const RESEND: &str = "resend_rdp";

/// A cross-context message as seen by the receiver.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    /// Origin of the sending context
    pub origin: String,
    pub data: Value,
}

impl Envelope {
    pub fn new(origin: impl Into<String>, data: Value) -> Self {
        Self {
            origin: origin.into(),
            data,
        }
    }

    /// Credential delivery as posted by the opener.
    pub fn credentials(origin: impl Into<String>, config: &SessionConfig) -> Self {
        Self::new(
            origin,
            serde_json::json!({ "type": CREDENTIALS_TYPE, "data": config }),
        )
    }

    /// Config request, used by the opener to re-ask a window.
    pub fn config_request(origin: impl Into<String>) -> Self {
        Self::new(origin, serde_json::json!({ "request": REQUEST_CONFIG }))
    }
}

/// Messages a session window posts to its opener.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandoffMessage {
    /// `{request: "rdp_config"}`
    RequestConfig,
    /// `"rdp_ack"`
    Ack,
    /// `"resend_rdp"`
    Resend,
}

impl HandoffMessage {
    pub fn to_value(self) -> Value {
        match self {
            HandoffMessage::RequestConfig => serde_json::json!({ "request": REQUEST_CONFIG }),
            HandoffMessage::Ack => Value::String(ACK.to_string()),
            HandoffMessage::Resend => Value::String(RESEND.to_string()),
        }
    }

    /// Inverse of `to_value`, for the opener side.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if s == ACK => Some(HandoffMessage::Ack),
            Value::String(s) if s == RESEND => Some(HandoffMessage::Resend),
            Value::Object(map) if map.get("request").and_then(Value::as_str) == Some(REQUEST_CONFIG) => {
                Some(HandoffMessage::RequestConfig)
            }
            _ => None,
        }
    }
}

/// Reference to the context that opened the window.
pub trait Opener: Send + Sync {
    fn post(&self, message: HandoffMessage);
}

/// Opener reached through an async channel of raw JSON messages.
pub struct ChannelOpener {
    tx: async_channel::Sender<Value>,
}

impl ChannelOpener {
    pub fn new(tx: async_channel::Sender<Value>) -> Self {
        Self { tx }
    }
}

impl Opener for ChannelOpener {
    fn post(&self, message: HandoffMessage) {
        if self.tx.try_send(message.to_value()).is_err() {
            log::warn!("Opener is gone, dropped {:?}", message);
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum InboundWire {
    Credentials {
        #[serde(rename = "type")]
        kind: String,
        data: SessionConfig,
    },
    Request {
        request: String,
    },
}

enum Inbound {
    Credentials(SessionConfig),
    ConfigRequest,
}

fn parse_inbound(data: &Value) -> Result<Inbound, BridgeError> {
    match serde_json::from_value::<InboundWire>(data.clone()) {
        Ok(InboundWire::Credentials { kind, data }) if kind == CREDENTIALS_TYPE => {
            Ok(Inbound::Credentials(data))
        }
        Ok(InboundWire::Request { request }) if request == REQUEST_CONFIG => {
            Ok(Inbound::ConfigRequest)
        }
        Ok(_) => Err(BridgeError::HandoffRejected("unknown message kind".to_string())),
        Err(e) => Err(BridgeError::HandoffRejected(e.to_string())),
    }
}

/// What handling one inbound envelope led to.
#[derive(Clone, Debug, PartialEq)]
pub enum HandoffOutcome {
    /// Config accepted, stored and acknowledged
    Delivered(SessionConfig),
    /// Opener re-asked and was told to resend
    ResendRequested,
    /// Dropped without any state change
    Ignored,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Pending,
    Requested,
    Delivered,
}

pub struct HandoffProtocol {
    origin: String,
    opener: Option<Arc<dyn Opener>>,
    store: SessionStore,
    phase: Phase,
}

impl HandoffProtocol {
    pub fn new(origin: impl Into<String>, opener: Option<Arc<dyn Opener>>, store: SessionStore) -> Self {
        Self {
            origin: origin.into(),
            opener,
            store,
            phase: Phase::Pending,
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn is_delivered(&self) -> bool {
        self.phase == Phase::Delivered
    }

    /// Try the window's own store before asking the opener.
    pub fn restore(&mut self) -> Option<SessionConfig> {
        let config = self.store.get()?;
        log::info!("Restored session config for {}", config.display_label());
        self.phase = Phase::Delivered;
        Some(config)
    }

    /// Ask the opener for credentials. No-op once delivered.
    pub fn request(&mut self) {
        if self.phase == Phase::Delivered {
            return;
        }
        match &self.opener {
            Some(opener) => {
                log::info!("Requesting session config from opener");
                opener.post(HandoffMessage::RequestConfig);
            }
            None => log::warn!("No opener to request session config from"),
        }
        self.phase = Phase::Requested;
    }

    /// Handle one inbound message. The origin is checked before anything else.
    pub fn handle(&mut self, envelope: &Envelope) -> HandoffOutcome {
        if envelope.origin != self.origin {
            log::debug!("Dropped handoff message from foreign origin {}", envelope.origin);
            return HandoffOutcome::Ignored;
        }

        match parse_inbound(&envelope.data) {
            Ok(Inbound::Credentials(config)) => {
                if self.phase == Phase::Delivered {
                    log::debug!("Session config already delivered, ignoring repeat");
                    return HandoffOutcome::Ignored;
                }
                self.store.put(&config);
                self.phase = Phase::Delivered;
                if let Some(opener) = &self.opener {
                    opener.post(HandoffMessage::Ack);
                }
                log::info!("Received session config for {}", config.display_label());
                HandoffOutcome::Delivered(config)
            }
            Ok(Inbound::ConfigRequest) => match &self.opener {
                Some(opener) => {
                    log::info!("Opener re-asked for config, requesting resend");
                    opener.post(HandoffMessage::Resend);
                    HandoffOutcome::ResendRequested
                }
                None => HandoffOutcome::Ignored,
            },
            Err(e) => {
                log::debug!("{}", e);
                HandoffOutcome::Ignored
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::{ManualClock, MemoryStore, SESSION_TTL};
    use crate::types::sample_config;
    use parking_lot::Mutex;
    use std::time::Duration;

    pub(crate) const ORIGIN: &str = "https://console.example";

    #[derive(Default)]
    pub(crate) struct RecordingOpener {
        pub(crate) sent: Mutex<Vec<HandoffMessage>>,
    }

    impl Opener for RecordingOpener {
        fn post(&self, message: HandoffMessage) {
            self.sent.lock().push(message);
        }
    }

    fn protocol() -> (HandoffProtocol, Arc<RecordingOpener>, SessionStore, ManualClock) {
        let opener = Arc::new(RecordingOpener::default());
        let clock = ManualClock::new(1_700_000_000_000);
        let store = SessionStore::new(Arc::new(MemoryStore::new()), Arc::new(clock.clone()));
        let protocol = HandoffProtocol::new(ORIGIN, Some(opener.clone() as Arc<dyn Opener>), store.clone());
        (protocol, opener, store, clock)
    }

    #[test]
    fn valid_delivery_is_stored_and_acknowledged() {
        let (mut protocol, opener, store, _) = protocol();
        protocol.request();
        let outcome = protocol.handle(&Envelope::credentials(ORIGIN, &sample_config()));
        assert_eq!(outcome, HandoffOutcome::Delivered(sample_config()));
        assert!(protocol.is_delivered());
        assert_eq!(store.get(), Some(sample_config()));
        assert_eq!(
            *opener.sent.lock(),
            vec![HandoffMessage::RequestConfig, HandoffMessage::Ack]
        );
    }

    #[test]
    fn foreign_origin_changes_nothing() {
        let (mut protocol, opener, store, _) = protocol();
        let outcome = protocol.handle(&Envelope::credentials("https://evil.example", &sample_config()));
        assert_eq!(outcome, HandoffOutcome::Ignored);
        assert!(!protocol.is_delivered());
        assert_eq!(store.get(), None);
        assert!(opener.sent.lock().is_empty());

        // Re-asks from a foreign origin are dropped too
        let outcome = protocol.handle(&Envelope::config_request("https://evil.example"));
        assert_eq!(outcome, HandoffOutcome::Ignored);
        assert!(opener.sent.lock().is_empty());
    }

    #[test]
    fn malformed_payloads_are_ignored() {
        let (mut protocol, opener, _, _) = protocol();
        let payloads = [
            serde_json::json!("rdp_credentials"),
            serde_json::json!({ "type": "rdp_credentials" }),
            serde_json::json!({ "type": "rdp_credentials", "data": { "ip": "1.2.3.4" } }),
            serde_json::json!({ "type": "other", "data": sample_config() }),
            serde_json::json!({ "request": "something_else" }),
        ];
        for data in payloads {
            assert_eq!(protocol.handle(&Envelope::new(ORIGIN, data)), HandoffOutcome::Ignored);
        }
        assert!(!protocol.is_delivered());
        assert!(opener.sent.lock().is_empty());
    }

    #[test]
    fn second_delivery_is_ignored() {
        let (mut protocol, opener, _, _) = protocol();
        protocol.handle(&Envelope::credentials(ORIGIN, &sample_config()));
        let mut other = sample_config();
        other.ip = "10.0.0.6".to_string();
        assert_eq!(
            protocol.handle(&Envelope::credentials(ORIGIN, &other)),
            HandoffOutcome::Ignored
        );
        assert_eq!(*opener.sent.lock(), vec![HandoffMessage::Ack]);
    }

    #[test]
    fn re_ask_from_opener_requests_resend() {
        let (mut protocol, opener, _, _) = protocol();
        assert_eq!(
            protocol.handle(&Envelope::config_request(ORIGIN)),
            HandoffOutcome::ResendRequested
        );
        assert_eq!(*opener.sent.lock(), vec![HandoffMessage::Resend]);
    }

    #[test]
    fn re_ask_without_opener_is_ignored() {
        let store = SessionStore::new(Arc::new(MemoryStore::new()), Arc::new(ManualClock::new(0)));
        let mut protocol = HandoffProtocol::new(ORIGIN, None, store);
        assert_eq!(protocol.handle(&Envelope::config_request(ORIGIN)), HandoffOutcome::Ignored);
    }

    #[test]
    fn restore_skips_request_when_fresh() {
        let (mut protocol, opener, store, clock) = protocol();
        store.put(&sample_config());
        clock.advance(Duration::from_secs(10 * 60));
        assert_eq!(protocol.restore(), Some(sample_config()));
        protocol.request();
        assert!(opener.sent.lock().is_empty());
    }

    #[test]
    fn restore_of_expired_record_falls_back_to_request() {
        let (mut protocol, opener, store, clock) = protocol();
        store.put(&sample_config());
        clock.advance(SESSION_TTL + Duration::from_secs(60 * 60));
        assert_eq!(protocol.restore(), None);
        protocol.request();
        assert_eq!(*opener.sent.lock(), vec![HandoffMessage::RequestConfig]);
    }

    #[test]
    fn outbound_messages_have_wire_shapes() {
        assert_eq!(
            HandoffMessage::RequestConfig.to_value(),
            serde_json::json!({ "request": "rdp_config" })
        );
        assert_eq!(HandoffMessage::Ack.to_value(), serde_json::json!("rdp_ack"));
        assert_eq!(HandoffMessage::Resend.to_value(), serde_json::json!("resend_rdp"));
        for msg in [HandoffMessage::RequestConfig, HandoffMessage::Ack, HandoffMessage::Resend] {
            assert_eq!(HandoffMessage::from_value(&msg.to_value()), Some(msg));
        }
    }

    #[test]
    fn channel_opener_forwards_json() {
        let (tx, rx) = async_channel::unbounded();
        let opener = ChannelOpener::new(tx);
        opener.post(HandoffMessage::Ack);
        assert_eq!(rx.try_recv().unwrap(), serde_json::json!("rdp_ack"));
    }
}
