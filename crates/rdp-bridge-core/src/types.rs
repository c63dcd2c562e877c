use serde::{Deserialize, Serialize};
use std::fmt;

/// One remote-desktop target, created by the parent context.
///
/// Never mutated after creation. `instance_name` and `instance_id` are for
/// display only and are not forwarded to the gateway.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub ip: String,
    pub username: String,
    pub password: String,
    pub port: u16,
    pub quality: String,
    pub security: String,
    #[serde(default)]
    pub instance_name: String,
    #[serde(default)]
    pub instance_id: String,
}

impl SessionConfig {
    /// Label for status lines and logs, e.g. `web-1 (i-123)`.
    pub fn display_label(&self) -> String {
        match (self.instance_name.is_empty(), self.instance_id.is_empty()) {
            (false, false) => format!("{} ({})", self.instance_name, self.instance_id),
            (false, true) => self.instance_name.clone(),
            (true, false) => self.instance_id.clone(),
            (true, true) => format!("{}:{}", self.ip, self.port),
        }
    }
}

// Password stays out of logs.
impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("ip", &self.ip)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("port", &self.port)
            .field("quality", &self.quality)
            .field("security", &self.security)
            .field("instance_name", &self.instance_name)
            .field("instance_id", &self.instance_id)
            .finish()
    }
}

/// A config together with the time it was stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredSessionRecord {
    pub config: SessionConfig,
    pub stored_at_epoch_millis: i64,
}

impl StoredSessionRecord {
    /// Whether the record is still usable at `now`. Records stamped in the
    /// future, or so far back the age overflows, count as expired.
    pub fn is_fresh(&self, now_epoch_millis: i64, ttl_millis: i64) -> bool {
        now_epoch_millis
            .checked_sub(self.stored_at_epoch_millis)
            .is_some_and(|age| (0..ttl_millis).contains(&age))
    }
}

/// Presentation-only window state. Never affects the connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presentation {
    pub fullscreen: bool,
    pub keyboard_visible: bool,
}

impl Presentation {
    pub fn toggle_fullscreen(&mut self) {
        self.fullscreen = !self.fullscreen;
    }

    pub fn toggle_keyboard(&mut self) {
        self.keyboard_visible = !self.keyboard_visible;
    }
}

#[cfg(test)]
pub(crate) fn sample_config() -> SessionConfig {
    SessionConfig {
        ip: "10.0.0.5".to_string(),
        username: "admin".to_string(),
        password: "x".to_string(),
        port: 3389,
        quality: "high".to_string(),
        security: "nla".to_string(),
        instance_name: "web-1".to_string(),
        instance_id: "i-123".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_config_uses_camel_case_fields() {
        let json = serde_json::json!({
            "ip": "10.0.0.5",
            "username": "admin",
            "password": "x",
            "port": 3389,
            "quality": "high",
            "security": "nla",
            "instanceName": "web-1",
            "instanceId": "i-123",
        });
        let parsed: SessionConfig = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, sample_config());
    }

    #[test]
    fn debug_output_redacts_password() {
        let mut config = sample_config();
        config.password = "hunter2".to_string();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn display_label_falls_back_to_address() {
        let mut config = sample_config();
        assert_eq!(config.display_label(), "web-1 (i-123)");
        config.instance_name.clear();
        config.instance_id.clear();
        assert_eq!(config.display_label(), "10.0.0.5:3389");
    }

    #[test]
    fn record_freshness_is_strict() {
        let record = StoredSessionRecord {
            config: sample_config(),
            stored_at_epoch_millis: 1_000,
        };
        assert!(record.is_fresh(1_999, 1_000));
        assert!(!record.is_fresh(2_000, 1_000));
    }

    #[test]
    fn record_with_extreme_timestamp_is_not_fresh() {
        let mut record = StoredSessionRecord {
            config: sample_config(),
            stored_at_epoch_millis: i64::MIN,
        };
        assert!(!record.is_fresh(1_700_000_000_000, 1_000));
        record.stored_at_epoch_millis = i64::MAX;
        assert!(!record.is_fresh(-1_700_000_000_000, 1_000));
        assert!(!record.is_fresh(1_700_000_000_000, 1_000));
    }

    #[test]
    fn presentation_toggles_are_independent() {
        let mut p = Presentation::default();
        p.toggle_fullscreen();
        assert!(p.fullscreen);
        assert!(!p.keyboard_visible);
        p.toggle_keyboard();
        p.toggle_fullscreen();
        assert!(!p.fullscreen);
        assert!(p.keyboard_visible);
    }
}
