use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Current settings schema version - increment when making breaking changes
pub const SETTINGS_VERSION: u32 = 1;

/// Environment variable that overrides the gateway endpoint.
pub const GATEWAY_URL_ENV: &str = "RDP_GATEWAY_URL";

/// Gateway used for local development when nothing else is configured.
pub const DEFAULT_GATEWAY_URL: &str = "ws://localhost:8080/rdp";

/// Where a session window keeps its stored credentials.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// In-memory, gone when the window closes
    #[default]
    Memory,
    /// One JSON file per window id under the config directory
    File,
}

/// Deployment and tuning settings for the bridge.
/// Persisted in settings.json under the config directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeSettings {
    #[serde(default = "default_settings_version")]
    pub version: u32,
    /// WebSocket endpoint of the remote-desktop gateway
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
    /// Origin the session window runs under; handoff messages must match it
    #[serde(default = "default_origin")]
    pub origin: String,
    /// How long to wait for credentials before surfacing an error
    #[serde(default = "default_handoff_timeout_secs")]
    pub handoff_timeout_secs: u64,
    /// Pause between tearing down a transport and reconnecting
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default)]
    pub store: StoreBackend,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            gateway_url: default_gateway_url(),
            origin: default_origin(),
            handoff_timeout_secs: default_handoff_timeout_secs(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            store: StoreBackend::default(),
        }
    }
}

impl BridgeSettings {
    pub fn handoff_timeout(&self) -> Duration {
        Duration::from_secs(self.handoff_timeout_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Apply environment overrides using the given lookup.
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(GATEWAY_URL_ENV).filter(|v| !v.trim().is_empty()) {
            log::info!("Gateway URL taken from {}", GATEWAY_URL_ENV);
            self.gateway_url = url.trim().to_string();
        }
        self
    }
}

fn default_settings_version() -> u32 {
    // Files without a version field predate versioning
    0
}

fn default_gateway_url() -> String {
    DEFAULT_GATEWAY_URL.to_string()
}

fn default_origin() -> String {
    "http://localhost:3000".to_string()
}

fn default_handoff_timeout_secs() -> u64 {
    30
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

/// Get the config directory path
pub fn get_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rdp-bridge")
}

/// Get the settings file path
pub fn get_settings_path() -> PathBuf {
    get_config_dir().join("settings.json")
}

/// Load settings from the default path, then apply environment overrides.
pub fn load_settings() -> BridgeSettings {
    load_settings_from(&get_settings_path()).apply_env(|key| std::env::var(key).ok())
}

/// Load settings from a file, falling back to defaults on any failure.
pub fn load_settings_from(path: &Path) -> BridgeSettings {
    if !path.exists() {
        log::info!("Settings file not found at {}, using defaults", path.display());
        return BridgeSettings::default();
    }

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            log::error!("Failed to read settings file {}: {}", path.display(), e);
            return BridgeSettings::default();
        }
    };

    match serde_json::from_str::<BridgeSettings>(&content) {
        Ok(settings) => migrate_settings(settings),
        Err(e) => {
            log::error!("Failed to parse settings {}: {}", path.display(), e);
            BridgeSettings::default()
        }
    }
}

/// Save settings to a file, creating parent directories as needed.
pub fn save_settings_to(path: &Path, settings: &BridgeSettings) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, content)?;
    Ok(())
}

fn migrate_settings(mut settings: BridgeSettings) -> BridgeSettings {
    if settings.version == 0 {
        log::info!("Migrating settings from pre-versioning (v0) to v1");
        settings.version = 1;
    }
    settings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from(&dir.path().join("settings.json"));
        assert_eq!(settings, BridgeSettings::default());
        assert_eq!(settings.gateway_url, DEFAULT_GATEWAY_URL);
    }

    #[test]
    fn partial_file_fills_defaults_and_migrates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"gateway_url": "wss://gw.example:443/rdp"}"#).unwrap();
        let settings = load_settings_from(&path);
        assert_eq!(settings.gateway_url, "wss://gw.example:443/rdp");
        assert_eq!(settings.version, 1);
        assert_eq!(settings.handoff_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn corrupt_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(load_settings_from(&path), BridgeSettings::default());
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = BridgeSettings {
            store: StoreBackend::File,
            reconnect_delay_ms: 250,
            ..BridgeSettings::default()
        };
        save_settings_to(&path, &settings).unwrap();
        assert_eq!(load_settings_from(&path), settings);
    }

    #[test]
    fn env_overrides_gateway_url() {
        let settings = BridgeSettings::default().apply_env(|key| {
            (key == GATEWAY_URL_ENV).then(|| " ws://gw:9000/rdp ".to_string())
        });
        assert_eq!(settings.gateway_url, "ws://gw:9000/rdp");

        let untouched = BridgeSettings::default().apply_env(|_| Some(String::new()));
        assert_eq!(untouched.gateway_url, DEFAULT_GATEWAY_URL);
    }
}
