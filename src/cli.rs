use clap::Parser;
use rdp_bridge_core::settings::{BridgeSettings, StoreBackend};
use std::path::PathBuf;

/// Run one remote-desktop session window against a gateway.
#[derive(Debug, Parser)]
#[command(name = "rdp-bridge", version)]
pub struct Cli {
    /// Gateway WebSocket endpoint (overrides settings and RDP_GATEWAY_URL)
    #[arg(long)]
    pub gateway: Option<String>,

    /// Origin this window runs under
    #[arg(long)]
    pub origin: Option<String>,

    /// JSON file with the session config the opener hands over
    #[arg(long)]
    pub credentials: Option<PathBuf>,

    /// Window id, scopes the stored credentials. Required with --persist
    #[arg(long)]
    pub window_id: Option<String>,

    /// Keep credentials in a per-window file instead of memory
    #[arg(long, requires = "window_id")]
    pub persist: bool,

    /// Append received frames to this file
    #[arg(long)]
    pub frames_out: Option<PathBuf>,

    /// Seconds to wait for credentials before giving up
    #[arg(long)]
    pub handoff_timeout: Option<u64>,

    /// Alternative settings file
    #[arg(long)]
    pub settings: Option<PathBuf>,
}

impl Cli {
    /// Flags win over whatever the settings file and environment said.
    pub fn apply(&self, mut settings: BridgeSettings) -> BridgeSettings {
        if let Some(url) = &self.gateway {
            settings.gateway_url = url.clone();
        }
        if let Some(origin) = &self.origin {
            settings.origin = origin.clone();
        }
        if let Some(secs) = self.handoff_timeout {
            settings.handoff_timeout_secs = secs;
        }
        if self.persist {
            settings.store = StoreBackend::File;
        }
        settings
    }

    /// Window id for the file store. Concurrent windows must never share a
    /// record, so there is no default.
    pub fn persisted_window_id(&self) -> anyhow::Result<&str> {
        self.window_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("--window-id is required when credentials are persisted"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_settings() {
        let cli = Cli::parse_from([
            "rdp-bridge",
            "--gateway",
            "ws://gw:9/rdp",
            "--persist",
            "--window-id",
            "win-7",
            "--handoff-timeout",
            "5",
        ]);
        let settings = cli.apply(BridgeSettings::default());
        assert_eq!(settings.gateway_url, "ws://gw:9/rdp");
        assert_eq!(settings.store, StoreBackend::File);
        assert_eq!(settings.handoff_timeout_secs, 5);
        assert_eq!(cli.persisted_window_id().unwrap(), "win-7");
    }

    #[test]
    fn persist_requires_window_id() {
        assert!(Cli::try_parse_from(["rdp-bridge", "--persist"]).is_err());
    }

    #[test]
    fn file_store_from_settings_still_needs_window_id() {
        let cli = Cli::parse_from(["rdp-bridge"]);
        assert!(cli.persisted_window_id().is_err());
        let cli = Cli::parse_from(["rdp-bridge", "--window-id", " "]);
        assert!(cli.persisted_window_id().is_err());
    }

    #[test]
    fn no_flags_keep_settings() {
        let cli = Cli::parse_from(["rdp-bridge"]);
        assert_eq!(cli.apply(BridgeSettings::default()), BridgeSettings::default());
    }
}
