//! Stand-in for the admin console tab that opened the session window.

use anyhow::{Context, Result};
use rdp_bridge_core::handoff::HandoffMessage;
use rdp_bridge_core::{Envelope, SessionConfig};
use serde_json::Value;
use std::path::Path;

/// Load the session config the parent will hand over.
pub fn load_credentials(path: &Path) -> Result<SessionConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read credentials {}", path.display()))?;
    let config: SessionConfig = serde_json::from_str(&content)
        .with_context(|| format!("Invalid credentials in {}", path.display()))?;
    Ok(config)
}

/// Answer the window's requests until either side goes away.
///
/// Without credentials the parent stays silent, like a console tab that lost
/// its copy; the window then relies on its own store or times out.
pub async fn serve(
    origin: String,
    credentials: Option<SessionConfig>,
    from_window: async_channel::Receiver<Value>,
    to_window: async_channel::Sender<Envelope>,
) {
    while let Ok(message) = from_window.recv().await {
        match HandoffMessage::from_value(&message) {
            Some(HandoffMessage::RequestConfig) | Some(HandoffMessage::Resend) => {
                let Some(config) = &credentials else {
                    log::warn!("Window asked for credentials but none were provided");
                    continue;
                };
                if to_window
                    .send(Envelope::credentials(origin.clone(), config))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Some(HandoffMessage::Ack) => log::info!("Window acknowledged credentials"),
            None => log::debug!("Unknown message from window: {}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SessionConfig {
        serde_json::from_value(serde_json::json!({
            "ip": "10.0.0.5",
            "username": "admin",
            "password": "x",
            "port": 3389,
            "quality": "high",
            "security": "nla",
            "instanceName": "web-1",
            "instanceId": "i-123",
        }))
        .unwrap()
    }

    #[test]
    fn loads_credentials_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.json");
        std::fs::write(&path, serde_json::to_string(&config()).unwrap()).unwrap();
        assert_eq!(load_credentials(&path).unwrap(), config());
    }

    #[test]
    fn bad_credentials_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.json");
        std::fs::write(&path, r#"{"ip": "10.0.0.5"}"#).unwrap();
        assert!(load_credentials(&path).is_err());
        assert!(load_credentials(&dir.path().join("missing.json")).is_err());
    }

    #[tokio::test]
    async fn answers_requests_and_resends() {
        let (window_tx, from_window) = async_channel::unbounded();
        let (to_window, window_rx) = async_channel::unbounded();
        let task = tokio::spawn(serve(
            "https://console.example".to_string(),
            Some(config()),
            from_window,
            to_window,
        ));

        window_tx.send(HandoffMessage::RequestConfig.to_value()).await.unwrap();
        window_tx.send(HandoffMessage::Ack.to_value()).await.unwrap();
        window_tx.send(HandoffMessage::Resend.to_value()).await.unwrap();
        drop(window_tx);
        task.await.unwrap();

        let sent: Vec<Envelope> = std::iter::from_fn(|| window_rx.try_recv().ok()).collect();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|e| *e == Envelope::credentials("https://console.example", &config())));
    }

    #[tokio::test]
    async fn stays_silent_without_credentials() {
        let (window_tx, from_window) = async_channel::unbounded();
        let (to_window, window_rx) = async_channel::unbounded();
        window_tx.send(HandoffMessage::RequestConfig.to_value()).await.unwrap();
        drop(window_tx);
        serve("o".to_string(), None, from_window, to_window).await;
        assert!(window_rx.is_empty());
    }
}
