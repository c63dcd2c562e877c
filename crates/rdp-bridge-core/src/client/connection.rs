use crate::client::types::{
    FrameSink, TunnelEvent, TunnelEventKind, CONNECTION_CLOSED, UNKNOWN_GATEWAY_ERROR,
};
use crate::error::{BridgeError, Result};
use crate::types::SessionConfig;
use crate::ws::{encode_connect_params, parse_control, ControlKind, TunnelMessage};

use std::sync::Arc;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;

/// Owns the one transport between a session window and the gateway.
///
/// Each `connect` bumps the generation; events carry the generation of the
/// transport that produced them so the window can drop stale ones.
pub struct TunnelClient {
    gateway_url: String,
    runtime: tokio::runtime::Handle,
    sink: Arc<dyn FrameSink>,
    event_tx: async_channel::Sender<TunnelEvent>,
    generation: u64,
    /// Generation whose events are still wanted; `None` after disconnect
    live_generation: Option<u64>,
    abort_handle: Option<tokio::task::AbortHandle>,
}

impl TunnelClient {
    pub fn new(
        gateway_url: impl Into<String>,
        runtime: tokio::runtime::Handle,
        sink: Arc<dyn FrameSink>,
        event_tx: async_channel::Sender<TunnelEvent>,
    ) -> Self {
        Self {
            gateway_url: gateway_url.into(),
            runtime,
            sink,
            event_tx,
            generation: 0,
            live_generation: None,
            abort_handle: None,
        }
    }

    pub fn gateway_url(&self) -> &str {
        &self.gateway_url
    }

    /// Generation of the most recent transport.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether events from `generation` should still be acted on.
    pub fn accepts(&self, generation: u64) -> bool {
        self.live_generation == Some(generation)
    }

    /// Whether a transport task is still running.
    pub fn is_live(&self) -> bool {
        self.abort_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Open a fresh transport for `config`, tearing down any previous one.
    ///
    /// Fails fast without spawning anything if the gateway URL cannot be
    /// turned into a WebSocket request.
    pub fn connect(&mut self, config: &SessionConfig) -> Result<u64> {
        self.disconnect();

        let request = self
            .gateway_url
            .as_str()
            .into_client_request()
            .map_err(|e| BridgeError::TransportError(format!("invalid gateway URL: {}", e)))?;
        match request.uri().scheme_str() {
            Some("ws") | Some("wss") => {}
            other => {
                return Err(BridgeError::TransportError(format!(
                    "unsupported gateway scheme: {}",
                    other.unwrap_or("<none>")
                )));
            }
        }

        self.generation += 1;
        let generation = self.generation;
        let params = encode_connect_params(config);
        let sink = self.sink.clone();
        let event_tx = self.event_tx.clone();

        log::info!(
            "Opening tunnel #{} to {} for {}",
            generation,
            self.gateway_url,
            config.display_label()
        );

        let task = self.runtime.spawn(async move {
            Self::run_transport(request, params, generation, sink, event_tx).await;
        });
        self.abort_handle = Some(task.abort_handle());
        self.live_generation = Some(generation);
        Ok(generation)
    }

    /// Close the transport if open. Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        self.live_generation = None;
        if let Some(handle) = self.abort_handle.take() {
            log::info!("Closing tunnel #{}", self.generation);
            handle.abort();
        }
    }

    /// A single transport. Reports at most one failure.
    async fn run_transport(
        request: tungstenite::handshake::client::Request,
        params: String,
        generation: u64,
        sink: Arc<dyn FrameSink>,
        event_tx: async_channel::Sender<TunnelEvent>,
    ) {
        let report = |kind: TunnelEventKind| {
            let event_tx = event_tx.clone();
            async move {
                let _ = event_tx.send(TunnelEvent { generation, kind }).await;
            }
        };

        let (ws_stream, _response) = match tokio_tungstenite::connect_async(request).await {
            Ok(pair) => pair,
            Err(e) => {
                log::warn!("Tunnel #{} failed to open: {}", generation, e);
                report(TunnelEventKind::Failed(BridgeError::TransportError(e.to_string()))).await;
                return;
            }
        };

        let (mut ws_write, mut ws_read) = futures::StreamExt::split(ws_stream);

        // Connection parameters go out exactly once, right after open
        if let Err(e) = futures::SinkExt::send(
            &mut ws_write,
            tungstenite::Message::Text(params.into()),
        )
        .await
        {
            log::warn!("Tunnel #{} failed to send connection parameters: {}", generation, e);
            report(TunnelEventKind::Failed(BridgeError::TransportError(e.to_string()))).await;
            return;
        }

        let mut errored = false;
        loop {
            let message = match futures::StreamExt::next(&mut ws_read).await {
                Some(Ok(tungstenite::Message::Text(text))) => match parse_control(&text) {
                    Some(message) => message,
                    None => {
                        log::warn!(
                            "Unrecognized gateway text message ({} bytes) on tunnel #{}",
                            text.len(),
                            generation
                        );
                        continue;
                    }
                },
                Some(Ok(tungstenite::Message::Binary(data))) => TunnelMessage::FrameData {
                    payload: data.into(),
                },
                Some(Ok(tungstenite::Message::Ping(data))) => {
                    log::trace!("WS Ping received ({} bytes)", data.len());
                    continue;
                }
                Some(Ok(tungstenite::Message::Pong(_))) | Some(Ok(tungstenite::Message::Frame(_))) => {
                    continue;
                }
                Some(Ok(tungstenite::Message::Close(_))) | None => {
                    log::info!("Gateway closed tunnel #{}", generation);
                    if !errored {
                        report(TunnelEventKind::Failed(BridgeError::UnexpectedClose(
                            CONNECTION_CLOSED.to_string(),
                        )))
                        .await;
                    }
                    return;
                }
                Some(Err(e)) => {
                    log::warn!("Tunnel #{} transport error: {}", generation, e);
                    if !errored {
                        report(TunnelEventKind::Failed(BridgeError::TransportError(e.to_string())))
                            .await;
                    }
                    return;
                }
            };

            match message {
                TunnelMessage::Control {
                    kind: ControlKind::Connected,
                    ..
                } => {
                    log::info!("Gateway confirmed tunnel #{}", generation);
                    report(TunnelEventKind::Connected).await;
                }
                TunnelMessage::Control {
                    kind: ControlKind::Error,
                    detail,
                } => {
                    let detail = detail.unwrap_or_else(|| UNKNOWN_GATEWAY_ERROR.to_string());
                    log::warn!("Gateway error on tunnel #{}: {}", generation, detail);
                    if !errored {
                        errored = true;
                        report(TunnelEventKind::Failed(BridgeError::ProtocolError(detail))).await;
                    }
                }
                TunnelMessage::FrameData { payload } => sink.on_frame(&payload),
            }
        }
    }
}

impl Drop for TunnelClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}
