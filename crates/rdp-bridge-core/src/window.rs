//! The session window: one cooperative loop that owns the handoff, the
//! tunnel and the state machine, and applies their events in arrival order.

use crate::client::connection::TunnelClient;
use crate::client::controls::{ControlCommand, SessionControls};
use crate::client::machine::{ConnectionStateMachine, Effect, MachineEvent};
use crate::client::types::{ConnectionState, ConnectionStatus, FrameSink, TunnelEvent, TunnelEventKind};
use crate::handoff::{Envelope, HandoffOutcome, HandoffProtocol, Opener};
use crate::settings::BridgeSettings;
use crate::store::SessionStore;
use crate::types::{Presentation, SessionConfig};

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Sleep;

/// Notifications for whatever renders the window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WindowEvent {
    StatusChanged(ConnectionStatus),
    PresentationChanged(Presentation),
}

#[derive(Clone, Debug)]
pub struct WindowOptions {
    /// Own origin; handoff messages from any other origin are dropped
    pub origin: String,
    pub gateway_url: String,
    pub handoff_timeout: Duration,
    pub reconnect_delay: Duration,
}

impl From<&BridgeSettings> for WindowOptions {
    fn from(settings: &BridgeSettings) -> Self {
        Self {
            origin: settings.origin.clone(),
            gateway_url: settings.gateway_url.clone(),
            handoff_timeout: settings.handoff_timeout(),
            reconnect_delay: settings.reconnect_delay(),
        }
    }
}

/// What the UI keeps after spawning a window.
pub struct WindowHandle {
    pub controls: SessionControls,
    pub events: async_channel::Receiver<WindowEvent>,
}

type Timer = Option<Pin<Box<Sleep>>>;

enum Wake {
    Control(Option<ControlCommand>),
    Inbox(Option<Envelope>),
    Tunnel(Option<TunnelEvent>),
    HandoffDeadline,
    ReconnectDue,
}

async fn wait_for(timer: &mut Timer) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

pub struct SessionWindow {
    options: WindowOptions,
    machine: ConnectionStateMachine,
    handoff: HandoffProtocol,
    tunnel: TunnelClient,
    config: Option<SessionConfig>,
    presentation: Presentation,
    inbox: async_channel::Receiver<Envelope>,
    tunnel_rx: async_channel::Receiver<TunnelEvent>,
    control_rx: async_channel::Receiver<ControlCommand>,
    ui_tx: async_channel::Sender<WindowEvent>,
    last_published: Option<ConnectionStatus>,
    handoff_deadline: Timer,
    reconnect_timer: Timer,
}

impl SessionWindow {
    pub fn new(
        options: WindowOptions,
        store: SessionStore,
        opener: Option<Arc<dyn Opener>>,
        inbox: async_channel::Receiver<Envelope>,
        sink: Arc<dyn FrameSink>,
        runtime: tokio::runtime::Handle,
    ) -> (Self, WindowHandle) {
        let (tunnel_tx, tunnel_rx) = async_channel::bounded::<TunnelEvent>(256);
        let (control_tx, control_rx) = async_channel::unbounded::<ControlCommand>();
        let (ui_tx, ui_rx) = async_channel::unbounded::<WindowEvent>();

        let handoff = HandoffProtocol::new(options.origin.clone(), opener, store);
        let tunnel = TunnelClient::new(options.gateway_url.clone(), runtime, sink, tunnel_tx);

        let window = Self {
            options,
            machine: ConnectionStateMachine::new(),
            handoff,
            tunnel,
            config: None,
            presentation: Presentation::default(),
            inbox,
            tunnel_rx,
            control_rx,
            ui_tx,
            last_published: None,
            handoff_deadline: None,
            reconnect_timer: None,
        };
        let handle = WindowHandle {
            controls: SessionControls::new(control_tx),
            events: ui_rx,
        };
        (window, handle)
    }

    pub fn status(&self) -> ConnectionStatus {
        self.machine.status()
    }

    pub fn presentation(&self) -> Presentation {
        self.presentation
    }

    /// Run until closed through the controls or until every control handle
    /// is dropped. Always disconnects before returning the final status.
    pub async fn run(mut self) -> ConnectionStatus {
        self.startup();

        let control_rx = self.control_rx.clone();
        let inbox = self.inbox.clone();
        let tunnel_rx = self.tunnel_rx.clone();
        let mut inbox_open = true;

        loop {
            let wake = tokio::select! {
                cmd = control_rx.recv() => Wake::Control(cmd.ok()),
                envelope = inbox.recv(), if inbox_open => Wake::Inbox(envelope.ok()),
                event = tunnel_rx.recv() => Wake::Tunnel(event.ok()),
                _ = wait_for(&mut self.handoff_deadline) => Wake::HandoffDeadline,
                _ = wait_for(&mut self.reconnect_timer) => Wake::ReconnectDue,
            };

            match wake {
                Wake::Control(None) | Wake::Control(Some(ControlCommand::Close)) => break,
                Wake::Control(Some(command)) => self.on_control(command),
                Wake::Inbox(Some(envelope)) => self.on_envelope(&envelope),
                Wake::Inbox(None) => {
                    log::debug!("Handoff inbox closed");
                    inbox_open = false;
                }
                Wake::Tunnel(Some(event)) => self.on_tunnel_event(event),
                Wake::Tunnel(None) => {}
                Wake::HandoffDeadline => self.on_handoff_deadline(),
                Wake::ReconnectDue => self.on_reconnect_due(),
            }
        }

        self.teardown();
        self.machine.status()
    }

    fn startup(&mut self) {
        self.apply(MachineEvent::Startup);
        match self.handoff.restore() {
            Some(config) => self.deliver(config),
            None => {
                self.handoff.request();
                self.arm_handoff_deadline();
            }
        }
    }

    fn deliver(&mut self, config: SessionConfig) {
        self.config = Some(config);
        self.handoff_deadline = None;
        self.apply(MachineEvent::ConfigDelivered);
    }

    fn on_envelope(&mut self, envelope: &Envelope) {
        if let HandoffOutcome::Delivered(config) = self.handoff.handle(envelope) {
            self.deliver(config);
        }
    }

    fn on_tunnel_event(&mut self, event: TunnelEvent) {
        if !self.tunnel.accepts(event.generation) {
            log::debug!("Dropped event from superseded tunnel #{}", event.generation);
            return;
        }
        match event.kind {
            TunnelEventKind::Connected => self.apply(MachineEvent::TunnelConnected),
            TunnelEventKind::Failed(err) => self.apply(MachineEvent::TunnelFailed(err.detail())),
        }
    }

    fn on_control(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::Reconnect => {
                log::info!("Reconnect requested");
                self.apply(MachineEvent::ReconnectRequested {
                    config_held: self.config.is_some(),
                });
            }
            ControlCommand::ToggleFullscreen => {
                self.presentation.toggle_fullscreen();
                self.publish_presentation();
            }
            ControlCommand::ToggleKeyboard => {
                self.presentation.toggle_keyboard();
                self.publish_presentation();
            }
            ControlCommand::Close => {}
        }
    }

    fn on_handoff_deadline(&mut self) {
        self.handoff_deadline = None;
        if !self.handoff.is_delivered() {
            log::warn!(
                "No session config after {:?}",
                self.options.handoff_timeout
            );
            self.apply(MachineEvent::HandoffTimedOut);
        }
    }

    fn on_reconnect_due(&mut self) {
        self.reconnect_timer = None;
        if self.machine.state() == ConnectionState::Connecting {
            self.connect_now();
        }
    }

    fn teardown(&mut self) {
        self.reconnect_timer = None;
        self.handoff_deadline = None;
        self.apply(MachineEvent::Teardown);
        // Unconditional, even if the machine rejected the event
        self.tunnel.disconnect();
        log::info!("Session window closed");
    }

    fn apply(&mut self, event: MachineEvent) {
        match self.machine.apply(event) {
            Ok(effects) => {
                self.publish_status();
                for effect in effects {
                    self.run_effect(effect);
                }
            }
            Err(e) => log::debug!("Ignored event: {}", e),
        }
    }

    fn run_effect(&mut self, effect: Effect) {
        match effect {
            Effect::Connect => self.connect_now(),
            Effect::Disconnect => self.tunnel.disconnect(),
            Effect::ScheduleReconnect => {
                // Replacing the timer collapses rapid repeated requests into one connect
                self.reconnect_timer = Some(Box::pin(tokio::time::sleep(self.options.reconnect_delay)));
            }
            Effect::RequestConfig => {
                self.handoff.request();
                self.arm_handoff_deadline();
            }
        }
    }

    fn connect_now(&mut self) {
        let Some(config) = self.config.clone() else {
            return;
        };
        if let Err(e) = self.tunnel.connect(&config) {
            log::warn!("Cannot open tunnel: {}", e);
            self.apply(MachineEvent::TunnelFailed(e.detail()));
        }
    }

    fn arm_handoff_deadline(&mut self) {
        self.handoff_deadline = Some(Box::pin(tokio::time::sleep(self.options.handoff_timeout)));
    }

    fn publish_status(&mut self) {
        let status = self.machine.status();
        if self.last_published.as_ref() == Some(&status) {
            return;
        }
        log::info!(
            "Status: {}{}",
            status.state.display_name(),
            status
                .detail
                .as_deref()
                .map(|d| format!(" ({})", d))
                .unwrap_or_default()
        );
        self.last_published = Some(status.clone());
        let _ = self.ui_tx.try_send(WindowEvent::StatusChanged(status));
    }

    fn publish_presentation(&self) {
        let _ = self
            .ui_tx
            .try_send(WindowEvent::PresentationChanged(self.presentation));
    }
}
