/// Commands sent from the UI to the session window loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlCommand {
    /// Force a disconnect + reconnect cycle
    Reconnect,
    ToggleFullscreen,
    ToggleKeyboard,
    /// Tear the window down
    Close,
}

/// Cloneable handle the UI uses to drive a session window.
///
/// Holds no state of its own; every call is a message to the window.
#[derive(Clone)]
pub struct SessionControls {
    tx: async_channel::Sender<ControlCommand>,
}

impl SessionControls {
    pub fn new(tx: async_channel::Sender<ControlCommand>) -> Self {
        Self { tx }
    }

    pub fn reconnect(&self) {
        self.send(ControlCommand::Reconnect);
    }

    pub fn toggle_fullscreen(&self) {
        self.send(ControlCommand::ToggleFullscreen);
    }

    pub fn toggle_keyboard(&self) {
        self.send(ControlCommand::ToggleKeyboard);
    }

    pub fn close(&self) {
        self.send(ControlCommand::Close);
    }

    fn send(&self, command: ControlCommand) {
        if self.tx.try_send(command).is_err() {
            log::debug!("Session window gone, dropped {:?}", command);
        }
    }
}
