pub mod client;
pub mod error;
pub mod handoff;
pub mod settings;
pub mod store;
pub mod types;
pub mod window;
pub mod ws;

pub use client::{ConnectionState, ConnectionStatus, FrameSink, SessionControls, TunnelClient};
pub use error::BridgeError;
pub use handoff::{Envelope, HandoffMessage, HandoffProtocol, Opener};
pub use settings::BridgeSettings;
pub use store::SessionStore;
pub use types::{Presentation, SessionConfig, StoredSessionRecord};
pub use window::{SessionWindow, WindowEvent, WindowHandle, WindowOptions};
