pub mod connection;
pub mod controls;
pub mod machine;
pub mod types;

pub use connection::TunnelClient;
pub use controls::{ControlCommand, SessionControls};
pub use machine::{ConnectionStateMachine, Effect, MachineEvent};
pub use types::{ConnectionState, ConnectionStatus, FrameSink, NullSink, TunnelEvent, TunnelEventKind};
