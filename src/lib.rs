//! Realtime voice conversation sessions.
//!
//! A [`Session`] holds a duplex connection to a realtime conversational AI
//! endpoint: it streams microphone audio up, plays assistant audio back,
//! surfaces declared function calls as typed events, and routes a reserved
//! function call to a secondary vision agent. The host drives everything with
//! a steady [`Session::tick`]; all cross-thread results re-enter through an
//! internal action queue, so no host callback ever races another.
//!
//! External collaborators are ports ([`ports`]): production adapters for the
//! WebSocket transport and HTTP token endpoint live in [`transport`] and
//! [`token`], and hosts supply their own microphone device.

pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod functions;
pub mod ports;
pub mod protocol;
pub mod token;
pub mod transport;

// Re-export commonly used items for convenience
pub use config::{ConfigError, SessionOptions};
pub use core::{SampleQueue, Session, SessionPorts, SessionState};
pub use events::{EventSink, FunctionEvent, FunctionSink, SessionEvent};
pub use functions::{FunctionDefinition, ParameterKind, ParameterSpec, ParameterValue};
