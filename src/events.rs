//! Host-visible events.
//!
//! The session surfaces exactly the notifications a host cares about; every
//! internal fault that does not change what the host should do is logged
//! instead. Function invocations go out on a separate sink so hosts that only
//! track session lifecycle never see per-call traffic.

use std::sync::Arc;

use crate::functions::ParameterValue;

/// Lifecycle and conversation notifications delivered to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The transport reached `Open` and the session configuration was sent
    Connected,
    /// The connection closed (any path); fired exactly once per disconnect
    Disconnected,
    /// First audio chunk of a capture run was sent
    CaptureStarted,
    /// Capture stopped after having sent at least one chunk
    CaptureStopped,
    /// The assistant started a turn (in-flight count went 0 to 1)
    ResponseStarted,
    /// Final transcript text of a completed turn
    ResponseText(String),
    /// The assistant finished speaking and playback drained
    ResponseFinished,
    /// The conversation-end heuristic fired (trailing `;`)
    CommunicationFinished,
    /// A vision sub-request was accepted and is in flight
    VisionRequested,
    /// The vision sub-request completed (answer or apology already queued)
    VisionFinished,
}

/// Function-call notifications delivered to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionEvent {
    /// A declared function matched; fired before any parameter is emitted
    Invoked {
        /// Declared function name
        name: String,
    },
    /// One coerced parameter of an invoked function
    Parameter {
        /// Declared function name
        function: String,
        /// Declared parameter name
        name: String,
        /// The typed, coerced value
        value: ParameterValue,
    },
}

/// Sink for [`SessionEvent`]s. Invoked on the tick thread, never concurrently.
pub type EventSink = Arc<dyn Fn(SessionEvent) + Send + Sync>;

/// Sink for [`FunctionEvent`]s. Invoked on the tick thread, never concurrently.
pub type FunctionSink = Arc<dyn Fn(FunctionEvent) + Send + Sync>;

/// An event sink that discards everything.
pub fn null_event_sink() -> EventSink {
    Arc::new(|_| {})
}

/// A function sink that discards everything.
pub fn null_function_sink() -> FunctionSink {
    Arc::new(|_| {})
}
