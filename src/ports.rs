//! Ports to the session's external collaborators.
//!
//! The core never talks to a socket, an HTTP endpoint, an audio device or the
//! vision agent directly — it depends on these traits. Production adapters
//! live in [`crate::transport`] and [`crate::token`]; tests substitute fakes.
//! All asynchronous ports complete on foreign contexts, so their results must
//! re-enter the session through the action queue, never by direct mutation.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::errors::{DeviceError, TokenError, TransportError, VisionError};

// =============================================================================
// Ephemeral Token
// =============================================================================

/// A short-lived bearer credential, obtained per connection attempt.
///
/// Owned exclusively by the session and cleared (and zeroized) on every
/// disconnect.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EphemeralToken {
    /// The bearer secret
    pub secret: String,
    /// Expiry as a unix timestamp, when the issuer reports one
    pub expires_at: Option<u64>,
}

impl fmt::Debug for EphemeralToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralToken")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Asynchronous token acquisition.
///
/// Exactly one of success or failure is expected per call, after an arbitrary
/// delay.
#[async_trait]
pub trait TokenPort: Send + Sync {
    /// Acquire a fresh ephemeral token.
    async fn acquire(&self) -> Result<EphemeralToken, TokenError>;
}

// =============================================================================
// Transport
// =============================================================================

/// Connection state reported by a transport adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    /// No connection
    #[default]
    Closed,
    /// Handshake in progress
    Connecting,
    /// Connected and ready
    Open,
    /// Close requested, not yet confirmed
    Closing,
}

/// Events a transport delivers through its installed sink.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The connection reached `Open`
    Opened,
    /// The connection closed, normally or not
    Closed {
        /// Close code when the peer supplied one
        code: Option<u16>,
        /// Close reason text
        reason: String,
    },
    /// A transport-level fault
    Error(String),
    /// One inbound text message
    Message(String),
}

/// Sink a transport delivers its events into.
///
/// Invoked from `dispatch_pending` on the tick thread; implementations should
/// only enqueue into the action queue.
pub type TransportSink = Arc<dyn Fn(TransportEvent) + Send + Sync>;

/// A duplex text-message transport, created per connection attempt.
pub trait Transport: Send {
    /// Begin connecting, delivering subsequent events into `sink`.
    fn open(&mut self, sink: TransportSink) -> Result<(), TransportError>;

    /// Request close. Safe to call in any state.
    fn close(&mut self);

    /// Send one text message.
    fn send_text(&mut self, text: &str) -> Result<(), TransportError>;

    /// Deliver buffered events into the sink, on the caller's thread.
    fn dispatch_pending(&mut self);

    /// Current connection state.
    fn state(&self) -> TransportState;
}

/// Builds a fresh transport for one connection attempt.
pub trait TransportFactory: Send {
    /// Create a transport authenticated with `token`.
    fn create(&self, token: &EphemeralToken) -> Box<dyn Transport>;
}

impl<F> TransportFactory for F
where
    F: Fn(&EphemeralToken) -> Box<dyn Transport> + Send,
{
    fn create(&self, token: &EphemeralToken) -> Box<dyn Transport> {
        self(token)
    }
}

// =============================================================================
// Vision Agent
// =============================================================================

/// The secondary prompt-answering agent.
#[async_trait]
pub trait VisionAgent: Send + Sync {
    /// Answer a generated prompt, after an arbitrary delay.
    async fn answer(&self, prompt: String) -> Result<String, VisionError>;
}

// =============================================================================
// Audio Capture Device
// =============================================================================

/// A microphone device exposing a circular sample buffer.
///
/// The pipeline tracks its own read cursor and handles wraparound; the device
/// only reports where the write head is and copies ranges out.
pub trait CaptureDevice: Send {
    /// Start recording.
    fn start(&mut self) -> Result<(), DeviceError>;

    /// Stop recording.
    fn stop(&mut self);

    /// Whether the device is currently recording. Devices may silently stop;
    /// the pipeline restarts them when this turns false unexpectedly.
    fn is_recording(&self) -> bool;

    /// Device sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Capacity of the circular buffer, in samples.
    fn buffer_len(&self) -> usize;

    /// Current write position within the circular buffer.
    fn write_cursor(&self) -> usize;

    /// Copy `count` samples starting at `start` (wrapping) into `out`.
    fn read_into(&self, start: usize, count: usize, out: &mut Vec<f32>);
}
