//! Error types for the voicelink session core.
//!
//! The taxonomy mirrors how faults are routed at runtime: transport and token
//! failures feed the reconnection controller, data errors drop the offending
//! unit and keep processing, device errors force the capture preference off.
//! No error in this crate is fatal to the process; the session always tries
//! to return to `Open` unless it has been explicitly shut down.

use thiserror::Error;

/// Errors raised by the transport adapter (connect/send failures).
#[derive(Debug, Error)]
pub enum TransportError {
    /// The WebSocket connection could not be established
    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    /// Sending a message on an open connection failed
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Operation attempted while the transport is not open
    #[error("Transport not open")]
    NotOpen,
}

/// Errors raised by the token-acquisition port.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The token endpoint could not be reached
    #[error("Token request failed: {0}")]
    RequestFailed(String),

    /// The token endpoint answered with a non-success status
    #[error("Token endpoint returned status {0}")]
    Status(u16),

    /// The token response body could not be understood
    #[error("Malformed token response: {0}")]
    Malformed(String),
}

/// Errors in inbound data: malformed JSON, decode failures, coercion failures.
///
/// A `DataError` never tears anything down. The offending unit (one message,
/// one function call, or one parameter) is logged and dropped.
#[derive(Debug, Error)]
pub enum DataError {
    /// An inbound envelope was not valid JSON
    #[error("Malformed message: {0}")]
    MalformedJson(String),

    /// A base64 payload failed to decode
    #[error("Base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),

    /// A parameter value could not be coerced to its declared kind
    #[error("Cannot coerce {value:?} to {kind}")]
    Coercion {
        /// Declared parameter kind name
        kind: &'static str,
        /// The raw value that failed to parse
        value: String,
    },
}

/// Errors reported by the audio capture device port.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The capture device failed to start
    #[error("Capture device failed to start: {0}")]
    StartFailed(String),

    /// The capture device failed while recording
    #[error("Capture device fault: {0}")]
    Fault(String),
}

/// Errors raised by the vision sub-agent port.
#[derive(Debug, Error)]
pub enum VisionError {
    /// The agent rejected or could not answer the prompt
    #[error("Vision agent failed: {0}")]
    AgentFailed(String),

    /// The function call carried no usable prompt
    #[error("Vision request had no prompt")]
    MissingPrompt,
}
