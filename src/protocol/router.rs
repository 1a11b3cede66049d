//! Inbound envelope parsing.
//!
//! The discriminator is inspected before full decoding so that an unknown
//! message type can be told apart from a malformed one: unknown types are
//! dropped at debug level, malformed payloads are dropped with the raw text
//! recorded. Neither is ever fatal.

use crate::protocol::messages::ServerEvent;

/// Message types the router dispatches. Anything else is logged and dropped.
const HANDLED_TYPES: &[&str] = &[
    "error",
    "session.created",
    "session.updated",
    "conversation.item.created",
    "conversation.item.input_audio_transcription.completed",
    "response.created",
    "response.done",
    "response.text.delta",
    "response.text.done",
    "response.audio_transcript.delta",
    "response.audio_transcript.done",
    "response.audio.delta",
    "response.function_call_arguments.delta",
    "response.function_call_arguments.done",
];

/// Parse one raw inbound envelope into a typed event.
///
/// Returns `None` for unknown types and malformed payloads, logging either
/// case, so the caller only ever sees events it knows how to handle.
pub fn parse_server_event(raw: &str) -> Option<ServerEvent> {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, payload = raw, "dropping malformed inbound message");
            return None;
        }
    };

    let message_type = value
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or("")
        .to_owned();
    if !HANDLED_TYPES.contains(&message_type.as_str()) {
        tracing::debug!(message_type, "dropping unhandled message type");
        return None;
    }

    match serde_json::from_value::<ServerEvent>(value) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!(
                message_type,
                error = %e,
                payload = raw,
                "dropping message that failed to decode"
            );
            None
        }
    }
}
