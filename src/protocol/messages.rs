//! Typed client and server events.
//!
//! Client events (sent to server):
//! - session.update - declare audio format, tool schema and turn detection
//! - input_audio_buffer.append - append a base64 PCM16 chunk
//! - conversation.item.create - add a user or system text item
//! - response.create - request a response with explicit modalities
//!
//! Server events (received from server):
//! - session.created / session.updated - connection acknowledgements
//! - response.created / response.done - turn boundaries
//! - response.audio.delta - streamed PCM16 audio
//! - response.text.delta/done, response.audio_transcript.delta/done - text
//! - response.function_call_arguments.delta/done - streamed call arguments
//! - conversation.item.created
//! - conversation.item.input_audio_transcription.completed
//! - error - server-reported fault (code + message)
//!
//! Fields this crate never reads are not modeled; serde ignores them.

use base64::prelude::*;
use serde::{Deserialize, Serialize};

// =============================================================================
// Session Configuration
// =============================================================================

/// Session configuration carried by `session.update`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Response modalities (text, audio)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Vec<String>>,

    /// System instructions for the assistant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    /// Voice for audio output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,

    /// Input audio format (e.g. "pcm16")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_format: Option<String>,

    /// Output audio format
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_format: Option<String>,

    /// Input audio transcription configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<InputAudioTranscription>,

    /// Turn detection configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_detection: Option<TurnDetection>,

    /// Declared tool schema
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDef>>,

    /// Tool choice strategy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
}

/// Input audio transcription configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputAudioTranscription {
    /// Transcription model (e.g. "whisper-1")
    pub model: String,
}

/// Turn detection configuration.
///
/// The session always disables automatic response creation: responses are
/// requested explicitly so the core stays in charge of turn pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TurnDetection {
    /// Server-side VAD
    #[serde(rename = "server_vad")]
    ServerVad {
        /// Activation threshold
        #[serde(skip_serializing_if = "Option::is_none")]
        threshold: Option<f32>,
        /// Audio prefix padding in ms
        #[serde(skip_serializing_if = "Option::is_none")]
        prefix_padding_ms: Option<u32>,
        /// Silence duration in ms
        #[serde(skip_serializing_if = "Option::is_none")]
        silence_duration_ms: Option<u32>,
        /// Whether the server creates a response on turn end
        #[serde(skip_serializing_if = "Option::is_none")]
        create_response: Option<bool>,
    },
    /// No turn detection
    #[serde(rename = "none")]
    None {},
}

/// One tool entry in the declared schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    /// Tool type (always "function")
    #[serde(rename = "type")]
    pub tool_type: String,
    /// Function name
    pub name: String,
    /// Function description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema for the parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

// =============================================================================
// Conversation Items
// =============================================================================

/// A conversation item, outbound or echoed back by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationItem {
    /// Item ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Item type ("message", "function_call", ...)
    #[serde(rename = "type")]
    pub item_type: String,
    /// Role (user, assistant, system)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Content parts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<ContentPart>>,
    /// Call ID for function-call items
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    /// Function name for function-call items
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Final argument text for function-call items
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
    /// Output text for function-call-output items
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl ConversationItem {
    /// A plain text message item with the given role.
    pub fn text_message(role: &str, text: &str) -> Self {
        Self {
            id: None,
            item_type: "message".to_string(),
            role: Some(role.to_string()),
            content: Some(vec![ContentPart {
                content_type: "input_text".to_string(),
                text: Some(text.to_string()),
                transcript: None,
            }]),
            call_id: None,
            name: None,
            arguments: None,
            output: None,
        }
    }

    /// Concatenated text of every content part that carries any.
    pub fn inline_text(&self) -> Option<String> {
        let parts = self.content.as_ref()?;
        let mut out = String::new();
        for part in parts {
            if let Some(text) = part.text.as_deref().or(part.transcript.as_deref()) {
                out.push_str(text);
            }
        }
        if out.is_empty() { None } else { Some(out) }
    }
}

/// Content part within a conversation item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentPart {
    /// Content type (input_text, text, audio, ...)
    #[serde(rename = "type")]
    pub content_type: String,
    /// Text content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Transcript of audio content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

// =============================================================================
// Client Events (sent to server)
// =============================================================================

/// Client events sent to the realtime endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Update session configuration
    #[serde(rename = "session.update")]
    SessionUpdate {
        /// Session configuration
        session: SessionConfig,
    },

    /// Append audio to the input buffer
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend {
        /// Base64-encoded PCM16 audio
        audio: String,
    },

    /// Create a conversation item
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate {
        /// Item to create
        item: ConversationItem,
    },

    /// Request a response
    #[serde(rename = "response.create")]
    ResponseCreate {
        /// Response configuration
        response: ResponseRequest,
    },
}

/// Configuration for an explicit response request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResponseRequest {
    /// Response modalities
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Vec<String>>,
}

impl ClientEvent {
    /// An audio append event from raw PCM16 bytes.
    pub fn audio_append(data: &[u8]) -> Self {
        ClientEvent::InputAudioBufferAppend {
            audio: BASE64_STANDARD.encode(data),
        }
    }

    /// A user text message.
    pub fn user_text(text: &str) -> Self {
        ClientEvent::ConversationItemCreate {
            item: ConversationItem::text_message("user", text),
        }
    }

    /// A system text message.
    pub fn system_text(text: &str) -> Self {
        ClientEvent::ConversationItemCreate {
            item: ConversationItem::text_message("system", text),
        }
    }

    /// A response request with the given modalities.
    pub fn response_create(modalities: &[String]) -> Self {
        ClientEvent::ResponseCreate {
            response: ResponseRequest {
                modalities: Some(modalities.to_vec()),
            },
        }
    }
}

// =============================================================================
// Server Events (received from server)
// =============================================================================

/// Server events received from the realtime endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Server-reported error
    #[serde(rename = "error")]
    Error {
        /// Error details
        error: ApiError,
    },

    /// Session created acknowledgement
    #[serde(rename = "session.created")]
    SessionCreated {
        /// Session information
        session: SessionInfo,
    },

    /// Session updated acknowledgement
    #[serde(rename = "session.updated")]
    SessionUpdated {
        /// Session information
        session: SessionInfo,
    },

    /// Conversation item created
    #[serde(rename = "conversation.item.created")]
    ConversationItemCreated {
        /// Created item
        item: ConversationItem,
    },

    /// Input audio transcription completed
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    TranscriptionCompleted {
        /// Item ID
        #[serde(default)]
        item_id: String,
        /// Transcript text
        transcript: String,
    },

    /// Response generation started
    #[serde(rename = "response.created")]
    ResponseCreated {
        /// Response information
        response: ResponseInfo,
    },

    /// Response generation finished
    #[serde(rename = "response.done")]
    ResponseDone {
        /// Response information, including function-call output items
        response: ResponseInfo,
    },

    /// Text delta
    #[serde(rename = "response.text.delta")]
    TextDelta {
        /// Text fragment
        delta: String,
    },

    /// Text done
    #[serde(rename = "response.text.done")]
    TextDone {
        /// Full text
        #[serde(default)]
        text: String,
    },

    /// Audio transcript delta
    #[serde(rename = "response.audio_transcript.delta")]
    AudioTranscriptDelta {
        /// Transcript fragment
        delta: String,
    },

    /// Audio transcript done
    #[serde(rename = "response.audio_transcript.done")]
    AudioTranscriptDone {
        /// Full transcript
        #[serde(default)]
        transcript: String,
    },

    /// Audio delta (base64 PCM16 chunk)
    #[serde(rename = "response.audio.delta")]
    AudioDelta {
        /// Base64-encoded audio fragment
        delta: String,
    },

    /// Function call arguments delta
    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta {
        /// Call ID
        call_id: String,
        /// Argument text fragment
        delta: String,
    },

    /// Function call arguments done
    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        /// Call ID
        call_id: String,
        /// Full argument text
        #[serde(default)]
        arguments: String,
    },
}

impl ServerEvent {
    /// Decode the base64 payload of an audio delta.
    pub fn decode_audio_delta(delta: &str) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64_STANDARD.decode(delta)
    }
}

// =============================================================================
// Supporting Types
// =============================================================================

/// Server-reported error details.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    /// Error type
    #[serde(rename = "type", default)]
    pub error_type: String,
    /// Error code
    #[serde(default)]
    pub code: Option<String>,
    /// Error message
    #[serde(default)]
    pub message: String,
}

/// Session acknowledgement payload.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionInfo {
    /// Session ID
    pub id: String,
    /// Model backing the session
    #[serde(default)]
    pub model: String,
}

/// Response payload carried by response.created and response.done.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseInfo {
    /// Response ID
    pub id: String,
    /// Response status
    #[serde(default)]
    pub status: String,
    /// Output items (messages and function calls)
    #[serde(default)]
    pub output: Vec<ConversationItem>,
}
