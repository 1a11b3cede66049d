//! Session configuration.
//!
//! All knobs a host can set before constructing a session: wire audio format,
//! conversation behavior toggles, timing thresholds and the declared function
//! table. Loadable from YAML; every field has a default so partial files are
//! fine.
//!
//! # Example YAML
//! ```yaml
//! model: "gpt-4o-realtime-preview"
//! instructions: "You are a helpful robot."
//! voice: "alloy"
//! idle_timeout_secs: 30
//! reconnect_delay_ms: 3000
//! capture_enabled: true
//! functions:
//!   - name: set_door
//!     description: Open or close the door
//!     parameters:
//!       - name: state
//!         type: enum
//!         values: [Closed, Open]
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::core::session::heuristics::DEFAULT_ACKNOWLEDGEMENTS;
use crate::functions::FunctionDefinition;

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The file was not valid YAML for this schema
    #[error("Failed to parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Everything configurable about one session.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Model requested when acquiring the ephemeral token
    pub model: String,

    /// System instructions for the assistant
    pub instructions: Option<String>,

    /// Voice for audio output
    pub voice: Option<String>,

    /// Response modalities requested on every forced response
    pub modalities: Vec<String>,

    /// Input transcription model; `None` disables inbound transcription
    pub transcription_model: Option<String>,

    /// Sample rate of wire audio in both directions, Hz
    pub wire_sample_rate: u32,

    /// How often capture reads newly written samples, ms
    pub capture_interval_ms: u64,

    /// Silence threshold after which an open connection is force-closed, secs
    pub idle_timeout_secs: u64,

    /// Fixed delay before a scheduled reconnect fires, ms
    pub reconnect_delay_ms: u64,

    /// Caller preference: may the microphone be captured at all
    pub capture_enabled: bool,

    /// Re-enable the microphone when the assistant ends on a question
    pub reenable_mic_on_question: bool,

    /// Disable the microphone when the conversation-end marker fires
    pub disable_mic_on_end: bool,

    /// Single-word transcripts accepted as coherent input
    pub acknowledgements: Vec<String>,

    /// Reserved function name that routes to the vision agent
    pub vision_function: String,

    /// Functions the assistant may call
    pub functions: Vec<FunctionDefinition>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4o-realtime-preview".to_string(),
            instructions: None,
            voice: None,
            modalities: vec!["text".to_string(), "audio".to_string()],
            transcription_model: Some("whisper-1".to_string()),
            wire_sample_rate: 24000,
            capture_interval_ms: 100,
            idle_timeout_secs: 30,
            reconnect_delay_ms: 3000,
            capture_enabled: true,
            reenable_mic_on_question: true,
            disable_mic_on_end: true,
            acknowledgements: DEFAULT_ACKNOWLEDGEMENTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            vision_function: "request_visual_context".to_string(),
            functions: Vec::new(),
        }
    }
}

impl SessionOptions {
    /// Load options from a YAML file, filling missing fields with defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }

    /// Idle watchdog threshold.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Fixed reconnect delay.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Interval between capture reads.
    pub fn capture_interval(&self) -> Duration {
        Duration::from_millis(self.capture_interval_ms)
    }
}
