//! Interactive demo: a text-driven realtime session.
//!
//! Connects with `OPENAI_API_KEY`, forwards stdin lines as user messages and
//! logs everything the session surfaces. Runs with a silent microphone and no
//! camera, so capture and vision take their failure paths gracefully; a real
//! host supplies its own device and agent adapters.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use clap::Parser;
use tracing::info;

use voicelink::errors::{DeviceError, VisionError};
use voicelink::ports::{CaptureDevice, VisionAgent};
use voicelink::token::HttpTokenClient;
use voicelink::transport::WsTransportFactory;
use voicelink::{Session, SessionOptions, SessionPorts};

/// voicelink - realtime voice session demo
#[derive(Parser, Debug)]
#[command(name = "voicelink")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the configured model
    #[arg(short = 'm', long = "model")]
    model: Option<String>,
}

/// A microphone that records nothing. The capture pipeline sees an empty
/// ring buffer and never sends a chunk.
struct SilentMicrophone {
    recording: bool,
}

impl CaptureDevice for SilentMicrophone {
    fn start(&mut self) -> Result<(), DeviceError> {
        self.recording = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.recording = false;
    }

    fn is_recording(&self) -> bool {
        self.recording
    }

    fn sample_rate(&self) -> u32 {
        24000
    }

    fn buffer_len(&self) -> usize {
        0
    }

    fn write_cursor(&self) -> usize {
        0
    }

    fn read_into(&self, _start: usize, _count: usize, _out: &mut Vec<f32>) {}
}

/// No camera attached; every vision request takes the apology path.
struct NoCamera;

#[async_trait]
impl VisionAgent for NoCamera {
    async fn answer(&self, _prompt: String) -> Result<String, VisionError> {
        Err(VisionError::AgentFailed("no camera attached".to_string()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present, before anything reads the environment
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    // Must happen before any TLS connection is attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();
    let mut options = match &cli.config {
        Some(path) => SessionOptions::from_yaml_file(path)?,
        None => SessionOptions::default(),
    };
    if let Some(model) = cli.model {
        options.model = model;
    }

    let api_key = std::env::var("OPENAI_API_KEY")
        .map_err(|_| anyhow!("OPENAI_API_KEY is not set"))?;

    let runtime = tokio::runtime::Handle::current();
    let ports = SessionPorts {
        token: Arc::new(HttpTokenClient::new(
            api_key,
            options.model.clone(),
            options.voice.clone(),
        )),
        transport: Box::new(WsTransportFactory::for_model(&options.model, runtime.clone())),
        vision: Arc::new(NoCamera),
        capture: Box::new(SilentMicrophone { recording: false }),
        render_sample_rate: options.wire_sample_rate,
        runtime,
    };

    let tick_interval = options.capture_interval();
    let mut session = Session::new(options, ports);
    session.set_event_sink(Arc::new(|event| info!(?event, "session event")));
    session.set_function_sink(Arc::new(|event| info!(?event, "function event")));
    let playback = session.playback_queue();

    session.connect();
    println!("Type a message and press enter. /quit exits.");

    // Blocking stdin reader feeding the select loop
    let (stdin_tx, mut stdin_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    std::thread::spawn(move || {
        let mut line = String::new();
        loop {
            line.clear();
            match std::io::stdin().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if stdin_tx.send(line.clone()).is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut ticker = tokio::time::interval(Duration::from_millis(
        tick_interval.as_millis().max(10) as u64 / 2,
    ));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                session.tick();
                // No audio output here; drain so turns can complete
                while playback.pop().is_some() {}
            }
            line = stdin_rx.recv() => match line {
                Some(line) => {
                    let text = line.trim();
                    if text == "/quit" {
                        break;
                    }
                    if !text.is_empty() {
                        session.send_user_text(text);
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.disconnect();
    info!("session closed");
    Ok(())
}
