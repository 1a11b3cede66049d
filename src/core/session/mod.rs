//! The session state controller.
//!
//! One [`Session`] owns a live conversation: token acquisition, the transport
//! lifecycle, capture and playback, turn accounting, function dispatch and the
//! vision sub-request. All state transitions happen on the host tick thread;
//! results from foreign contexts (token futures, the transport reader, the
//! vision agent) re-enter through the action queue and are fenced by a
//! connection epoch, so a callback from a dead connection can never corrupt a
//! live one.
//!
//! ```text
//! Disconnected -> AcquiringToken -> Connecting -> Open -> Closing
//!       ^                                                   |
//!       +----------------- ReconnectPending <---------------+
//! ```

pub mod heuristics;
pub mod reconnect;

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::SessionOptions;
use crate::core::capture::CapturePipeline;
use crate::core::playback::PlaybackPipeline;
use crate::core::queue::SampleQueue;
use crate::core::responses::ResponseTracker;
use crate::core::serializer::ActionQueue;
use crate::core::vision::{self, VisionRequestState};
use crate::errors::{TokenError, TransportError, VisionError};
use crate::events::{EventSink, FunctionSink, SessionEvent, null_event_sink, null_function_sink};
use crate::functions::FunctionRegistry;
use crate::functions::dispatch::{FunctionCallBuffer, VisionCall, process_response_calls};
use crate::ports::{
    CaptureDevice, EphemeralToken, TokenPort, Transport, TransportEvent, TransportFactory,
    VisionAgent,
};
use crate::protocol::messages::{
    ApiError, ClientEvent, InputAudioTranscription, ResponseInfo, SessionConfig, ToolDef,
    TurnDetection,
};
use crate::protocol::parse_server_event;
use heuristics::{EndOfSpeechPredicate, SpeechOutcome, default_predicate, is_coherent};
use reconnect::{IdleWatchdog, ReconnectPolicy, RetryClass, classify_error};

/// How long a requested close may stay unconfirmed before it is forced.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(15);

// =============================================================================
// Session State
// =============================================================================

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No connection and nothing in progress
    #[default]
    Disconnected,
    /// An ephemeral token is being fetched
    AcquiringToken,
    /// The transport handshake is in progress
    Connecting,
    /// Connected; the session configuration has been sent
    Open,
    /// A close was requested and is awaiting confirmation
    Closing,
    /// A reconnect is scheduled and waiting for its deadline
    ReconnectPending,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::AcquiringToken => "acquiring_token",
            SessionState::Connecting => "connecting",
            SessionState::Open => "open",
            SessionState::Closing => "closing",
            SessionState::ReconnectPending => "reconnect_pending",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Ports Bundle
// =============================================================================

/// Everything external a session needs, bundled for construction.
pub struct SessionPorts {
    /// Ephemeral token acquisition
    pub token: Arc<dyn TokenPort>,
    /// Per-connection transport factory
    pub transport: Box<dyn TransportFactory>,
    /// The vision sub-request agent
    pub vision: Arc<dyn VisionAgent>,
    /// Microphone device
    pub capture: Box<dyn CaptureDevice>,
    /// Sample rate of the render device draining the playback queue, Hz
    pub render_sample_rate: u32,
    /// Runtime that asynchronous port futures are spawned on
    pub runtime: tokio::runtime::Handle,
}

// =============================================================================
// Session
// =============================================================================

/// A realtime conversation session, advanced by host ticks.
///
/// Construct, optionally install sinks, then call [`Session::connect`] and
/// [`Session::tick`] at a steady cadence (the capture interval is a good one).
pub struct Session {
    inner: SessionInner,
    actions: ActionQueue<SessionInner>,
}

impl Session {
    /// Create a session over the given ports.
    pub fn new(options: SessionOptions, ports: SessionPorts) -> Self {
        let now = Instant::now();
        let actions = ActionQueue::new();
        let registry = FunctionRegistry::new(options.functions.clone());
        let mut capture = CapturePipeline::new(
            ports.capture,
            options.capture_interval(),
            options.wire_sample_rate,
        );
        capture.set_enabled(options.capture_enabled);
        let playback = PlaybackPipeline::new(options.wire_sample_rate, ports.render_sample_rate);
        let reconnect = ReconnectPolicy::new(options.reconnect_delay());
        let idle = IdleWatchdog::new(options.idle_timeout(), now);

        let inner = SessionInner {
            options,
            state: SessionState::Disconnected,
            shutting_down: false,
            epoch: 0,
            now,
            token: None,
            transport: None,
            transport_factory: ports.transport,
            token_port: ports.token,
            vision_agent: ports.vision,
            runtime: ports.runtime,
            actions: actions.clone(),
            registry,
            tracker: ResponseTracker::new(),
            call_buffer: FunctionCallBuffer::default(),
            vision: VisionRequestState::default(),
            capture,
            playback,
            reconnect,
            idle,
            close_deadline: None,
            predicate: default_predicate(),
            events: null_event_sink(),
            function_sink: null_function_sink(),
            speaking: false,
            waiting_to_finish: false,
            finished_transcript: String::new(),
        };
        Self { inner, actions }
    }

    /// Install the lifecycle event sink. Call before connecting.
    pub fn set_event_sink(&mut self, sink: EventSink) {
        self.inner.events = sink;
    }

    /// Install the function-call event sink. Call before connecting.
    pub fn set_function_sink(&mut self, sink: FunctionSink) {
        self.inner.function_sink = sink;
    }

    /// Replace the end-of-speech rule. Call before connecting.
    pub fn set_end_of_speech_predicate(&mut self, predicate: EndOfSpeechPredicate) {
        self.inner.predicate = predicate;
    }

    /// Begin connecting. A no-op while a connection attempt or connection is
    /// already underway, and after shutdown.
    pub fn connect(&mut self) {
        self.inner.now = Instant::now();
        self.inner.connect();
    }

    /// Shut the session down synchronously. Terminal: no reconnect follows.
    pub fn disconnect(&mut self) {
        self.inner.now = Instant::now();
        self.inner.shutdown();
    }

    /// Advance the session one tick at the current time.
    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    /// Advance the session one tick at an explicit time.
    ///
    /// Order per tick: deliver buffered transport events, drain the action
    /// queue, then advance timers, playback polling and capture.
    pub fn tick_at(&mut self, now: Instant) {
        self.inner.now = now;
        if let Some(transport) = self.inner.transport.as_mut() {
            transport.dispatch_pending();
        }
        self.actions.drain_into(&mut self.inner);
        self.inner.advance(now);
    }

    /// Send a user text message and request a response for it.
    pub fn send_user_text(&mut self, text: &str) {
        self.inner.send_client_event(ClientEvent::user_text(text));
        self.inner.force_response();
    }

    /// Explicitly request a response with the configured modalities.
    pub fn request_response(&mut self) {
        self.inner.force_response();
    }

    /// Set the caller's capture preference. Disabling stops a running capture.
    pub fn set_capture_enabled(&mut self, enabled: bool) {
        self.inner.capture.set_enabled(enabled);
        if !enabled {
            self.inner.capture.stop(&self.inner.events);
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.inner.state
    }

    /// Whether the connection is open.
    pub fn is_connected(&self) -> bool {
        self.inner.state == SessionState::Open
    }

    /// Handle to the playback sample queue, for the host's render callback.
    pub fn playback_queue(&self) -> SampleQueue {
        self.inner.playback.queue()
    }
}

// =============================================================================
// Inner State
// =============================================================================

/// All mutable session state. Only ever touched on the tick thread.
struct SessionInner {
    options: SessionOptions,
    state: SessionState,
    shutting_down: bool,
    /// Bumped on every disconnect; callbacks carrying an older value are stale
    epoch: u64,
    /// Time of the current tick
    now: Instant,
    token: Option<EphemeralToken>,
    transport: Option<Box<dyn Transport>>,
    transport_factory: Box<dyn TransportFactory>,
    token_port: Arc<dyn TokenPort>,
    vision_agent: Arc<dyn VisionAgent>,
    runtime: tokio::runtime::Handle,
    actions: ActionQueue<SessionInner>,
    registry: FunctionRegistry,
    tracker: ResponseTracker,
    call_buffer: FunctionCallBuffer,
    vision: VisionRequestState,
    capture: CapturePipeline,
    playback: PlaybackPipeline,
    reconnect: ReconnectPolicy,
    idle: IdleWatchdog,
    close_deadline: Option<Instant>,
    predicate: EndOfSpeechPredicate,
    events: EventSink,
    function_sink: FunctionSink,
    /// The assistant holds the floor, from first created to finish-speaking
    speaking: bool,
    /// All turns done; polling playback for the drain
    waiting_to_finish: bool,
    finished_transcript: String,
}

impl SessionInner {
    fn emit(&self, event: SessionEvent) {
        (self.events)(event);
    }

    // -------------------------------------------------------------------------
    // Connection lifecycle
    // -------------------------------------------------------------------------

    fn connect(&mut self) {
        if self.shutting_down {
            return;
        }
        match self.state {
            SessionState::AcquiringToken
            | SessionState::Connecting
            | SessionState::Open
            | SessionState::ReconnectPending => {
                tracing::debug!(state = %self.state, "connect ignored");
                return;
            }
            SessionState::Disconnected | SessionState::Closing => {}
        }

        tracing::info!(model = %self.options.model, "acquiring ephemeral token");
        self.state = SessionState::AcquiringToken;

        let epoch = self.epoch;
        let port = self.token_port.clone();
        let queue = self.actions.clone();
        self.runtime.spawn(async move {
            let result = port.acquire().await;
            queue.push(move |s: &mut SessionInner| s.on_token_result(epoch, result));
        });
    }

    fn on_token_result(&mut self, epoch: u64, result: Result<EphemeralToken, TokenError>) {
        if self.shutting_down || epoch != self.epoch {
            tracing::debug!("stale token result dropped");
            return;
        }
        if self.state != SessionState::AcquiringToken {
            tracing::warn!(state = %self.state, "token result in unexpected state, dropping");
            return;
        }

        let token = match result {
            Ok(token) => token,
            Err(e) => {
                tracing::error!(error = %e, "token acquisition failed");
                self.fail_connection();
                return;
            }
        };

        tracing::info!("token acquired, opening transport");
        self.state = SessionState::Connecting;
        let mut transport = self.transport_factory.create(&token);
        self.token = Some(token);

        let sink = self.transport_sink();
        match transport.open(sink) {
            Ok(()) => self.transport = Some(transport),
            Err(e) => {
                tracing::error!(error = %e, "transport open failed");
                self.token = None;
                self.fail_connection();
            }
        }
    }

    /// A connection attempt died before the transport produced a close event.
    fn fail_connection(&mut self) {
        self.reset_communication_state();
        self.state = SessionState::Disconnected;
        self.emit(SessionEvent::Disconnected);
        if !self.shutting_down && self.reconnect.schedule(self.now) {
            self.state = SessionState::ReconnectPending;
        }
    }

    /// Sink installed into each transport. Only enqueues; the epoch taken here
    /// fences every event against later disconnects.
    fn transport_sink(&self) -> crate::ports::TransportSink {
        let epoch = self.epoch;
        let queue = self.actions.clone();
        Arc::new(move |event: TransportEvent| {
            queue.push(move |s: &mut SessionInner| s.on_transport_event(epoch, event));
        })
    }

    fn on_transport_event(&mut self, epoch: u64, event: TransportEvent) {
        if self.shutting_down || epoch != self.epoch {
            tracing::debug!("stale transport event dropped");
            return;
        }
        match event {
            TransportEvent::Opened => self.on_transport_open(),
            TransportEvent::Closed { code, reason } => self.on_transport_close(code, &reason),
            TransportEvent::Error(message) => {
                // The close that follows drives recovery
                tracing::error!(message, "transport error");
            }
            TransportEvent::Message(raw) => self.on_message(&raw),
        }
    }

    fn on_transport_open(&mut self) {
        tracing::info!("connection open");
        self.state = SessionState::Open;
        self.reconnect.cancel();
        self.idle.touch(self.now);

        let config = self.session_config();
        self.send_client_event(ClientEvent::SessionUpdate { session: config });
        self.emit(SessionEvent::Connected);
    }

    fn on_transport_close(&mut self, code: Option<u16>, reason: &str) {
        self.close_deadline = None;

        if self.state == SessionState::AcquiringToken {
            // A dying transport raced a fresh token acquisition; the
            // acquisition owns what happens next, so no reconnect from here.
            tracing::info!(?code, reason, "stale transport closed during token acquisition");
            self.transport = None;
            self.token = None;
            self.reset_communication_state();
            self.emit(SessionEvent::Disconnected);
            return;
        }
        if matches!(
            self.state,
            SessionState::Disconnected | SessionState::ReconnectPending
        ) {
            return;
        }

        tracing::info!(?code, reason, state = %self.state, "connection closed");
        self.capture.stop(&self.events);
        self.playback.stop();
        self.transport = None;
        self.token = None;
        self.epoch += 1;
        self.reset_communication_state();
        self.state = SessionState::Disconnected;
        self.emit(SessionEvent::Disconnected);

        if !self.shutting_down && self.reconnect.schedule(self.now) {
            self.state = SessionState::ReconnectPending;
        }
    }

    fn shutdown(&mut self) {
        if self.shutting_down {
            return;
        }
        tracing::info!("shutting down");
        self.shutting_down = true;
        self.reconnect.cancel();
        self.close_deadline = None;
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        self.token = None;
        self.epoch += 1;
        self.capture.stop(&self.events);
        self.playback.stop();
        self.reset_communication_state();
        let was_disconnected = self.state == SessionState::Disconnected;
        self.state = SessionState::Disconnected;
        if !was_disconnected {
            self.emit(SessionEvent::Disconnected);
        }
    }

    /// Request a close and let the normal close path (or its timeout) drive
    /// the reconnect.
    fn force_close(&mut self) {
        if self.state == SessionState::Closing {
            return;
        }
        self.state = SessionState::Closing;
        self.close_deadline = Some(self.now + CLOSE_TIMEOUT);
        if let Some(transport) = self.transport.as_mut() {
            transport.close();
        }
    }

    /// Clear every piece of per-conversation state. Runs exactly once per
    /// disconnect.
    fn reset_communication_state(&mut self) {
        self.tracker.reset();
        self.call_buffer.clear();
        self.vision.reset();
        self.speaking = false;
        self.waiting_to_finish = false;
        self.finished_transcript.clear();
    }

    // -------------------------------------------------------------------------
    // Tick advancement
    // -------------------------------------------------------------------------

    fn advance(&mut self, now: Instant) {
        self.now = now;
        if self.shutting_down {
            return;
        }

        if self.state == SessionState::Closing
            && self.close_deadline.is_some_and(|due| now >= due)
        {
            tracing::warn!("close not confirmed in time, forcing teardown");
            self.on_transport_close(None, "close timed out");
        }

        if self.reconnect.take_due(now) {
            self.transport = None;
            self.state = SessionState::Disconnected;
            self.connect();
        }

        if self.state == SessionState::Open && self.idle.expired(now) {
            tracing::warn!(
                threshold_secs = self.options.idle_timeout_secs,
                "idle threshold exceeded, forcing reconnect"
            );
            self.idle.touch(now);
            self.force_close();
        }

        if self.waiting_to_finish {
            if self.playback.is_draining() {
                // Still speaking as far as the user can hear
                self.idle.touch(now);
            } else {
                self.finish_speaking();
            }
        }

        if self.state == SessionState::Open {
            if self.capture_gate_open() {
                self.capture.start(now);
            }
            if let Some(transport) = self.transport.as_mut() {
                let idle = &mut self.idle;
                let mut send = |event: ClientEvent| -> Result<(), TransportError> {
                    let text = serde_json::to_string(&event)
                        .map_err(|e| TransportError::SendFailed(e.to_string()))?;
                    transport.send_text(&text)?;
                    idle.touch(now);
                    Ok(())
                };
                self.capture.tick(now, &mut send, &self.events);
            }
        }
    }

    /// Whether the microphone may run right now.
    fn capture_gate_open(&self) -> bool {
        self.capture.is_enabled()
            && self.state == SessionState::Open
            && !self.speaking
            && !self.waiting_to_finish
            && !self.vision.is_pending()
    }

    /// Playback drained after the last turn: close out the assistant's floor.
    fn finish_speaking(&mut self) {
        self.waiting_to_finish = false;
        self.speaking = false;
        let transcript = std::mem::take(&mut self.finished_transcript);
        self.emit(SessionEvent::ResponseFinished);

        match (self.predicate)(&transcript) {
            SpeechOutcome::ExpectsReply => {
                if self.options.reenable_mic_on_question {
                    self.capture.set_enabled(true);
                }
            }
            SpeechOutcome::ConversationEnded => {
                tracing::info!("conversation end signaled");
                if self.options.disable_mic_on_end {
                    self.capture.set_enabled(false);
                    self.capture.stop(&self.events);
                }
                self.emit(SessionEvent::CommunicationFinished);
            }
            SpeechOutcome::Neutral => {}
        }
    }

    // -------------------------------------------------------------------------
    // Outbound
    // -------------------------------------------------------------------------

    fn send_client_event(&mut self, event: ClientEvent) {
        let Some(transport) = self.transport.as_mut() else {
            tracing::warn!("dropping outbound event, no transport");
            return;
        };
        let text = match serde_json::to_string(&event) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize outbound event");
                return;
            }
        };
        if let Err(e) = transport.send_text(&text) {
            tracing::error!(error = %e, "send failed, forcing close");
            self.force_close();
            return;
        }
        self.idle.touch(self.now);
    }

    fn force_response(&mut self) {
        let modalities = self.options.modalities.clone();
        self.send_client_event(ClientEvent::response_create(&modalities));
    }

    /// The configuration sent right after the transport opens.
    fn session_config(&self) -> SessionConfig {
        let mut tools = self.registry.tool_schemas();
        tools.push(self.vision_tool());

        SessionConfig {
            modalities: Some(self.options.modalities.clone()),
            instructions: self.options.instructions.clone(),
            voice: self.options.voice.clone(),
            input_audio_format: Some("pcm16".to_string()),
            output_audio_format: Some("pcm16".to_string()),
            input_audio_transcription: self
                .options
                .transcription_model
                .clone()
                .map(|model| InputAudioTranscription { model }),
            // Response creation stays under this session's control
            turn_detection: Some(TurnDetection::ServerVad {
                threshold: None,
                prefix_padding_ms: None,
                silence_duration_ms: None,
                create_response: Some(false),
            }),
            tools: Some(tools),
            tool_choice: Some("auto".to_string()),
        }
    }

    /// The reserved tool the assistant calls to ask for visual context.
    fn vision_tool(&self) -> ToolDef {
        ToolDef {
            tool_type: "function".to_string(),
            name: self.options.vision_function.clone(),
            description: Some(
                "Ask the vision system what the camera currently sees. \
                 Use this when the user refers to their physical surroundings."
                    .to_string(),
            ),
            parameters: Some(serde_json::json!({
                "type": "object",
                "properties": {
                    "prompt": {
                        "type": "string",
                        "description": "Question for the vision system"
                    }
                },
                "required": ["prompt"]
            })),
        }
    }

    // -------------------------------------------------------------------------
    // Inbound
    // -------------------------------------------------------------------------

    fn on_message(&mut self, raw: &str) {
        self.idle.touch(self.now);
        let Some(event) = parse_server_event(raw) else {
            return;
        };
        self.handle_server_event(event);
    }

    fn handle_server_event(&mut self, event: crate::protocol::ServerEvent) {
        use crate::protocol::ServerEvent;

        match event {
            ServerEvent::SessionCreated { session } => {
                tracing::info!(session_id = %session.id, model = %session.model, "session created");
            }
            ServerEvent::SessionUpdated { session } => {
                tracing::debug!(session_id = %session.id, "session configuration acknowledged");
            }
            ServerEvent::Error { error } => self.on_server_error(error),
            ServerEvent::AudioDelta { delta } => {
                if let Err(e) = self.playback.handle_delta(&delta) {
                    tracing::warn!(error = %e, "dropping undecodable audio delta");
                }
            }
            ServerEvent::TextDelta { delta } | ServerEvent::AudioTranscriptDelta { delta } => {
                self.tracker.append_delta(&delta);
            }
            ServerEvent::TextDone { text } => {
                tracing::debug!(len = text.len(), "text stream complete");
            }
            ServerEvent::AudioTranscriptDone { transcript } => {
                tracing::debug!(len = transcript.len(), "transcript stream complete");
            }
            ServerEvent::ResponseCreated { response } => {
                tracing::debug!(response_id = %response.id, "response started");
                self.on_response_created();
            }
            ServerEvent::ResponseDone { response } => self.on_response_done(response),
            ServerEvent::ConversationItemCreated { item } => {
                tracing::debug!(item_type = %item.item_type, "conversation item created");
            }
            ServerEvent::TranscriptionCompleted { transcript, .. } => {
                self.on_input_transcription(&transcript);
            }
            ServerEvent::FunctionCallArgumentsDelta { call_id, delta } => {
                self.call_buffer.append(&call_id, &delta);
            }
            ServerEvent::FunctionCallArgumentsDone { call_id, arguments } => {
                self.call_buffer.settle(&call_id, &arguments);
            }
        }
    }

    fn on_server_error(&mut self, error: ApiError) {
        tracing::error!(
            code = error.code.as_deref().unwrap_or("unknown"),
            message = %error.message,
            "server reported an error"
        );
        match classify_error(error.code.as_deref()) {
            RetryClass::AlwaysRetry => self.retry_connection(),
            RetryClass::RetryUnlessBusy => {
                if self.reconnect.is_pending() || self.state == SessionState::AcquiringToken {
                    tracing::debug!("retry suppressed, recovery already underway");
                } else {
                    self.retry_connection();
                }
            }
        }
    }

    fn retry_connection(&mut self) {
        if self.shutting_down {
            return;
        }
        match self.state {
            SessionState::Open | SessionState::Connecting => self.force_close(),
            _ => {
                if self.reconnect.schedule(self.now) {
                    self.state = SessionState::ReconnectPending;
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Turn accounting
    // -------------------------------------------------------------------------

    fn on_response_created(&mut self) {
        if !self.tracker.created() {
            return;
        }
        // 0 -> 1: the assistant takes the floor
        self.speaking = true;
        self.waiting_to_finish = false;
        self.capture.stop(&self.events);
        self.call_buffer.clear();
        self.emit(SessionEvent::ResponseStarted);
    }

    fn on_response_done(&mut self, response: ResponseInfo) {
        tracing::debug!(response_id = %response.id, status = %response.status, "response done");
        let remaining = self.tracker.done();

        let vision_calls = process_response_calls(
            &response.output,
            &mut self.call_buffer,
            &self.registry,
            &self.options.vision_function,
            &self.function_sink,
        );

        let inline = response
            .output
            .iter()
            .filter(|item| item.item_type == "message")
            .find_map(|item| item.inline_text());
        let transcript = self.tracker.finalize_transcript(inline.as_deref());
        self.emit(SessionEvent::ResponseText(transcript.clone()));
        self.finished_transcript = transcript;

        for call in vision_calls {
            self.handle_vision_call(call);
        }

        if remaining == 0 && !self.vision.is_pending() {
            self.waiting_to_finish = true;
        }
    }

    fn on_input_transcription(&mut self, transcript: &str) {
        if is_coherent(transcript, &self.options.acknowledgements) {
            tracing::info!(transcript, "user said");
            self.force_response();
        } else {
            tracing::debug!(transcript, "incoherent input transcript, no response requested");
        }
    }

    // -------------------------------------------------------------------------
    // Vision sub-requests
    // -------------------------------------------------------------------------

    fn handle_vision_call(&mut self, call: VisionCall) {
        match call {
            VisionCall::Requested(prompt) => {
                if !self.vision.begin(prompt.clone()) {
                    tracing::warn!("vision request already in flight, dropping another");
                    return;
                }
                tracing::info!(prompt, "vision request started");
                self.emit(SessionEvent::VisionRequested);
                self.capture.stop(&self.events);

                let epoch = self.epoch;
                let agent = self.vision_agent.clone();
                let queue = self.actions.clone();
                self.runtime.spawn(async move {
                    let result = agent.answer(prompt).await;
                    queue.push(move |s: &mut SessionInner| s.on_vision_result(epoch, result));
                });
            }
            VisionCall::MissingPrompt => {
                tracing::warn!("vision call carried no usable prompt");
                self.send_client_event(ClientEvent::system_text(vision::VISION_APOLOGY));
                self.force_response();
                self.emit(SessionEvent::VisionFinished);
            }
        }
    }

    fn on_vision_result(&mut self, epoch: u64, result: Result<String, VisionError>) {
        if self.shutting_down || epoch != self.epoch {
            tracing::debug!("stale vision result dropped");
            return;
        }
        if !self.vision.finish() {
            tracing::debug!("vision result with no request pending, dropping");
            return;
        }

        let message = match result {
            Ok(answer) => {
                tracing::info!(answer, "vision request answered");
                vision::answer_message(&answer)
            }
            Err(e) => {
                tracing::warn!(error = %e, "vision request failed");
                vision::VISION_APOLOGY.to_string()
            }
        };
        self.send_client_event(ClientEvent::system_text(&message));
        self.force_response();
        self.emit(SessionEvent::VisionFinished);
    }
}
