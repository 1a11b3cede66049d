//! End-to-end session scenarios over fake ports.
//!
//! Each test drives a [`Session`] with explicit ticks: server traffic is
//! injected as raw JSON through a fake transport, and the fake token and
//! vision ports complete on the test runtime between ticks.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use voicelink::errors::{DeviceError, TokenError, TransportError, VisionError};
use voicelink::events::{EventSink, FunctionEvent, FunctionSink, SessionEvent};
use voicelink::ports::{
    CaptureDevice, EphemeralToken, TokenPort, Transport, TransportEvent, TransportSink,
    TransportState, VisionAgent,
};
use voicelink::{
    FunctionDefinition, ParameterKind, ParameterSpec, ParameterValue, Session, SessionOptions,
    SessionPorts, SessionState,
};

// =============================================================================
// Fakes
// =============================================================================

/// One fake connection, shared between the transport handed to the session
/// and the test body.
#[derive(Default)]
struct Connection {
    sink: Mutex<Option<TransportSink>>,
    pending: Mutex<Vec<TransportEvent>>,
    sent: Mutex<Vec<serde_json::Value>>,
    state: Mutex<TransportState>,
    close_requested: Mutex<bool>,
    fail_sends: Mutex<bool>,
}

impl Connection {
    fn push(&self, event: TransportEvent) {
        self.pending.lock().push(event);
    }

    fn inject(&self, json: &str) {
        self.push(TransportEvent::Message(json.to_string()));
    }

    fn sent(&self) -> Vec<serde_json::Value> {
        self.sent.lock().clone()
    }

    fn sent_of_type(&self, event_type: &str) -> Vec<serde_json::Value> {
        self.sent()
            .into_iter()
            .filter(|v| v["type"] == event_type)
            .collect()
    }
}

struct FakeTransport {
    shared: Arc<Connection>,
}

impl Transport for FakeTransport {
    fn open(&mut self, sink: TransportSink) -> Result<(), TransportError> {
        *self.shared.sink.lock() = Some(sink);
        *self.shared.state.lock() = TransportState::Connecting;
        Ok(())
    }

    fn close(&mut self) {
        *self.shared.close_requested.lock() = true;
        *self.shared.state.lock() = TransportState::Closing;
        // A well-behaved peer confirms promptly
        self.shared.push(TransportEvent::Closed {
            code: Some(1000),
            reason: "closed".to_string(),
        });
    }

    fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        if *self.shared.fail_sends.lock() {
            return Err(TransportError::SendFailed("fake fault".to_string()));
        }
        let value: serde_json::Value = serde_json::from_str(text).expect("outbound is JSON");
        self.shared.sent.lock().push(value);
        Ok(())
    }

    fn dispatch_pending(&mut self) {
        let Some(sink) = self.shared.sink.lock().clone() else {
            return;
        };
        let batch: Vec<TransportEvent> = std::mem::take(&mut *self.shared.pending.lock());
        for event in batch {
            if matches!(event, TransportEvent::Opened) {
                *self.shared.state.lock() = TransportState::Open;
            }
            sink(event);
        }
    }

    fn state(&self) -> TransportState {
        *self.shared.state.lock()
    }
}

struct FakeTokenPort {
    results: Mutex<VecDeque<Result<EphemeralToken, TokenError>>>,
    calls: Mutex<usize>,
}

impl FakeTokenPort {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(VecDeque::new()),
            calls: Mutex::new(0),
        })
    }

    fn queue(&self, result: Result<EphemeralToken, TokenError>) {
        self.results.lock().push_back(result);
    }

    fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

fn token() -> EphemeralToken {
    EphemeralToken {
        secret: "ek_test".to_string(),
        expires_at: None,
    }
}

#[async_trait]
impl TokenPort for FakeTokenPort {
    async fn acquire(&self) -> Result<EphemeralToken, TokenError> {
        *self.calls.lock() += 1;
        self.results.lock().pop_front().unwrap_or_else(|| Ok(token()))
    }
}

struct FakeVision {
    result: Mutex<Option<Result<String, VisionError>>>,
    prompts: Mutex<Vec<String>>,
}

impl FakeVision {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            result: Mutex::new(None),
            prompts: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl VisionAgent for FakeVision {
    async fn answer(&self, prompt: String) -> Result<String, VisionError> {
        self.prompts.lock().push(prompt);
        self.result
            .lock()
            .take()
            .unwrap_or_else(|| Err(VisionError::AgentFailed("unset".to_string())))
    }
}

/// A microphone with nothing in its ring buffer.
struct SilentMic {
    recording: bool,
}

impl CaptureDevice for SilentMic {
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

// =============================================================================
// Rig
// =============================================================================

struct Rig {
    session: Session,
    connections: Arc<Mutex<Vec<Arc<Connection>>>>,
    token_port: Arc<FakeTokenPort>,
    vision: Arc<FakeVision>,
    events: Arc<Mutex<Vec<SessionEvent>>>,
    function_events: Arc<Mutex<Vec<FunctionEvent>>>,
    t0: Instant,
}

impl Rig {
    fn new(options: SessionOptions) -> Self {
        let connections: Arc<Mutex<Vec<Arc<Connection>>>> = Arc::new(Mutex::new(Vec::new()));
        let factory_connections = connections.clone();
        let token_port = FakeTokenPort::new();
        let vision = FakeVision::new();

        let ports = SessionPorts {
            token: token_port.clone(),
            transport: Box::new(move |_token: &EphemeralToken| {
                let shared = Arc::new(Connection::default());
                factory_connections.lock().push(shared.clone());
                Box::new(FakeTransport { shared }) as Box<dyn Transport>
            }),
            vision: vision.clone(),
            capture: Box::new(SilentMic { recording: false }),
            render_sample_rate: 24000,
            runtime: tokio::runtime::Handle::current(),
        };

        let mut session = Session::new(options, ports);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink_events = events.clone();
        let sink: EventSink = Arc::new(move |e| sink_events.lock().push(e));
        session.set_event_sink(sink);

        let function_events = Arc::new(Mutex::new(Vec::new()));
        let sink_fn = function_events.clone();
        let fn_sink: FunctionSink = Arc::new(move |e| sink_fn.lock().push(e));
        session.set_function_sink(fn_sink);

        Self {
            session,
            connections,
            token_port,
            vision,
            events,
            function_events,
            t0: Instant::now(),
        }
    }

    fn conn(&self) -> Arc<Connection> {
        self.connections.lock().last().expect("a connection exists").clone()
    }

    fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Let spawned port futures run, then tick a few times at `now`.
    async fn settle(&mut self, now: Instant) {
        for _ in 0..8 {
            tokio::task::yield_now().await;
            self.session.tick_at(now);
        }
    }

    /// Connect and bring the transport to open.
    async fn open(&mut self) {
        self.session.connect();
        self.settle(self.t0).await;
        self.conn().push(TransportEvent::Opened);
        self.settle(self.t0).await;
        assert_eq!(self.session.state(), SessionState::Open);
    }

    fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().clone()
    }

    fn count(&self, wanted: &SessionEvent) -> usize {
        self.events.lock().iter().filter(|e| *e == wanted).count()
    }
}

fn options_with_door_function() -> SessionOptions {
    let mut options = SessionOptions::default();
    options.functions = vec![FunctionDefinition {
        name: "set_door".to_string(),
        description: "Open or close the door".to_string(),
        parameters: vec![ParameterSpec {
            name: "state".to_string(),
            kind: ParameterKind::Enum {
                values: vec!["Closed".to_string(), "Open".to_string()],
            },
        }],
    }];
    options
}

fn response_created(id: &str) -> String {
    format!(
        r#"{{"type":"response.created","response":{{"id":"{id}","status":"in_progress","output":[]}}}}"#
    )
}

fn response_done_with_text(id: &str, text: &str) -> String {
    format!(
        r#"{{"type":"response.done","response":{{"id":"{id}","status":"completed","output":[
            {{"type":"message","role":"assistant","content":[{{"type":"text","text":"{text}"}}]}}
        ]}}}}"#
    )
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_connect_sends_session_configuration() {
    let mut rig = Rig::new(options_with_door_function());
    rig.open().await;

    assert_eq!(rig.count(&SessionEvent::Connected), 1);

    let updates = rig.conn().sent_of_type("session.update");
    assert_eq!(updates.len(), 1);
    let session = &updates[0]["session"];
    assert_eq!(session["input_audio_format"], "pcm16");
    assert_eq!(session["output_audio_format"], "pcm16");
    assert_eq!(session["turn_detection"]["create_response"], false);

    let tools = session["tools"].as_array().unwrap();
    let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
    assert!(names.contains(&"set_door"));
    assert!(names.contains(&"request_visual_context"));
}

#[tokio::test]
async fn test_token_failure_schedules_exactly_one_reconnect() {
    let mut rig = Rig::new(SessionOptions::default());
    rig.token_port.queue(Err(TokenError::Status(500)));

    rig.session.connect();
    rig.settle(rig.t0).await;

    assert_eq!(rig.session.state(), SessionState::ReconnectPending);
    assert_eq!(rig.count(&SessionEvent::Disconnected), 1);
    assert_eq!(rig.token_port.calls(), 1);

    // Before the fixed delay: nothing
    rig.settle(rig.t0 + Duration::from_secs(1)).await;
    assert_eq!(rig.token_port.calls(), 1);

    // After it: one new attempt
    rig.settle(rig.t0 + Duration::from_secs(4)).await;
    assert_eq!(rig.token_port.calls(), 2);
    assert_eq!(rig.connection_count(), 1);
}

#[tokio::test]
async fn test_nested_responses_finish_after_final_done() {
    let mut rig = Rig::new(SessionOptions::default());
    rig.open().await;
    let conn = rig.conn();

    conn.inject(&response_created("r1"));
    conn.inject(&response_created("r2"));
    rig.settle(rig.t0).await;
    assert_eq!(rig.count(&SessionEvent::ResponseStarted), 1);
    assert_eq!(rig.count(&SessionEvent::ResponseFinished), 0);

    conn.inject(&response_done_with_text("r1", "First part."));
    rig.settle(rig.t0).await;
    assert_eq!(rig.count(&SessionEvent::ResponseFinished), 0);

    conn.inject(&response_done_with_text("r2", "Second part."));
    rig.settle(rig.t0).await;
    assert_eq!(rig.count(&SessionEvent::ResponseFinished), 1);
    assert!(rig
        .events()
        .contains(&SessionEvent::ResponseText("Second part.".to_string())));
}

#[tokio::test]
async fn test_transcript_deltas_win_over_inline_payload() {
    let mut rig = Rig::new(SessionOptions::default());
    rig.open().await;
    let conn = rig.conn();

    conn.inject(&response_created("r1"));
    conn.inject(r#"{"type":"response.audio_transcript.delta","delta":"Hello "}"#);
    conn.inject(r#"{"type":"response.audio_transcript.delta","delta":"there."}"#);
    conn.inject(&response_done_with_text("r1", "inline fallback"));
    rig.settle(rig.t0).await;

    assert!(rig
        .events()
        .contains(&SessionEvent::ResponseText("Hello there.".to_string())));
}

#[tokio::test]
async fn test_conversation_end_marker_fires_communication_finished() {
    let mut rig = Rig::new(SessionOptions::default());
    rig.open().await;
    let conn = rig.conn();

    conn.inject(&response_created("r1"));
    conn.inject(&response_done_with_text("r1", "Goodbye.;"));
    rig.settle(rig.t0).await;

    assert_eq!(rig.count(&SessionEvent::ResponseFinished), 1);
    assert_eq!(rig.count(&SessionEvent::CommunicationFinished), 1);
}

#[tokio::test]
async fn test_plain_statement_does_not_end_conversation() {
    let mut rig = Rig::new(SessionOptions::default());
    rig.open().await;
    let conn = rig.conn();

    conn.inject(&response_created("r1"));
    conn.inject(&response_done_with_text("r1", "Anything else?"));
    rig.settle(rig.t0).await;

    assert_eq!(rig.count(&SessionEvent::ResponseFinished), 1);
    assert_eq!(rig.count(&SessionEvent::CommunicationFinished), 0);
}

#[tokio::test]
async fn test_incoherent_single_word_requests_no_response() {
    let mut rig = Rig::new(SessionOptions::default());
    rig.open().await;
    let conn = rig.conn();

    conn.inject(
        r#"{"type":"conversation.item.input_audio_transcription.completed","item_id":"i1","transcript":"Hmm."}"#,
    );
    rig.settle(rig.t0).await;
    assert!(conn.sent_of_type("response.create").is_empty());

    conn.inject(
        r#"{"type":"conversation.item.input_audio_transcription.completed","item_id":"i2","transcript":"Yes."}"#,
    );
    rig.settle(rig.t0).await;
    assert_eq!(conn.sent_of_type("response.create").len(), 1);
}

#[tokio::test]
async fn test_function_call_emits_typed_parameters() {
    let mut rig = Rig::new(options_with_door_function());
    rig.open().await;
    let conn = rig.conn();

    conn.inject(&response_created("r1"));
    conn.inject(
        r#"{"type":"response.function_call_arguments.delta","call_id":"c1","delta":"{\"state\":"}"#,
    );
    conn.inject(
        r#"{"type":"response.function_call_arguments.delta","call_id":"c1","delta":"\"Open\"}"}"#,
    );
    conn.inject(
        r#"{"type":"response.function_call_arguments.done","call_id":"c1","arguments":"{\"state\":\"Open\"}"}"#,
    );
    conn.inject(
        r#"{"type":"response.done","response":{"id":"r1","status":"completed","output":[
            {"type":"function_call","call_id":"c1","name":"set_door"}
        ]}}"#,
    );
    rig.settle(rig.t0).await;

    let events = rig.function_events.lock().clone();
    assert_eq!(
        events,
        vec![
            FunctionEvent::Invoked {
                name: "set_door".to_string()
            },
            FunctionEvent::Parameter {
                function: "set_door".to_string(),
                name: "state".to_string(),
                value: ParameterValue::Enum {
                    index: 1,
                    name: "Open".to_string()
                },
            },
        ]
    );
}

#[tokio::test]
async fn test_vision_answer_becomes_system_message_and_forced_response() {
    let mut rig = Rig::new(SessionOptions::default());
    *rig.vision.result.lock() = Some(Ok("a red door".to_string()));
    rig.open().await;
    let conn = rig.conn();

    conn.inject(&response_created("r1"));
    conn.inject(
        r#"{"type":"response.done","response":{"id":"r1","status":"completed","output":[
            {"type":"function_call","call_id":"c1","name":"request_visual_context",
             "arguments":"{\"prompt\":\"what is ahead?\"}"}
        ]}}"#,
    );
    rig.settle(rig.t0).await;
    assert_eq!(rig.count(&SessionEvent::VisionRequested), 1);
    assert_eq!(rig.vision.prompts.lock().clone(), vec!["what is ahead?"]);

    rig.settle(rig.t0).await;
    assert_eq!(rig.count(&SessionEvent::VisionFinished), 1);

    let items = conn.sent_of_type("conversation.item.create");
    let system: Vec<&serde_json::Value> = items
        .iter()
        .filter(|v| v["item"]["role"] == "system")
        .collect();
    assert_eq!(system.len(), 1);
    let text = system[0]["item"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("a red door"));
    assert_eq!(conn.sent_of_type("response.create").len(), 1);
}

#[tokio::test]
async fn test_vision_failure_sends_apology() {
    let mut rig = Rig::new(SessionOptions::default());
    *rig.vision.result.lock() = Some(Err(VisionError::AgentFailed("lens cap on".to_string())));
    rig.open().await;
    let conn = rig.conn();

    conn.inject(&response_created("r1"));
    conn.inject(
        r#"{"type":"response.done","response":{"id":"r1","status":"completed","output":[
            {"type":"function_call","call_id":"c1","name":"request_visual_context",
             "arguments":"{\"prompt\":\"look\"}"}
        ]}}"#,
    );
    rig.settle(rig.t0).await;
    rig.settle(rig.t0).await;

    assert_eq!(rig.count(&SessionEvent::VisionFinished), 1);
    let items = conn.sent_of_type("conversation.item.create");
    assert!(!items.is_empty());
    assert_eq!(conn.sent_of_type("response.create").len(), 1);
}

#[tokio::test]
async fn test_blank_vision_prompt_takes_failure_path_immediately() {
    let mut rig = Rig::new(SessionOptions::default());
    rig.open().await;
    let conn = rig.conn();

    conn.inject(&response_created("r1"));
    conn.inject(
        r#"{"type":"response.done","response":{"id":"r1","status":"completed","output":[
            {"type":"function_call","call_id":"c1","name":"request_visual_context",
             "arguments":"{\"prompt\":\"  \"}"}
        ]}}"#,
    );
    rig.settle(rig.t0).await;

    assert_eq!(rig.count(&SessionEvent::VisionRequested), 0);
    assert_eq!(rig.count(&SessionEvent::VisionFinished), 1);
    assert!(rig.vision.prompts.lock().is_empty());
    assert_eq!(conn.sent_of_type("response.create").len(), 1);
}

#[tokio::test]
async fn test_idle_timeout_forces_close_and_reconnect() {
    let mut rig = Rig::new(SessionOptions::default());
    rig.open().await;
    let first = rig.conn();

    rig.settle(rig.t0 + Duration::from_secs(31)).await;
    assert!(*first.close_requested.lock());

    // The fake confirms the close; teardown, then a scheduled reconnect
    rig.settle(rig.t0 + Duration::from_secs(31)).await;
    assert_eq!(rig.count(&SessionEvent::Disconnected), 1);

    rig.settle(rig.t0 + Duration::from_secs(35)).await;
    assert_eq!(rig.token_port.calls(), 2);
}

#[tokio::test]
async fn test_remote_close_reconnects_once() {
    let mut rig = Rig::new(SessionOptions::default());
    rig.open().await;

    rig.conn().push(TransportEvent::Closed {
        code: Some(1006),
        reason: "abnormal".to_string(),
    });
    rig.settle(rig.t0).await;
    assert_eq!(rig.session.state(), SessionState::ReconnectPending);
    assert_eq!(rig.count(&SessionEvent::Disconnected), 1);

    rig.settle(rig.t0 + Duration::from_secs(4)).await;
    rig.conn().push(TransportEvent::Opened);
    rig.settle(rig.t0 + Duration::from_secs(4)).await;

    assert_eq!(rig.session.state(), SessionState::Open);
    assert_eq!(rig.connection_count(), 2);
    assert_eq!(rig.count(&SessionEvent::Connected), 2);
}

#[tokio::test]
async fn test_disconnect_is_terminal() {
    let mut rig = Rig::new(SessionOptions::default());
    rig.open().await;

    rig.session.disconnect();
    assert_eq!(rig.session.state(), SessionState::Disconnected);
    assert_eq!(rig.count(&SessionEvent::Disconnected), 1);

    rig.settle(rig.t0 + Duration::from_secs(60)).await;
    assert_eq!(rig.session.state(), SessionState::Disconnected);
    assert_eq!(rig.token_port.calls(), 1);
    assert_eq!(rig.connection_count(), 1);
}

#[tokio::test]
async fn test_stale_events_after_disconnect_are_dropped() {
    let mut rig = Rig::new(SessionOptions::default());
    rig.open().await;
    let first = rig.conn();

    rig.session.disconnect();
    // The dead connection keeps talking; nothing may change
    first.inject(&response_created("ghost"));
    first.push(TransportEvent::Closed {
        code: None,
        reason: "late".to_string(),
    });
    rig.settle(rig.t0).await;

    assert_eq!(rig.count(&SessionEvent::ResponseStarted), 0);
    assert_eq!(rig.count(&SessionEvent::Disconnected), 1);
}

#[tokio::test]
async fn test_retryable_server_error_forces_close() {
    let mut rig = Rig::new(SessionOptions::default());
    rig.open().await;
    let conn = rig.conn();

    conn.inject(r#"{"type":"error","error":{"type":"invalid_request_error","code":"token_expired","message":"expired"}}"#);
    rig.settle(rig.t0).await;

    assert!(*conn.close_requested.lock());
    rig.settle(rig.t0).await;
    assert_eq!(rig.session.state(), SessionState::ReconnectPending);
}

#[tokio::test]
async fn test_user_text_creates_item_and_response() {
    let mut rig = Rig::new(SessionOptions::default());
    rig.open().await;
    let conn = rig.conn();

    rig.session.send_user_text("open the door please");
    rig.settle(rig.t0).await;

    let items = conn.sent_of_type("conversation.item.create");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["item"]["role"], "user");
    assert_eq!(
        items[0]["item"]["content"][0]["text"],
        "open the door please"
    );
    assert_eq!(conn.sent_of_type("response.create").len(), 1);
}

#[tokio::test]
async fn test_assistant_audio_lands_in_playback_queue() {
    let mut rig = Rig::new(SessionOptions::default());
    rig.open().await;
    let conn = rig.conn();
    let queue = rig.session.playback_queue();

    // 4 samples of PCM16 silence plus a peak
    let pcm: Vec<u8> = vec![0, 0, 0, 0, 255, 127, 0, 0];
    let delta = {
        use base64::prelude::*;
        BASE64_STANDARD.encode(&pcm)
    };
    conn.inject(&format!(
        r#"{{"type":"response.audio.delta","delta":"{delta}"}}"#
    ));
    rig.settle(rig.t0).await;

    assert_eq!(queue.len(), 4);
}
