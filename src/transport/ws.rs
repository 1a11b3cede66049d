//! WebSocket transport adapter.
//!
//! One `WsTransport` wraps one connection attempt. The connection runs on a
//! spawned tokio task; inbound frames and state changes are buffered
//! internally and handed to the installed sink from `dispatch_pending`, on the
//! caller's thread. The adapter itself never touches session state.

use std::collections::VecDeque;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use url::Url;

use crate::errors::TransportError;
use crate::ports::{EphemeralToken, Transport, TransportEvent, TransportFactory, TransportSink};

/// Default realtime endpoint; the model is appended as a query parameter.
pub const DEFAULT_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";

enum Command {
    Text(String),
    Close,
}

/// State and event buffer shared with the connection task.
struct Shared {
    state: Mutex<crate::ports::TransportState>,
    pending: Mutex<VecDeque<TransportEvent>>,
}

impl Shared {
    fn push(&self, event: TransportEvent) {
        self.pending.lock().push_back(event);
    }

    fn set_state(&self, state: crate::ports::TransportState) {
        *self.state.lock() = state;
    }
}

// =============================================================================
// Transport
// =============================================================================

/// A WebSocket connection to the realtime endpoint.
pub struct WsTransport {
    url: String,
    bearer: String,
    runtime: tokio::runtime::Handle,
    shared: Arc<Shared>,
    sink: Option<TransportSink>,
    commands: Option<mpsc::UnboundedSender<Command>>,
}

impl WsTransport {
    /// Create an unopened transport for `url`, authenticated with `bearer`.
    pub fn new(url: String, bearer: String, runtime: tokio::runtime::Handle) -> Self {
        Self {
            url,
            bearer,
            runtime,
            shared: Arc::new(Shared {
                state: Mutex::new(crate::ports::TransportState::Closed),
                pending: Mutex::new(VecDeque::new()),
            }),
            sink: None,
            commands: None,
        }
    }

    fn build_request(&self) -> Result<http::Request<()>, TransportError> {
        let url = Url::parse(&self.url)
            .map_err(|e| TransportError::ConnectFailed(format!("bad url: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| TransportError::ConnectFailed("url has no host".to_string()))?
            .to_string();

        http::Request::builder()
            .uri(&self.url)
            .header("Authorization", format!("Bearer {}", self.bearer))
            .header("OpenAI-Beta", "realtime=v1")
            .header(
                "Sec-WebSocket-Key",
                tungstenite::handshake::client::generate_key(),
            )
            .header("Sec-WebSocket-Version", "13")
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Host", host)
            .body(())
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))
    }
}

impl Transport for WsTransport {
    fn open(&mut self, sink: TransportSink) -> Result<(), TransportError> {
        if self.commands.is_some() {
            return Err(TransportError::ConnectFailed(
                "transport already opened".to_string(),
            ));
        }
        let request = self.build_request()?;
        self.sink = Some(sink);
        self.shared.set_state(crate::ports::TransportState::Connecting);

        let (tx, rx) = mpsc::unbounded_channel();
        self.commands = Some(tx);

        let shared = self.shared.clone();
        self.runtime.spawn(run_connection(request, rx, shared));
        Ok(())
    }

    fn close(&mut self) {
        let state = *self.shared.state.lock();
        if matches!(
            state,
            crate::ports::TransportState::Open | crate::ports::TransportState::Connecting
        ) {
            self.shared.set_state(crate::ports::TransportState::Closing);
        }
        if let Some(commands) = &self.commands {
            let _ = commands.send(Command::Close);
        }
    }

    fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        if *self.shared.state.lock() != crate::ports::TransportState::Open {
            return Err(TransportError::NotOpen);
        }
        let commands = self.commands.as_ref().ok_or(TransportError::NotOpen)?;
        commands
            .send(Command::Text(text.to_string()))
            .map_err(|_| TransportError::SendFailed("connection task gone".to_string()))
    }

    fn dispatch_pending(&mut self) {
        let Some(sink) = self.sink.clone() else {
            return;
        };
        // Move events out first so the sink never runs under the lock
        let batch: VecDeque<TransportEvent> = std::mem::take(&mut *self.shared.pending.lock());
        for event in batch {
            sink(event);
        }
    }

    fn state(&self) -> crate::ports::TransportState {
        *self.shared.state.lock()
    }
}

/// The connection task: handshake, then pump frames both ways until either
/// side closes.
async fn run_connection(
    request: http::Request<()>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    shared: Arc<Shared>,
) {
    let (stream, _response) = match tokio_tungstenite::connect_async(request).await {
        Ok(ok) => ok,
        Err(e) => {
            tracing::error!(error = %e, "websocket handshake failed");
            shared.push(TransportEvent::Error(e.to_string()));
            shared.set_state(crate::ports::TransportState::Closed);
            shared.push(TransportEvent::Closed {
                code: None,
                reason: "connect failed".to_string(),
            });
            return;
        }
    };
    tracing::info!("websocket connected");
    shared.set_state(crate::ports::TransportState::Open);
    shared.push(TransportEvent::Opened);

    let (mut write, mut read) = stream.split();
    let mut close_code: Option<u16> = None;
    let mut close_reason = String::new();

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Text(text)) => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        tracing::error!(error = %e, "websocket send failed");
                        shared.push(TransportEvent::Error(e.to_string()));
                        break;
                    }
                }
                // A dropped sender counts as a close request
                Some(Command::Close) | None => {
                    let _ = write.send(Message::Close(None)).await;
                    close_reason = "closed by client".to_string();
                    break;
                }
            },
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    shared.push(TransportEvent::Message(text.to_string()));
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = write.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(frame))) => {
                    if let Some(frame) = frame {
                        close_code = Some(u16::from(frame.code));
                        close_reason = frame.reason.to_string();
                    }
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::error!(error = %e, "websocket read failed");
                    shared.push(TransportEvent::Error(e.to_string()));
                    close_reason = e.to_string();
                    break;
                }
                None => {
                    close_reason = "stream ended".to_string();
                    break;
                }
            },
        }
    }

    shared.set_state(crate::ports::TransportState::Closed);
    shared.push(TransportEvent::Closed {
        code: close_code,
        reason: close_reason,
    });
}

// =============================================================================
// Factory
// =============================================================================

/// Builds one [`WsTransport`] per connection attempt.
pub struct WsTransportFactory {
    url: String,
    runtime: tokio::runtime::Handle,
}

impl WsTransportFactory {
    /// A factory for an explicit endpoint URL.
    pub fn new(url: String, runtime: tokio::runtime::Handle) -> Self {
        Self { url, runtime }
    }

    /// A factory for the default endpoint with the given model.
    pub fn for_model(model: &str, runtime: tokio::runtime::Handle) -> Self {
        Self::new(format!("{DEFAULT_REALTIME_URL}?model={model}"), runtime)
    }
}

impl TransportFactory for WsTransportFactory {
    fn create(&self, token: &EphemeralToken) -> Box<dyn Transport> {
        Box::new(WsTransport::new(
            self.url.clone(),
            token.secret.clone(),
            self.runtime.clone(),
        ))
    }
}
