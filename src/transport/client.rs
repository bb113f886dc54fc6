use crate::protocol::{ClientMessage, ServerMessage};
use base64::Engine;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Transport-level ping cadence
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(20);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;
type WsSink = futures::stream::SplitSink<WsStream, Message>;

/// Events surfaced to the transport's owner.
///
/// Inbound messages are delivered in the order received from the connection.
/// Audio payloads (inline parts whose MIME type begins with `audio/`) are
/// extracted and delivered separately so the owner can route them straight to
/// playback.
#[derive(Debug)]
pub enum TransportEvent {
    Connected,
    Disconnected { error: Option<String> },
    Message(ServerMessage),
    Audio(Vec<u8>),
}

/// Owns the persistent bidirectional connection.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Open the connection using the given credential.
    ///
    /// Failure to construct the URL or complete the handshake is reported as
    /// a `Disconnected` event rather than an error return.
    async fn connect(&self, credential: &str);

    /// Serialize and send one message; a no-op with a warning when not
    /// connected. A single bad outbound message never kills the session.
    async fn send(&self, message: &ClientMessage);

    /// Cancel keepalive, close the connection, mark not-connected; idempotent
    async fn disconnect(&self);

    fn is_connected(&self) -> bool;
}

/// Websocket implementation of [`Transport`].
pub struct WsTransport {
    base_url: String,
    events_tx: mpsc::Sender<TransportEvent>,
    connected: Arc<AtomicBool>,
    sink: Arc<Mutex<Option<WsSink>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WsTransport {
    pub fn new(base_url: impl Into<String>, events_tx: mpsc::Sender<TransportEvent>) -> Self {
        Self {
            base_url: base_url.into(),
            events_tx,
            connected: Arc::new(AtomicBool::new(false)),
            sink: Arc::new(Mutex::new(None)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    async fn emit(&self, event: TransportEvent) {
        if self.events_tx.send(event).await.is_err() {
            debug!("Transport event receiver dropped");
        }
    }

    /// Emit a single Disconnected event for the current connection
    async fn emit_disconnect(
        connected: &AtomicBool,
        events_tx: &mpsc::Sender<TransportEvent>,
        error: Option<String>,
    ) {
        if connected.swap(false, Ordering::SeqCst) {
            let _ = events_tx
                .send(TransportEvent::Disconnected { error })
                .await;
        }
    }

    async fn abort_tasks(&self) {
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
        }
    }

    /// Decode one inbound frame and forward its events
    async fn handle_frame(text: &str, events_tx: &mpsc::Sender<TransportEvent>) {
        let message: ServerMessage = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(e) => {
                // A malformed message must not be fatal to the read loop
                warn!("Failed to decode server message: {}", e);
                return;
            }
        };

        // Extract inline audio payloads before delivering the message
        if let Some(content) = &message.server_content {
            if let Some(turn) = &content.model_turn {
                for part in &turn.parts {
                    let Some(inline) = &part.inline_data else {
                        continue;
                    };
                    if !inline.mime_type.starts_with("audio/") {
                        continue;
                    }
                    match base64::engine::general_purpose::STANDARD.decode(&inline.data) {
                        Ok(bytes) => {
                            let _ = events_tx.send(TransportEvent::Audio(bytes)).await;
                        }
                        Err(e) => {
                            warn!("Failed to decode inline audio payload: {}", e);
                        }
                    }
                }
            }
        }

        let _ = events_tx.send(TransportEvent::Message(message)).await;
    }
}

#[async_trait::async_trait]
impl Transport for WsTransport {
    async fn connect(&self, credential: &str) {
        // Tear down any previous connection's tasks before reconnecting
        self.abort_tasks().await;

        let url = format!("{}?key={}", self.base_url, credential);

        let request = match url.clone().into_client_request() {
            Ok(req) => req,
            Err(e) => {
                warn!("Failed to build connection request: {}", e);
                self.emit(TransportEvent::Disconnected {
                    error: Some(format!("invalid endpoint: {}", e)),
                })
                .await;
                return;
            }
        };

        info!("Connecting to {}", self.base_url);

        let stream = match connect_async(request).await {
            Ok((stream, _response)) => stream,
            Err(e) => {
                warn!("Websocket connect failed: {}", e);
                self.emit(TransportEvent::Disconnected {
                    error: Some(e.to_string()),
                })
                .await;
                return;
            }
        };

        let (ws_sink, mut ws_source) = stream.split();

        {
            let mut sink = self.sink.lock().await;
            *sink = Some(ws_sink);
        }
        self.connected.store(true, Ordering::SeqCst);

        info!("Connected");
        self.emit(TransportEvent::Connected).await;

        // Read loop: deliver inbound messages in arrival order
        let events_tx = self.events_tx.clone();
        let connected = Arc::clone(&self.connected);
        let read_task = tokio::spawn(async move {
            let close_error = loop {
                match ws_source.next().await {
                    Some(Ok(Message::Text(text))) => {
                        Self::handle_frame(text.as_str(), &events_tx).await;
                    }
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => Self::handle_frame(text, &events_tx).await,
                        Err(e) => warn!("Ignoring non-UTF8 binary frame: {}", e),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        info!("Connection closed by server");
                        break frame.map(|f| f.reason.to_string());
                    }
                    Some(Ok(_)) => {
                        // Ping/pong handled by the protocol layer
                    }
                    Some(Err(e)) => {
                        warn!("Websocket receive error: {}", e);
                        break Some(e.to_string());
                    }
                    None => break None,
                }
            };

            Self::emit_disconnect(&connected, &events_tx, close_error).await;
        });

        // Keepalive: a ping failure means the connection is gone
        let sink = Arc::clone(&self.sink);
        let events_tx = self.events_tx.clone();
        let connected = Arc::clone(&self.connected);
        let ping_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(KEEPALIVE_INTERVAL);
            interval.tick().await; // first tick fires immediately

            loop {
                interval.tick().await;

                if !connected.load(Ordering::SeqCst) {
                    break;
                }

                let result = {
                    let mut sink = sink.lock().await;
                    match sink.as_mut() {
                        Some(sink) => sink.send(Message::Ping(Vec::new().into())).await,
                        None => break,
                    }
                };

                if let Err(e) = result {
                    warn!("Keepalive ping failed: {}", e);
                    Self::emit_disconnect(&connected, &events_tx, Some(e.to_string())).await;
                    break;
                }

                debug!("Keepalive ping sent");
            }
        });

        let mut tasks = self.tasks.lock().await;
        tasks.push(read_task);
        tasks.push(ping_task);
    }

    async fn send(&self, message: &ClientMessage) {
        if !self.connected.load(Ordering::SeqCst) {
            warn!("Not connected, dropping outbound message");
            return;
        }

        let payload = match serde_json::to_string(message) {
            Ok(payload) => payload,
            Err(e) => {
                // Swallowed: one bad outbound message must not kill the session
                error!("Failed to serialize outbound message: {}", e);
                return;
            }
        };

        let mut sink = self.sink.lock().await;
        match sink.as_mut() {
            Some(sink) => {
                if let Err(e) = sink.send(Message::Text(payload.into())).await {
                    warn!("Failed to send message: {}", e);
                }
            }
            None => warn!("No open connection, dropping outbound message"),
        }
    }

    async fn disconnect(&self) {
        self.abort_tasks().await;

        // Mark not-connected before closing so no Disconnected event is
        // emitted for an explicit teardown
        self.connected.store(false, Ordering::SeqCst);

        let mut sink = self.sink.lock().await;
        if let Some(mut sink) = sink.take() {
            if let Err(e) = sink.send(Message::Close(None)).await {
                debug!("Close handshake failed: {}", e);
            }
            info!("Disconnected");
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
