use super::config::SessionConfig;
use super::state::{SessionSnapshot, SessionState};
use super::stats::{SessionStats, TokenUsage};
use super::timer::DelayedTask;
use crate::audio::{convert, CapturePipeline, CapturedChunk, PlaybackPipeline};
use crate::credentials::{is_valid_credential, CredentialStore};
use crate::error::LiveError;
use crate::protocol::{
    ClientMessage, Content, FunctionResponse, MediaChunk, ServerContent, ServerMessage, Setup,
    AUDIO_INPUT_MIME, JPEG_MIME,
};
use crate::transport::{Transport, TransportEvent};
use crate::video::{FrameEncoder, VideoFrame};
use base64::Engine;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

enum SessionCommand {
    Start,
    Frame(VideoFrame),
    Text(String),
    ToolResponse(Vec<FunctionResponse>),
    Reconnect { attempt: u32 },
    End { ack: oneshot::Sender<()> },
    GetStats { reply: oneshot::Sender<SessionStats> },
}

/// A live multimodal conversation session.
///
/// Owns the transport, frame encoder and both audio pipelines. All state
/// mutation happens inside one spawned event-loop task; public methods send
/// commands into it, so transport events, microphone chunks and caller calls
/// are funneled through a single writer. Observed state is published on a
/// watch channel.
pub struct LiveSession {
    commands_tx: mpsc::Sender<SessionCommand>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
}

impl LiveSession {
    /// Create a session from its injected collaborators and spawn the event
    /// loop. `transport_events` must be the receiving side of the channel
    /// given to `transport`.
    pub fn new(
        config: SessionConfig,
        credentials: Arc<dyn CredentialStore>,
        transport: Arc<dyn Transport>,
        transport_events: mpsc::Receiver<TransportEvent>,
        capture: CapturePipeline,
        playback: PlaybackPipeline,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(64);
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::default());

        let driver = Driver {
            encoder: FrameEncoder::with_preset(config.encoder_preset),
            config,
            credentials,
            transport,
            capture,
            playback,
            state: SessionState::Disconnected,
            is_listening: false,
            is_speaking: false,
            conversation_active: false,
            streaming_active: false,
            ended: true,
            credential: None,
            reconnect_attempts: 0,
            total_reconnect_attempts: 0,
            reconnect_task: None,
            input_transcript: None,
            output_transcript: None,
            last_tool_call: None,
            error: None,
            audio_chunks_sent: 0,
            usage: TokenUsage::default(),
            started_at: Utc::now(),
            snapshot_tx,
            commands_tx: commands_tx.clone(),
        };

        tokio::spawn(driver.run(commands_rx, transport_events));

        Self {
            commands_tx,
            snapshot_rx,
        }
    }

    /// Start the session: validate the credential and open the connection.
    /// Valid only from the Disconnected or Error state.
    pub async fn start(&self) {
        if self.commands_tx.send(SessionCommand::Start).await.is_err() {
            warn!("Session loop has shut down, start ignored");
        }
    }

    /// Offer a video frame for upload.
    ///
    /// Never blocks the caller; the encoder applies its own rate limiting,
    /// and frames offered while the loop is saturated are dropped.
    pub fn process_frame(&self, frame: VideoFrame) {
        if let Err(e) = self.commands_tx.try_send(SessionCommand::Frame(frame)) {
            debug!("Dropping frame: {}", e);
        }
    }

    /// Send a complete user text turn alongside the live media streams
    pub async fn send_text(&self, text: impl Into<String>) {
        if self
            .commands_tx
            .send(SessionCommand::Text(text.into()))
            .await
            .is_err()
        {
            warn!("Session loop has shut down, text turn ignored");
        }
    }

    /// Reply to a tool call previously requested by the service
    pub async fn send_tool_response(&self, responses: Vec<FunctionResponse>) {
        if self
            .commands_tx
            .send(SessionCommand::ToolResponse(responses))
            .await
            .is_err()
        {
            warn!("Session loop has shut down, tool response ignored");
        }
    }

    /// End the session: stop media pipelines, close the transport, cancel
    /// any pending reconnect. Valid from any state; resolves once cleanup
    /// has completed.
    pub async fn end(&self) {
        let (ack, done) = oneshot::channel();
        if self
            .commands_tx
            .send(SessionCommand::End { ack })
            .await
            .is_ok()
        {
            let _ = done.await;
        }
    }

    /// Current published view of the session
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Observe session state and flag changes
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Session statistics, for diagnostics
    pub async fn stats(&self) -> Option<SessionStats> {
        let (reply, rx) = oneshot::channel();
        self.commands_tx
            .send(SessionCommand::GetStats { reply })
            .await
            .ok()?;
        rx.await.ok()
    }
}

/// Single-writer owner of all session state, driven by the event loop
struct Driver {
    config: SessionConfig,
    credentials: Arc<dyn CredentialStore>,
    transport: Arc<dyn Transport>,
    capture: CapturePipeline,
    playback: PlaybackPipeline,
    encoder: FrameEncoder,

    state: SessionState,
    is_listening: bool,
    is_speaking: bool,
    conversation_active: bool,
    /// Media pipelines have been started for this conversation
    streaming_active: bool,
    /// Set by end(); an explicit end never triggers reconnection
    ended: bool,

    credential: Option<String>,
    reconnect_attempts: u32,
    total_reconnect_attempts: u64,
    reconnect_task: Option<DelayedTask>,

    input_transcript: Option<String>,
    output_transcript: Option<String>,
    last_tool_call: Option<String>,
    error: Option<LiveError>,

    audio_chunks_sent: u64,
    usage: TokenUsage,
    started_at: chrono::DateTime<Utc>,

    snapshot_tx: watch::Sender<SessionSnapshot>,
    commands_tx: mpsc::Sender<SessionCommand>,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut transport_events: mpsc::Receiver<TransportEvent>,
    ) {
        info!("Session loop started: {}", self.config.session_id);

        let mut mic_rx: Option<mpsc::Receiver<CapturedChunk>> = None;

        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(SessionCommand::Start) => self.handle_start().await,
                    Some(SessionCommand::Frame(frame)) => self.handle_frame(frame).await,
                    Some(SessionCommand::Text(text)) => self.handle_text(text).await,
                    Some(SessionCommand::ToolResponse(responses)) => {
                        self.handle_tool_response(responses).await;
                    }
                    Some(SessionCommand::Reconnect { attempt }) => {
                        self.handle_reconnect(attempt).await;
                    }
                    Some(SessionCommand::End { ack }) => {
                        self.handle_end(&mut mic_rx).await;
                        let _ = ack.send(());
                    }
                    Some(SessionCommand::GetStats { reply }) => {
                        let _ = reply.send(self.stats());
                    }
                    None => {
                        // Session handle dropped; tear everything down
                        self.handle_end(&mut mic_rx).await;
                        break;
                    }
                },
                // The driver owns the transport, so this channel never closes
                Some(event) = transport_events.recv() => {
                    self.handle_transport_event(event, &mut mic_rx).await;
                }
                chunk = Self::next_mic_chunk(&mut mic_rx) => {
                    match chunk {
                        Some(chunk) => self.handle_mic_chunk(chunk).await,
                        None => mic_rx = None,
                    }
                }
            }
        }

        info!("Session loop stopped: {}", self.config.session_id);
    }

    async fn next_mic_chunk(
        mic_rx: &mut Option<mpsc::Receiver<CapturedChunk>>,
    ) -> Option<CapturedChunk> {
        match mic_rx {
            Some(rx) => rx.recv().await,
            None => std::future::pending().await,
        }
    }

    // ------------------------------------------------------------------
    // Caller commands
    // ------------------------------------------------------------------

    async fn handle_start(&mut self) {
        if !self.state.can_start() {
            warn!("start() ignored in state '{}'", self.state);
            return;
        }

        let credential = match self.credentials.get() {
            Some(key) if is_valid_credential(&key) => key,
            _ => {
                warn!("Missing or malformed credential, not connecting");
                self.fail(LiveError::InvalidCredential);
                return;
            }
        };

        info!("Starting session {}", self.config.session_id);

        self.ended = false;
        self.error = None;
        self.reconnect_attempts = 0;
        self.encoder.reset();
        self.credential = Some(credential.clone());

        self.set_state(SessionState::Connecting);
        self.transport.connect(&credential).await;
    }

    async fn handle_frame(&mut self, frame: VideoFrame) {
        if !self.streaming_active || !self.state.accepts_media() {
            return;
        }

        let encoded = match self.encoder.encode(&frame) {
            Ok(Some(encoded)) => encoded,
            Ok(None) => return, // inside the rate window
            Err(e) => {
                warn!("Frame encoding failed: {:#}", e);
                return;
            }
        };

        self.transport
            .send(&ClientMessage::media(MediaChunk {
                mime_type: JPEG_MIME.to_string(),
                data: encoded.data,
            }))
            .await;

        if self.state == SessionState::Ready {
            self.set_state(SessionState::Streaming);
        } else {
            self.publish();
        }
    }

    async fn handle_text(&mut self, text: String) {
        if !self.state.accepts_media() {
            warn!("Text turn ignored in state '{}'", self.state);
            return;
        }

        self.transport.send(&ClientMessage::text(text)).await;
    }

    async fn handle_tool_response(&mut self, responses: Vec<FunctionResponse>) {
        if !self.state.accepts_media() {
            warn!("Tool response ignored in state '{}'", self.state);
            return;
        }

        for response in &responses {
            debug!("Tool response: {} ({})", response.name, response.id);
        }
        self.transport
            .send(&ClientMessage::tool_response(responses))
            .await;
    }

    async fn handle_end(&mut self, mic_rx: &mut Option<mpsc::Receiver<CapturedChunk>>) {
        if self.ended && self.state == SessionState::Disconnected {
            return;
        }

        info!("Ending session {}", self.config.session_id);

        self.ended = true;

        if let Some(task) = self.reconnect_task.take() {
            task.cancel();
        }

        if let Err(e) = self.capture.stop().await {
            error!("Failed to stop capture pipeline: {:#}", e);
        }
        *mic_rx = None;
        self.playback.stop();

        self.transport.disconnect().await;

        self.is_listening = false;
        self.is_speaking = false;
        self.conversation_active = false;
        self.streaming_active = false;
        self.set_state(SessionState::Disconnected);
    }

    // ------------------------------------------------------------------
    // Transport events
    // ------------------------------------------------------------------

    async fn handle_transport_event(
        &mut self,
        event: TransportEvent,
        mic_rx: &mut Option<mpsc::Receiver<CapturedChunk>>,
    ) {
        match event {
            TransportEvent::Connected => {
                self.set_state(SessionState::Connected);
                self.send_setup().await;
                self.set_state(SessionState::Configuring);
            }
            TransportEvent::Message(message) => {
                self.handle_server_message(message, mic_rx).await;
            }
            TransportEvent::Audio(bytes) => {
                if !self.ended {
                    self.playback.enqueue(&bytes);
                }
            }
            TransportEvent::Disconnected { error } => {
                self.handle_disconnect(error, mic_rx).await;
            }
        }
    }

    async fn send_setup(&mut self) {
        let mut generation_config = json!({
            "response_modalities": self.config.response_modalities,
        });

        if let Some(voice) = &self.config.voice {
            generation_config["speech_config"] = json!({
                "voice_config": { "prebuilt_voice_config": { "voice_name": voice } }
            });
        }

        let setup = Setup {
            model: self.config.model.clone(),
            generation_config: Some(generation_config),
            system_instruction: self.config.system_instruction.as_deref().map(Content::text),
        };

        info!("Sending setup for model {}", self.config.model);
        self.transport.send(&ClientMessage::setup(setup)).await;
    }

    async fn handle_disconnect(
        &mut self,
        reason: Option<String>,
        mic_rx: &mut Option<mpsc::Receiver<CapturedChunk>>,
    ) {
        if self.ended {
            self.set_state(SessionState::Disconnected);
            return;
        }

        let reason = reason.unwrap_or_else(|| "connection lost".to_string());
        warn!("Unexpected disconnect: {}", reason);

        self.reconnect_attempts += 1;
        self.total_reconnect_attempts += 1;

        if self.reconnect_attempts > self.config.max_reconnect_attempts {
            error!(
                "Giving up after {} reconnect attempts",
                self.config.max_reconnect_attempts
            );
            if let Err(e) = self.capture.stop().await {
                error!("Failed to stop capture pipeline: {:#}", e);
            }
            *mic_rx = None;
            self.playback.stop();
            self.is_listening = false;
            self.is_speaking = false;
            self.conversation_active = false;
            self.streaming_active = false;
            self.fail(LiveError::ConnectionFailed(reason));
            return;
        }

        let attempt = self.reconnect_attempts;
        let delay = Duration::from_secs(2 * attempt as u64);

        info!(
            "Reconnecting in {:?} (attempt {}/{})",
            delay, attempt, self.config.max_reconnect_attempts
        );
        self.set_state(SessionState::Reconnecting(attempt));

        let commands_tx = self.commands_tx.clone();
        self.reconnect_task = Some(DelayedTask::schedule(delay, async move {
            let _ = commands_tx
                .send(SessionCommand::Reconnect { attempt })
                .await;
        }));
    }

    async fn handle_reconnect(&mut self, attempt: u32) {
        // Cooperative cancellation: the session may have been ended or the
        // state changed while the backoff timer slept
        if self.ended || self.state != SessionState::Reconnecting(attempt) {
            debug!("Stale reconnect attempt {} ignored", attempt);
            return;
        }

        let Some(credential) = self.credential.clone() else {
            self.fail(LiveError::ConnectionFailed("no credential".to_string()));
            return;
        };

        info!("Reconnect attempt {}", attempt);
        self.set_state(SessionState::Connecting);
        self.transport.connect(&credential).await;
    }

    // ------------------------------------------------------------------
    // Inbound messages
    // ------------------------------------------------------------------

    async fn handle_server_message(
        &mut self,
        message: ServerMessage,
        mic_rx: &mut Option<mpsc::Receiver<CapturedChunk>>,
    ) {
        if message.setup_complete.is_some() {
            info!("Setup acknowledged");
            self.reconnect_attempts = 0;
            self.error = None;
            self.set_state(SessionState::Ready);
            self.start_streaming(mic_rx).await;
            return;
        }

        if let Some(content) = message.server_content {
            self.handle_server_content(content);
            return;
        }

        if let Some(tool_call) = message.tool_call {
            for call in &tool_call.function_calls {
                info!("Tool call requested: {} ({})", call.name, call.id);
                self.last_tool_call = Some(format!("{}({})", call.name, call.id));
            }
            self.publish();
            return;
        }

        if let Some(cancellation) = message.tool_call_cancellation {
            info!("Tool calls cancelled: {:?}", cancellation.ids);
            return;
        }

        if let Some(usage) = message.usage_metadata {
            self.usage = TokenUsage {
                prompt_tokens: usage.prompt_token_count,
                cached_tokens: usage.cached_content_token_count,
                response_tokens: usage.response_token_count,
                total_tokens: usage.total_token_count,
            };
            debug!("Usage: {} total tokens", self.usage.total_tokens);
        }
    }

    fn handle_server_content(&mut self, content: ServerContent) {
        if let Some(turn) = &content.model_turn {
            if !turn.parts.is_empty() {
                self.is_speaking = true;
                if self.state == SessionState::Streaming {
                    self.state = SessionState::Responding;
                }
            }
            for part in &turn.parts {
                if let Some(text) = &part.text {
                    debug!("Model text: {}", text);
                }
            }
        }

        if let Some(transcription) = content.input_transcription {
            self.input_transcript = Some(transcription.text);
        }
        if let Some(transcription) = content.output_transcription {
            self.output_transcript = Some(transcription.text);
        }

        if content.interrupted {
            info!("Generation interrupted by server");
            self.is_speaking = false;
            self.playback.interrupt();
        }

        if content.generation_complete {
            self.is_speaking = false;
        }

        if content.turn_complete {
            self.is_speaking = false;
            if self.streaming_active && self.state == SessionState::Responding {
                self.state = SessionState::Streaming;
            }
        }

        self.publish();
    }

    // ------------------------------------------------------------------
    // Media pipelines
    // ------------------------------------------------------------------

    async fn start_streaming(&mut self, mic_rx: &mut Option<mpsc::Receiver<CapturedChunk>>) {
        if !matches!(self.state, SessionState::Ready | SessionState::Streaming) {
            warn!("start_streaming ignored in state '{}'", self.state);
            return;
        }

        // Microphone failure is fatal to streaming; the state machine stays
        // in Ready and the error is surfaced
        if !self.capture.is_running() {
            match self.capture.start().await {
                Ok(rx) => *mic_rx = Some(rx),
                Err(e) => {
                    error!("Failed to start microphone capture: {:#}", e);
                    self.error = Some(LiveError::MicrophoneError(format!("{:#}", e)));
                    self.publish();
                    return;
                }
            }
        }

        // Playback failure is degraded, not fatal: the session can still
        // send media without being able to play responses
        if let Err(e) = self.playback.start() {
            warn!("Playback unavailable, continuing send-only: {:#}", e);
        }

        self.is_listening = true;
        self.conversation_active = true;
        self.streaming_active = true;
        self.publish();

        info!("Streaming started");
    }

    async fn handle_mic_chunk(&mut self, chunk: CapturedChunk) {
        if !matches!(
            self.state,
            SessionState::Streaming | SessionState::Responding
        ) {
            return;
        }

        let samples = convert::bytes_to_samples(&chunk.pcm);
        let energy = convert::rms_energy(&samples);

        // Barge-in: the user talking over the assistant clears playback
        // before their audio is forwarded
        if self.is_speaking && energy > self.config.barge_in_threshold {
            info!("Barge-in detected (energy {:.3}), interrupting playback", energy);
            self.playback.interrupt();
            self.is_speaking = false;
            self.publish();
        }

        self.transport
            .send(&ClientMessage::media(MediaChunk {
                mime_type: AUDIO_INPUT_MIME.to_string(),
                data: base64::engine::general_purpose::STANDARD.encode(&chunk.pcm),
            }))
            .await;

        self.audio_chunks_sent += 1;
    }

    // ------------------------------------------------------------------
    // State publishing
    // ------------------------------------------------------------------

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!("State: {} -> {}", self.state, state);
            self.state = state;
        }
        self.publish();
    }

    fn fail(&mut self, error: LiveError) {
        self.error = Some(error.clone());
        self.set_state(SessionState::Error(error));
    }

    fn publish(&self) {
        let encoder_stats = self.encoder.stats();
        let _ = self.snapshot_tx.send(SessionSnapshot {
            state: self.state.clone(),
            is_listening: self.is_listening,
            is_speaking: self.is_speaking,
            conversation_active: self.conversation_active,
            input_transcript: self.input_transcript.clone(),
            output_transcript: self.output_transcript.clone(),
            last_tool_call: self.last_tool_call.clone(),
            error: self.error.as_ref().map(|e| e.to_string()),
            frames_sent: encoder_stats.frames_encoded,
            frames_skipped: encoder_stats.frames_skipped,
        });
    }

    fn stats(&self) -> SessionStats {
        let encoder_stats = self.encoder.stats();
        let playback_stats = self.playback.stats();

        SessionStats {
            started_at: self.started_at,
            audio_chunks_sent: self.audio_chunks_sent,
            frames_sent: encoder_stats.frames_encoded,
            frames_skipped: encoder_stats.frames_skipped,
            playback_chunks_received: playback_stats.chunks_received,
            playback_chunks_scheduled: playback_stats.chunks_scheduled,
            reconnect_attempts: self.total_reconnect_attempts,
            usage: self.usage,
        }
    }
}
