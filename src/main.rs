use anyhow::Result;
use loqa_live::{
    CaptureConfig, CapturePipeline, Config, EncoderPreset, EnvCredentialStore, LiveSession,
    NullOutput, PlaybackConfig, PlaybackPipeline, SessionConfig, SilenceInput, WsTransport,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cfg = Config::load("config/loqa-live")?;

    info!("Loqa Live v0.1.0");
    info!("Loaded config: {}", cfg.service.name);
    info!("Endpoint: {}", cfg.service.url);
    info!("Model: {}", cfg.service.model);

    let session_config = SessionConfig {
        model: cfg.service.model.clone(),
        encoder_preset: EncoderPreset::from_name(&cfg.video.preset)
            .unwrap_or(EncoderPreset::Balanced),
        capture: CaptureConfig {
            target_sample_rate: cfg.audio.capture_sample_rate,
            chunk_interval_ms: cfg.audio.chunk_interval_ms,
        },
        playback: PlaybackConfig {
            sample_rate: cfg.audio.playback_sample_rate,
            ..PlaybackConfig::default()
        },
        max_reconnect_attempts: cfg.session.max_reconnect_attempts,
        ..SessionConfig::default()
    };

    let (events_tx, events_rx) = mpsc::channel(64);
    let transport = Arc::new(WsTransport::new(cfg.service.url.clone(), events_tx));
    let credentials = Arc::new(EnvCredentialStore::default());

    // Demo collaborators: a real integration injects its platform microphone
    // and speaker behind the AudioInput / AudioOutput traits
    let capture = CapturePipeline::new(
        Box::new(SilenceInput::new(48000, 2)),
        session_config.capture.clone(),
    );
    let playback = PlaybackPipeline::new(
        Box::<NullOutput>::default(),
        session_config.playback.clone(),
    );

    let session = LiveSession::new(
        session_config,
        credentials,
        transport,
        events_rx,
        capture,
        playback,
    );

    session.start().await;

    let mut updates = session.subscribe();
    let watcher = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow().clone();
            info!(
                "Session: {} (listening={}, speaking={})",
                snapshot.state, snapshot.is_listening, snapshot.is_speaking
            );
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    session.end().await;
    if let Some(stats) = session.stats().await {
        info!(
            "Session stats: {} audio chunks, {} frames sent, {} skipped",
            stats.audio_chunks_sent, stats.frames_sent, stats.frames_skipped
        );
    }
    watcher.abort();

    Ok(())
}
