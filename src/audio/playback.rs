use anyhow::{Context, Result};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use super::convert;

/// Speech output node.
///
/// The platform audio renderer (or a test double) implements this trait.
/// `stop()` discards everything the node has queued; `pending()` reports how
/// many scheduled buffers have not played yet.
pub trait AudioOutput: Send {
    /// (Re)start the node so it accepts buffers
    fn start(&mut self) -> Result<()>;

    /// Schedule one buffer of normalized f32 samples for playback
    fn schedule(&mut self, samples: &[f32]) -> Result<()>;

    /// Number of scheduled buffers not yet played
    fn pending(&self) -> usize;

    /// Stop the node, discarding all queued buffers
    fn stop(&mut self);
}

/// Configuration for the playback pipeline
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Sample rate of audio received from the service (Hz)
    pub sample_rate: u32,
    /// Maximum scheduled-but-unplayed chunks before new chunks are dropped.
    /// Bounds memory growth under sustained server oversend.
    pub max_pending_chunks: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            sample_rate: 24000,
            max_pending_chunks: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PlaybackStats {
    pub chunks_received: u64,
    pub chunks_scheduled: u64,
}

struct PlaybackInner {
    output: Box<dyn AudioOutput>,
    started: bool,
    has_scheduled_audio: bool,
    stats: PlaybackStats,
}

/// Renders 16-bit PCM speech audio from the service as continuous output.
///
/// A single lock serializes `enqueue`, `interrupt` and `stop` so concurrent
/// callers cannot race the output node's internal queue.
pub struct PlaybackPipeline {
    config: PlaybackConfig,
    inner: Mutex<PlaybackInner>,
}

impl PlaybackPipeline {
    pub fn new(output: Box<dyn AudioOutput>, config: PlaybackConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(PlaybackInner {
                output,
                started: false,
                has_scheduled_audio: false,
                stats: PlaybackStats::default(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PlaybackInner> {
        match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Start the output node.
    ///
    /// Failure here leaves the session in a degraded send-only mode, so the
    /// error is propagated for the caller to log rather than handled locally.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.lock();

        inner
            .output
            .start()
            .context("Failed to start audio output")?;
        inner.started = true;

        info!("Playback pipeline started: {}Hz mono", self.config.sample_rate);

        Ok(())
    }

    /// Convert and schedule one incoming PCM chunk
    pub fn enqueue(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }

        if bytes.len() % 2 != 0 {
            warn!("Audio chunk has odd length {}, dropping trailing byte", bytes.len());
        }

        let mut inner = self.lock();
        inner.stats.chunks_received += 1;

        if !inner.started {
            debug!("Playback not started, dropping audio chunk");
            return;
        }

        if inner.output.pending() >= self.config.max_pending_chunks {
            warn!(
                "Playback backlog at {} chunks, dropping incoming chunk",
                inner.output.pending()
            );
            return;
        }

        let samples = convert::bytes_to_samples(bytes);
        let converted = convert::samples_to_f32(&samples);

        match inner.output.schedule(&converted) {
            Ok(()) => {
                inner.has_scheduled_audio = true;
                inner.stats.chunks_scheduled += 1;
            }
            Err(e) => {
                warn!("Failed to schedule audio chunk: {}", e);
            }
        }
    }

    /// Discard everything queued and restart the node ready for new buffers.
    ///
    /// This realizes barge-in without tearing down the whole pipeline.
    pub fn interrupt(&self) {
        let mut inner = self.lock();

        if !inner.started {
            return;
        }

        inner.output.stop();
        inner.has_scheduled_audio = false;

        if let Err(e) = inner.output.start() {
            warn!("Failed to restart audio output after interrupt: {}", e);
            inner.started = false;
        } else {
            info!("Playback interrupted, output restarted");
        }
    }

    /// Full teardown; safe to call when already stopped
    pub fn stop(&self) {
        let mut inner = self.lock();

        if !inner.started {
            return;
        }

        inner.output.stop();
        inner.started = false;
        inner.has_scheduled_audio = false;

        info!(
            "Playback pipeline stopped ({} chunks received, {} scheduled)",
            inner.stats.chunks_received, inner.stats.chunks_scheduled
        );
    }

    pub fn is_started(&self) -> bool {
        self.lock().started
    }

    pub fn has_scheduled_audio(&self) -> bool {
        self.lock().has_scheduled_audio
    }

    pub fn stats(&self) -> PlaybackStats {
        self.lock().stats
    }
}

/// Output node that accepts and discards all audio.
///
/// Stands in for a real renderer in the demo binary and in tests.
#[derive(Default)]
pub struct NullOutput {
    running: bool,
}

impl AudioOutput for NullOutput {
    fn start(&mut self) -> Result<()> {
        self.running = true;
        Ok(())
    }

    fn schedule(&mut self, _samples: &[f32]) -> Result<()> {
        if !self.running {
            anyhow::bail!("Output not running");
        }
        Ok(())
    }

    fn pending(&self) -> usize {
        0
    }

    fn stop(&mut self) {
        self.running = false;
    }
}
