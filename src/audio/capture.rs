use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::convert;

/// Audio sample data delivered by an input source (i16 PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Microphone input source.
///
/// Platform capture backends (CoreAudio, WASAPI, ALSA, ...) implement this
/// trait; the pipeline only sees the resulting frame channel.
#[async_trait::async_trait]
pub trait AudioInput: Send + Sync {
    /// Start capturing audio.
    ///
    /// Returns a channel receiver that will receive native-format frames.
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing audio
    async fn stop(&mut self) -> Result<()>;

    /// Check if the input is currently capturing
    fn is_capturing(&self) -> bool;

    /// Input name for logging
    fn name(&self) -> &str;
}

/// Configuration for the capture pipeline
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Sample rate of emitted chunks (service expects 16kHz)
    pub target_sample_rate: u32,
    /// How often the accumulator is drained into a chunk
    pub chunk_interval_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16000,
            chunk_interval_ms: 100,
        }
    }
}

/// One wire-ready unit of microphone audio (16kHz mono i16 LE bytes)
#[derive(Debug, Clone)]
pub struct CapturedChunk {
    pub pcm: Vec<u8>,
}

/// Converts native microphone frames into fixed-cadence wire-format chunks.
///
/// Frames arriving from the input are resampled and downmixed to the target
/// format, appended to a locked accumulator, and drained into one chunk every
/// `chunk_interval_ms` of wall-clock time. The cadence check decouples chunk
/// size from the input's native buffer granularity.
pub struct CapturePipeline {
    config: CaptureConfig,
    input: Box<dyn AudioInput>,
    running: Arc<AtomicBool>,
    accumulator: Arc<Mutex<Vec<u8>>>,
    task: Option<JoinHandle<()>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl CapturePipeline {
    pub fn new(input: Box<dyn AudioInput>, config: CaptureConfig) -> Self {
        Self {
            config,
            input,
            running: Arc::new(AtomicBool::new(false)),
            accumulator: Arc::new(Mutex::new(Vec::new())),
            task: None,
            shutdown: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start capture and chunk emission.
    ///
    /// Fails if the underlying input cannot be opened. Returns the channel
    /// on which wire-ready chunks are delivered.
    pub async fn start(&mut self) -> Result<mpsc::Receiver<CapturedChunk>> {
        if self.running.load(Ordering::SeqCst) {
            anyhow::bail!("Capture pipeline already running");
        }

        let mut frames = self
            .input
            .start()
            .await
            .with_context(|| format!("Failed to start audio input '{}'", self.input.name()))?;

        info!(
            "Capture pipeline started: input '{}', target {}Hz mono, {}ms chunks",
            self.input.name(),
            self.config.target_sample_rate,
            self.config.chunk_interval_ms
        );

        self.running.store(true, Ordering::SeqCst);

        let (chunks_tx, chunks_rx) = mpsc::channel(32);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let running = Arc::clone(&self.running);
        let accumulator = Arc::clone(&self.accumulator);
        let config = self.config.clone();

        let task = tokio::spawn(async move {
            let mut last_emit = Instant::now();

            loop {
                // The shutdown signal unblocks stop() even when the input
                // keeps its frame sender alive after being told to stop
                let frame = tokio::select! {
                    frame = frames.recv() => match frame {
                        Some(frame) => frame,
                        None => break,
                    },
                    _ = &mut shutdown_rx => break,
                };

                if !running.load(Ordering::SeqCst) {
                    break;
                }

                // Convert to wire format; a single bad buffer is dropped,
                // never fatal to the stream
                match Self::convert_frame(&frame, config.target_sample_rate) {
                    Ok(bytes) => {
                        let mut acc = match accumulator.lock() {
                            Ok(acc) => acc,
                            Err(poisoned) => poisoned.into_inner(),
                        };
                        acc.extend_from_slice(&bytes);
                    }
                    Err(e) => {
                        warn!("Dropping audio buffer after conversion failure: {}", e);
                        continue;
                    }
                }

                if last_emit.elapsed().as_millis() as u64 >= config.chunk_interval_ms {
                    last_emit = Instant::now();
                    if let Some(chunk) = Self::drain(&accumulator) {
                        if chunks_tx.send(chunk).await.is_err() {
                            debug!("Chunk receiver dropped, stopping capture task");
                            break;
                        }
                    }
                }
            }

            // Emit whatever accumulated before capture stopped
            if let Some(chunk) = Self::drain(&accumulator) {
                let _ = chunks_tx.send(chunk).await;
            }

            info!("Capture pipeline task stopped");
        });

        self.task = Some(task);
        self.shutdown = Some(shutdown_tx);

        Ok(chunks_rx)
    }

    /// Stop capture and clear the accumulator; safe to call when never started
    pub async fn stop(&mut self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            // Never started or already stopped
            if self.input.is_capturing() {
                self.input.stop().await.ok();
            }
            return Ok(());
        }

        if let Err(e) = self.input.stop().await {
            error!("Failed to stop audio input: {}", e);
        }

        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Capture task panicked: {}", e);
            }
        }

        match self.accumulator.lock() {
            Ok(mut acc) => acc.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }

        info!("Capture pipeline stopped");

        Ok(())
    }

    fn convert_frame(frame: &AudioFrame, target_rate: u32) -> Result<Vec<u8>> {
        if frame.channels == 0 || frame.sample_rate == 0 {
            anyhow::bail!(
                "Invalid frame format: {} channels at {}Hz",
                frame.channels,
                frame.sample_rate
            );
        }

        let mono = convert::downmix_mono(&frame.samples, frame.channels);
        let resampled = convert::resample_linear(&mono, frame.sample_rate, target_rate);

        Ok(convert::pcm_to_bytes(&resampled))
    }

    fn drain(accumulator: &Arc<Mutex<Vec<u8>>>) -> Option<CapturedChunk> {
        let mut acc = match accumulator.lock() {
            Ok(acc) => acc,
            Err(poisoned) => poisoned.into_inner(),
        };

        if acc.is_empty() {
            return None;
        }

        Some(CapturedChunk {
            pcm: std::mem::take(&mut *acc),
        })
    }
}

/// Input source producing silence at a fixed rate.
///
/// Stands in for a real microphone in the demo binary and in tests.
pub struct SilenceInput {
    sample_rate: u32,
    channels: u16,
    capturing: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl SilenceInput {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            capturing: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioInput for SilenceInput {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        let (tx, rx) = mpsc::channel(16);
        self.capturing.store(true, Ordering::SeqCst);

        let capturing = Arc::clone(&self.capturing);
        let sample_rate = self.sample_rate;
        let channels = self.channels;
        let samples_per_buffer = (sample_rate as usize / 10) * channels as usize;

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_millis(100));
            let mut elapsed_ms = 0u64;

            while capturing.load(Ordering::SeqCst) {
                interval.tick().await;

                let frame = AudioFrame {
                    samples: vec![0i16; samples_per_buffer],
                    sample_rate,
                    channels,
                    timestamp_ms: elapsed_ms,
                };
                elapsed_ms += 100;

                if tx.send(frame).await.is_err() {
                    break;
                }
            }
        });

        self.task = Some(task);

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.capturing.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "silence"
    }
}
