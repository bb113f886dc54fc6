// Tests for the microphone capture pipeline: format conversion, chunk
// emission and idempotent shutdown, driven by a scripted input source.

use anyhow::Result;
use loqa_live::audio::{AudioFrame, AudioInput, CaptureConfig, CapturePipeline};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Input source that plays back a fixed list of frames, one per tick
struct ScriptedInput {
    frames: Vec<AudioFrame>,
    frame_interval_ms: u64,
    capturing: Arc<AtomicBool>,
}

impl ScriptedInput {
    fn new(frames: Vec<AudioFrame>, frame_interval_ms: u64) -> Self {
        Self {
            frames,
            frame_interval_ms,
            capturing: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait::async_trait]
impl AudioInput for ScriptedInput {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        let (tx, rx) = mpsc::channel(16);
        self.capturing.store(true, Ordering::SeqCst);

        let frames = self.frames.clone();
        let interval = self.frame_interval_ms;
        let capturing = Arc::clone(&self.capturing);

        tokio::spawn(async move {
            for frame in frames {
                if !capturing.load(Ordering::SeqCst) {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(interval)).await;
                if tx.send(frame).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.capturing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Input source whose producer task keeps its frame sender alive after
/// `stop()`, the way a sloppy platform backend might
struct LingeringInput {
    capturing: Arc<AtomicBool>,
}

#[async_trait::async_trait]
impl AudioInput for LingeringInput {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        let (tx, rx) = mpsc::channel(16);
        self.capturing.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                let frame = AudioFrame {
                    samples: vec![0i16; 160],
                    sample_rate: 16000,
                    channels: 1,
                    timestamp_ms: 0,
                };
                if tx.send(frame).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        // Deliberately leaves the producer task (and its sender) running
        self.capturing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "lingering"
    }
}

/// Input source that refuses to open
struct BrokenInput;

#[async_trait::async_trait]
impl AudioInput for BrokenInput {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        anyhow::bail!("microphone in use by another process")
    }

    async fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "broken"
    }
}

fn native_frame(samples: Vec<i16>, sample_rate: u32, channels: u16, ts: u64) -> AudioFrame {
    AudioFrame {
        samples,
        sample_rate,
        channels,
        timestamp_ms: ts,
    }
}

async fn collect_chunks(mut rx: mpsc::Receiver<loqa_live::audio::CapturedChunk>) -> Vec<Vec<u8>> {
    let mut chunks = Vec::new();
    while let Some(chunk) = rx.recv().await {
        chunks.push(chunk.pcm);
    }
    chunks
}

#[tokio::test(start_paused = true)]
async fn test_converts_to_wire_format() {
    // 48kHz stereo input downmixed and resampled to 16kHz mono:
    // 960 samples (480 frames) -> 160 mono samples -> 320 bytes
    let frames = vec![native_frame(vec![300i16; 960], 48000, 2, 0)];
    let mut pipeline = CapturePipeline::new(
        Box::new(ScriptedInput::new(frames, 10)),
        CaptureConfig::default(),
    );

    let rx = pipeline.start().await.unwrap();
    let chunks = collect_chunks(rx).await;

    let total: usize = chunks.iter().map(|c| c.len()).sum();
    assert_eq!(total, 320);

    // Constant input stays constant through downmix + resample
    let first = i16::from_le_bytes([chunks[0][0], chunks[0][1]]);
    assert_eq!(first, 300);

    pipeline.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_chunks_emitted_on_cadence() {
    // Four 50ms buffers arriving every 60ms cross the 100ms cadence twice
    let buffer = vec![100i16; 800]; // 50ms at 16kHz mono
    let frames = (0..4)
        .map(|i| native_frame(buffer.clone(), 16000, 1, i * 60))
        .collect();

    let mut pipeline = CapturePipeline::new(
        Box::new(ScriptedInput::new(frames, 60)),
        CaptureConfig::default(),
    );

    let rx = pipeline.start().await.unwrap();
    let chunks = collect_chunks(rx).await;

    assert!(chunks.len() >= 2, "expected cadence drains, got {} chunks", chunks.len());
    // Nothing lost across chunk boundaries: 4 * 800 samples * 2 bytes
    let total: usize = chunks.iter().map(|c| c.len()).sum();
    assert_eq!(total, 6400);

    pipeline.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_bad_buffer_dropped_stream_continues() {
    let frames = vec![
        native_frame(vec![10i16; 160], 16000, 1, 0),
        // Invalid format: zero channels; dropped without killing the stream
        native_frame(vec![99i16; 160], 0, 0, 10),
        native_frame(vec![20i16; 160], 16000, 1, 20),
    ];

    let mut pipeline = CapturePipeline::new(
        Box::new(ScriptedInput::new(frames, 10)),
        CaptureConfig::default(),
    );

    let rx = pipeline.start().await.unwrap();
    let chunks = collect_chunks(rx).await;

    let total: usize = chunks.iter().map(|c| c.len()).sum();
    assert_eq!(total, 640, "two valid buffers survive, the bad one is dropped");

    pipeline.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_start_fails_when_input_cannot_open() {
    let mut pipeline = CapturePipeline::new(Box::new(BrokenInput), CaptureConfig::default());

    let result = pipeline.start().await;
    assert!(result.is_err());
    assert!(!pipeline.is_running());

    // stop() after a failed start is still safe
    pipeline.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_idempotent() {
    let frames = vec![native_frame(vec![1i16; 160], 16000, 1, 0)];
    let mut pipeline = CapturePipeline::new(
        Box::new(ScriptedInput::new(frames, 10)),
        CaptureConfig::default(),
    );

    // Never started
    pipeline.stop().await.unwrap();

    let _rx = pipeline.start().await.unwrap();
    pipeline.stop().await.unwrap();
    pipeline.stop().await.unwrap();
    assert!(!pipeline.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_stop_completes_when_input_keeps_sender_alive() {
    let input = LingeringInput {
        capturing: Arc::new(AtomicBool::new(false)),
    };
    let mut pipeline = CapturePipeline::new(Box::new(input), CaptureConfig::default());

    let _rx = pipeline.start().await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(250)).await;

    // stop() must not wait for the input's sender to drop
    let stopped =
        tokio::time::timeout(std::time::Duration::from_secs(30), pipeline.stop()).await;
    assert!(stopped.is_ok(), "stop() blocked on a lingering input");
    assert!(!pipeline.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_cannot_start_twice() {
    let frames = vec![native_frame(vec![1i16; 160], 16000, 1, 0)];
    let mut pipeline = CapturePipeline::new(
        Box::new(ScriptedInput::new(frames, 10)),
        CaptureConfig::default(),
    );

    let _rx = pipeline.start().await.unwrap();
    assert!(pipeline.start().await.is_err());

    pipeline.stop().await.unwrap();
}
