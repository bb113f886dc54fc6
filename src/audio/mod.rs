//! Real-time audio pipelines.
//!
//! Capture converts native microphone frames into wire-format chunks on a
//! fixed cadence; playback renders PCM speech from the service with support
//! for immediate interruption. Both sit behind traits so platform device I/O
//! stays outside the core.

pub mod capture;
pub mod convert;
pub mod playback;

pub use capture::{
    AudioFrame, AudioInput, CaptureConfig, CapturePipeline, CapturedChunk, SilenceInput,
};
pub use playback::{AudioOutput, NullOutput, PlaybackConfig, PlaybackPipeline, PlaybackStats};
