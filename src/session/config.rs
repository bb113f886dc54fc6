use crate::audio::{CaptureConfig, PlaybackConfig};
use crate::video::EncoderPreset;

/// Configuration for a streaming session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Unique session identifier
    pub session_id: String,

    /// Model identifier sent in the setup message
    pub model: String,

    /// System instruction declared at setup, if any
    pub system_instruction: Option<String>,

    /// Response modalities requested from the service
    pub response_modalities: Vec<String>,

    /// Prebuilt voice name for speech synthesis, if any
    pub voice: Option<String>,

    /// Frame encoder preset
    pub encoder_preset: EncoderPreset,

    /// Microphone capture format and cadence
    pub capture: CaptureConfig,

    /// Speech playback format and backlog policy
    pub playback: PlaybackConfig,

    /// RMS energy above which user speech interrupts playback
    pub barge_in_threshold: f32,

    /// Reconnection attempts before giving up
    pub max_reconnect_attempts: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("live-{}", uuid::Uuid::new_v4()),
            model: "models/gemini-2.0-flash-live-001".to_string(),
            system_instruction: None,
            response_modalities: vec!["AUDIO".to_string()],
            voice: None,
            encoder_preset: EncoderPreset::Balanced,
            capture: CaptureConfig::default(),
            playback: PlaybackConfig::default(),
            barge_in_threshold: 0.05,
            max_reconnect_attempts: 3,
        }
    }
}
