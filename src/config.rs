use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub video: VideoConfig,
    pub session: SessionLimits,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    /// Websocket endpoint base URL (credential appended as a query parameter)
    pub url: String,
    /// Model identifier sent in the setup message
    pub model: String,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    /// Sample rate for audio sent to the service (Hz)
    pub capture_sample_rate: u32,
    /// Sample rate of audio received from the service (Hz)
    pub playback_sample_rate: u32,
    /// How often accumulated microphone audio is emitted (ms)
    pub chunk_interval_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct VideoConfig {
    /// Encoder preset name: "low_bandwidth", "balanced" or "high_quality"
    pub preset: String,
}

#[derive(Debug, Deserialize)]
pub struct SessionLimits {
    pub max_reconnect_attempts: u32,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
