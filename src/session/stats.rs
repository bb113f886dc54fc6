use chrono::{DateTime, Utc};
use serde::Serialize;

/// Statistics about a streaming session, for diagnostics only
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    /// When the session object was created
    pub started_at: DateTime<Utc>,

    /// Microphone chunks forwarded to the service
    pub audio_chunks_sent: u64,

    /// Video frames encoded and sent
    pub frames_sent: u64,

    /// Video frames skipped by the encoder's rate limiter
    pub frames_skipped: u64,

    /// Speech chunks received from the service
    pub playback_chunks_received: u64,

    /// Speech chunks successfully scheduled for output
    pub playback_chunks_scheduled: u64,

    /// Reconnection attempts made over the session lifetime
    pub reconnect_attempts: u64,

    /// Latest token usage reported by the service
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub cached_tokens: u64,
    pub response_tokens: u64,
    pub total_tokens: u64,
}
