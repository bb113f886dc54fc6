use thiserror::Error;

/// Failure classes surfaced to callers through the session state.
///
/// The orchestrator never returns these across its boundary; they are
/// published on the session snapshot together with a human-readable string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LiveError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("setup failed: {0}")]
    SetupFailed(String),

    #[error("invalid or missing API credential")]
    InvalidCredential,

    #[error("rate limited by service")]
    RateLimited,

    #[error("server error: {0}")]
    ServerError(String),

    #[error("frame encoding error: {0}")]
    EncodingError(String),

    #[error("audio playback error: {0}")]
    AudioPlaybackError(String),

    #[error("microphone error: {0}")]
    MicrophoneError(String),

    #[error("operation timed out")]
    Timeout,
}
