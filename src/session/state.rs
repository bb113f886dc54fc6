use crate::error::LiveError;

/// Session state machine.
///
/// `Disconnected → Connecting → Connected → Configuring → Ready → Streaming
/// → Responding`, with `Reconnecting` and `Error` reachable from any active
/// state.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Configuring,
    Ready,
    Streaming,
    Responding,
    Reconnecting(u32),
    Error(LiveError),
}

impl SessionState {
    /// States in which media may be sent to the service
    pub fn accepts_media(&self) -> bool {
        matches!(self, Self::Ready | Self::Streaming | Self::Responding)
    }

    /// Whether a new session may be started from this state
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Error(_))
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Configuring => write!(f, "configuring"),
            Self::Ready => write!(f, "ready"),
            Self::Streaming => write!(f, "streaming"),
            Self::Responding => write!(f, "responding"),
            Self::Reconnecting(attempt) => write!(f, "reconnecting (attempt {})", attempt),
            Self::Error(e) => write!(f, "error: {}", e),
        }
    }
}

/// Published view of the session, updated on every state or flag change.
///
/// Callers observe this through a watch channel instead of reactive
/// properties, keeping the core free of any UI toolkit.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub state: SessionState,
    /// Microphone capture is running
    pub is_listening: bool,
    /// The assistant is currently producing a spoken response
    pub is_speaking: bool,
    /// A conversation has been started and not yet ended
    pub conversation_active: bool,
    /// Latest transcription of user speech
    pub input_transcript: Option<String>,
    /// Latest transcription of assistant speech
    pub output_transcript: Option<String>,
    /// Most recent tool call requested by the service, as "name(id)"
    pub last_tool_call: Option<String>,
    /// Human-readable error, present in the Error state
    pub error: Option<String>,
    pub frames_sent: u64,
    pub frames_skipped: u64,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            state: SessionState::Disconnected,
            is_listening: false,
            is_speaking: false,
            conversation_active: false,
            input_transcript: None,
            output_transcript: None,
            last_tool_call: None,
            error: None,
            frames_sent: 0,
            frames_skipped: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_media() {
        assert!(SessionState::Ready.accepts_media());
        assert!(SessionState::Streaming.accepts_media());
        assert!(SessionState::Responding.accepts_media());
        assert!(!SessionState::Connecting.accepts_media());
        assert!(!SessionState::Reconnecting(1).accepts_media());
        assert!(!SessionState::Disconnected.accepts_media());
    }

    #[test]
    fn test_can_start() {
        assert!(SessionState::Disconnected.can_start());
        assert!(SessionState::Error(LiveError::InvalidCredential).can_start());
        assert!(!SessionState::Streaming.can_start());
        assert!(!SessionState::Configuring.can_start());
    }
}
