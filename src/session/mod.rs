//! Streaming session management
//!
//! This module provides the `LiveSession` orchestrator that manages:
//! - The session state machine and published flags
//! - Transport connect/setup/reconnect with bounded backoff
//! - Frame and microphone chunk forwarding
//! - Speech playback and barge-in interruption

mod config;
mod session;
mod state;
mod stats;
mod timer;

pub use config::SessionConfig;
pub use session::LiveSession;
pub use state::{SessionSnapshot, SessionState};
pub use stats::{SessionStats, TokenUsage};
pub use timer::DelayedTask;
