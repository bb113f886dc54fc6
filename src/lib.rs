pub mod audio;
pub mod config;
pub mod credentials;
pub mod error;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod video;

pub use audio::{
    AudioFrame, AudioInput, AudioOutput, CaptureConfig, CapturePipeline, CapturedChunk,
    NullOutput, PlaybackConfig, PlaybackPipeline, SilenceInput,
};
pub use config::Config;
pub use credentials::{CredentialStore, EnvCredentialStore};
pub use error::LiveError;
pub use protocol::{ClientMessage, MediaChunk, ServerContent, ServerMessage};
pub use session::{LiveSession, SessionConfig, SessionSnapshot, SessionState, SessionStats};
pub use transport::{Transport, TransportEvent, WsTransport};
pub use video::{EncodedFrame, EncoderPreset, FrameEncoder, VideoFrame};
