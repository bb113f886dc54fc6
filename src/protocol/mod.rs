//! Typed schema for the wire protocol.
//!
//! Messages are JSON envelopes with snake_case field names. An outbound
//! envelope carries exactly one of the client message kinds; an inbound
//! envelope populates at most one top-level field per logical event, though
//! several flags inside `server_content` may co-occur in a single message.

mod messages;

pub use messages::{
    ClientContent, ClientMessage, Content, FunctionCall, FunctionResponse, InlineData,
    MediaChunk, Part, RealtimeInput, ServerContent, ServerMessage, Setup, ToolCall,
    ToolCallCancellation, ToolResponse, Transcription, UsageMetadata, AUDIO_INPUT_MIME,
    JPEG_MIME,
};
