//! Video frame encoding for low-bandwidth upload.

pub mod encoder;

pub use encoder::{
    EncodedFrame, EncoderConfig, EncoderPreset, EncoderStats, FrameEncoder, VideoFrame,
};
