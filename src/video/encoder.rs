use anyhow::{Context, Result};
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::RgbImage;
use tracing::{debug, info};

/// A raw video frame from the caller's frame source
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Packed RGB8 pixels, row-major, length = width * height * 3
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Timestamp in milliseconds since an arbitrary epoch
    pub timestamp_ms: u64,
}

/// One wire-ready compressed frame
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// Base64-encoded JPEG bytes
    pub data: String,
    pub width: u32,
    pub height: u32,
}

/// Named configurations trading frame rate, quality and resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderPreset {
    /// 2 FPS, quality 50, max 480x360
    LowBandwidth,
    /// 3 FPS, quality 60, max 640x480
    Balanced,
    /// 4 FPS, quality 70, max 800x600
    HighQuality,
}

impl EncoderPreset {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "low_bandwidth" => Some(Self::LowBandwidth),
            "balanced" => Some(Self::Balanced),
            "high_quality" => Some(Self::HighQuality),
            _ => None,
        }
    }

    pub fn config(self) -> EncoderConfig {
        match self {
            Self::LowBandwidth => EncoderConfig {
                target_fps: 2.0,
                jpeg_quality: 50,
                max_width: 480,
                max_height: 360,
            },
            Self::Balanced => EncoderConfig {
                target_fps: 3.0,
                jpeg_quality: 60,
                max_width: 640,
                max_height: 480,
            },
            Self::HighQuality => EncoderConfig {
                target_fps: 4.0,
                jpeg_quality: 70,
                max_width: 800,
                max_height: 600,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub target_fps: f64,
    pub jpeg_quality: u8,
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        EncoderPreset::Balanced.config()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EncoderStats {
    pub frames_encoded: u64,
    pub frames_skipped: u64,
}

/// Converts raw frames into rate-limited, size-bounded JPEG stills.
///
/// The rate-limit check runs before any pixel work, so frames arriving faster
/// than the target rate cost only a timestamp comparison.
pub struct FrameEncoder {
    config: EncoderConfig,
    min_interval_ms: u64,
    last_encoded_ms: Option<u64>,
    stats: EncoderStats,
}

impl FrameEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        let min_interval_ms = (1000.0 / config.target_fps) as u64;

        info!(
            "Frame encoder initialized: {} FPS, quality {}, max {}x{}",
            config.target_fps, config.jpeg_quality, config.max_width, config.max_height
        );

        Self {
            config,
            min_interval_ms,
            last_encoded_ms: None,
            stats: EncoderStats::default(),
        }
    }

    pub fn with_preset(preset: EncoderPreset) -> Self {
        Self::new(preset.config())
    }

    /// Whether a frame at this timestamp would pass the rate limit
    pub fn is_due(&self, timestamp_ms: u64) -> bool {
        match self.last_encoded_ms {
            None => true,
            Some(last) => timestamp_ms.saturating_sub(last) >= self.min_interval_ms,
        }
    }

    /// Encode a frame, or return None if it falls inside the rate window
    pub fn encode(&mut self, frame: &VideoFrame) -> Result<Option<EncodedFrame>> {
        if !self.is_due(frame.timestamp_ms) {
            self.stats.frames_skipped += 1;
            return Ok(None);
        }

        let encoded = self.encode_now(frame)?;

        self.last_encoded_ms = Some(frame.timestamp_ms);
        self.stats.frames_encoded += 1;

        Ok(Some(encoded))
    }

    fn encode_now(&self, frame: &VideoFrame) -> Result<EncodedFrame> {
        let expected = frame.width as usize * frame.height as usize * 3;
        if frame.pixels.len() != expected {
            anyhow::bail!(
                "Pixel buffer length {} does not match {}x{} RGB frame",
                frame.pixels.len(),
                frame.width,
                frame.height
            );
        }

        let img = RgbImage::from_raw(frame.width, frame.height, frame.pixels.clone())
            .context("Failed to interpret pixel buffer as RGB image")?;

        // Uniform scale factor; never upscale
        let scale = f64::min(
            self.config.max_width as f64 / frame.width as f64,
            self.config.max_height as f64 / frame.height as f64,
        )
        .min(1.0);

        let (out_w, out_h) = (
            ((frame.width as f64 * scale) as u32).max(1),
            ((frame.height as f64 * scale) as u32).max(1),
        );

        let img = if scale < 1.0 {
            image::imageops::resize(&img, out_w, out_h, FilterType::Triangle)
        } else {
            img
        };

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.config.jpeg_quality)
            .encode_image(&img)
            .context("JPEG encoding failed")?;

        debug!(
            "Encoded frame {}x{} -> {}x{}, {} bytes",
            frame.width,
            frame.height,
            out_w,
            out_h,
            jpeg.len()
        );

        Ok(EncodedFrame {
            data: base64::engine::general_purpose::STANDARD.encode(&jpeg),
            width: out_w,
            height: out_h,
        })
    }

    /// Zero counters and the rate-limit clock.
    ///
    /// Must be called at the start of every streaming session so a stale
    /// last-encoded timestamp from a previous session cannot suppress the
    /// first frames of the next one.
    pub fn reset(&mut self) {
        self.last_encoded_ms = None;
        self.stats = EncoderStats::default();
    }

    pub fn stats(&self) -> EncoderStats {
        self.stats
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: u32, height: u32, timestamp_ms: u64) -> VideoFrame {
        VideoFrame {
            pixels: vec![128u8; (width * height * 3) as usize],
            width,
            height,
            timestamp_ms,
        }
    }

    #[test]
    fn test_first_frame_always_encodes() {
        let mut encoder = FrameEncoder::with_preset(EncoderPreset::Balanced);
        let out = encoder.encode(&solid_frame(64, 48, 0)).unwrap();
        assert!(out.is_some());
        assert_eq!(encoder.stats().frames_encoded, 1);
    }

    #[test]
    fn test_rate_limit_skips_fast_frames() {
        // Balanced = 3 FPS, min interval ~333ms
        let mut encoder = FrameEncoder::with_preset(EncoderPreset::Balanced);

        assert!(encoder.encode(&solid_frame(64, 48, 0)).unwrap().is_some());
        assert!(encoder.encode(&solid_frame(64, 48, 100)).unwrap().is_none());
        assert!(encoder.encode(&solid_frame(64, 48, 200)).unwrap().is_none());
        assert!(encoder.encode(&solid_frame(64, 48, 340)).unwrap().is_some());

        let stats = encoder.stats();
        assert_eq!(stats.frames_encoded, 2);
        assert_eq!(stats.frames_skipped, 2);
    }

    #[test]
    fn test_rate_limit_bound_holds() {
        // 1 second of frames every 20ms at 3 FPS yields at most
        // floor(elapsed * fps) + 1 = 4 outputs
        let mut encoder = FrameEncoder::with_preset(EncoderPreset::Balanced);
        let mut emitted = 0;
        for ts in (0..=1000).step_by(20) {
            if encoder.encode(&solid_frame(32, 24, ts)).unwrap().is_some() {
                emitted += 1;
            }
        }
        assert!(emitted <= 4, "emitted {} frames in 1s at 3 FPS", emitted);
    }

    #[test]
    fn test_never_upscales() {
        let mut encoder = FrameEncoder::with_preset(EncoderPreset::HighQuality);
        let out = encoder.encode(&solid_frame(320, 240, 0)).unwrap().unwrap();
        assert_eq!(out.width, 320);
        assert_eq!(out.height, 240);
    }

    #[test]
    fn test_downscales_uniformly() {
        let mut encoder = FrameEncoder::with_preset(EncoderPreset::LowBandwidth);
        // 1920x1080 into 480x360: scale = min(0.25, 0.333) = 0.25
        let out = encoder.encode(&solid_frame(1920, 1080, 0)).unwrap().unwrap();
        assert_eq!(out.width, 480);
        assert_eq!(out.height, 270);
    }

    #[test]
    fn test_reset_clears_rate_clock() {
        let mut encoder = FrameEncoder::with_preset(EncoderPreset::Balanced);
        assert!(encoder.encode(&solid_frame(32, 24, 1000)).unwrap().is_some());

        encoder.reset();
        assert_eq!(encoder.stats().frames_encoded, 0);
        // A frame with an earlier timestamp encodes after reset
        assert!(encoder.encode(&solid_frame(32, 24, 10)).unwrap().is_some());
    }

    #[test]
    fn test_bad_pixel_length_is_error() {
        let mut encoder = FrameEncoder::with_preset(EncoderPreset::Balanced);
        let frame = VideoFrame {
            pixels: vec![0u8; 100],
            width: 64,
            height: 48,
            timestamp_ms: 0,
        };
        assert!(encoder.encode(&frame).is_err());
    }

    #[test]
    fn test_preset_sizes_monotonic() {
        // Textured input so the quality setting actually affects output size
        let mut pixels = Vec::with_capacity(64 * 48 * 3);
        for y in 0..48u32 {
            for x in 0..64u32 {
                pixels.push((x * 4) as u8);
                pixels.push((y * 5) as u8);
                pixels.push(((x * y) % 251) as u8);
            }
        }
        let frame = VideoFrame {
            pixels,
            width: 64,
            height: 48,
            timestamp_ms: 0,
        };

        let balanced = FrameEncoder::with_preset(EncoderPreset::Balanced)
            .encode(&frame)
            .unwrap()
            .unwrap();
        let high = FrameEncoder::with_preset(EncoderPreset::HighQuality)
            .encode(&frame)
            .unwrap()
            .unwrap();

        assert!(balanced.data.len() <= high.data.len());
    }

    #[test]
    fn test_preset_lookup() {
        assert_eq!(
            EncoderPreset::from_name("balanced"),
            Some(EncoderPreset::Balanced)
        );
        assert_eq!(EncoderPreset::from_name("ultra"), None);
    }
}
