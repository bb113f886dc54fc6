//! Sample format conversion helpers shared by the capture and playback
//! pipelines: resampling, channel downmix, PCM byte packing and energy
//! measurement.

/// Resample i16 mono samples with linear interpolation.
///
/// Handles arbitrary rate ratios in both directions; identical rates return
/// the input unchanged.
pub fn resample_linear(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((samples.len() as f64) / ratio).floor() as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let pos = i as f64 * ratio;
        let idx = pos as usize;
        let frac = pos - idx as f64;

        let a = samples[idx] as f64;
        let b = samples.get(idx + 1).copied().unwrap_or(samples[idx]) as f64;
        let value = a + (b - a) * frac;

        out.push(value.clamp(i16::MIN as f64, i16::MAX as f64) as i16);
    }

    out
}

/// Downmix interleaved samples to mono by averaging channels.
///
/// Mono input is returned unchanged; a trailing partial frame is dropped.
pub fn downmix_mono(samples: &[i16], channels: u16) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }

    let channels = channels as usize;
    let mut mono = Vec::with_capacity(samples.len() / channels);

    for frame in samples.chunks_exact(channels) {
        let sum: i32 = frame.iter().map(|&s| s as i32).sum();
        let avg = sum / channels as i32;
        mono.push(avg.clamp(i16::MIN as i32, i16::MAX as i32) as i16);
    }

    mono
}

/// Pack i16 samples as little-endian PCM bytes.
pub fn pcm_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Unpack little-endian PCM bytes into i16 samples.
///
/// An odd trailing byte is ignored.
pub fn bytes_to_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Root-mean-square energy of i16 samples normalized to [-1, 1].
///
/// Used for barge-in detection: energy above a small threshold while the
/// assistant is speaking means the user has started talking over it.
pub fn rms_energy(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&s| {
            let normalized = s as f64 / 32768.0;
            normalized * normalized
        })
        .sum();

    (sum_squares / samples.len() as f64).sqrt() as f32
}

/// Convert i16 PCM samples to normalized f32 for an audio output node.
pub fn samples_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}
