//! Input capture ownership and frame conversion.
//!
//! The session does not talk to audio hardware itself; a [`CaptureSource`]
//! implementation (a microphone in the voice demo, a counter in tests) is
//! attached before connecting and is started/stopped by the session so that
//! the device is never left open past the session's lifetime.

use crate::error::Result;

/// A live input-frame producer, owned by the session for its duration.
pub trait CaptureSource: Send {
    /// Acquire the device and begin producing frames.
    ///
    /// Fails with `PermissionDenied` or `DeviceUnavailable` when the device
    /// cannot be acquired.
    fn start(&mut self) -> Result<()>;

    /// Release the device. Called exactly once per successful `start`.
    fn stop(&mut self);
}

/// Convert float samples to the wire-level linear PCM encoding.
pub fn f32_to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect()
}

/// Little-endian byte image of PCM16 samples.
pub fn pcm16_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// Reinterpret little-endian PCM16 bytes as samples. A trailing odd byte is
/// dropped.
pub fn bytes_to_pcm16(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Mean absolute amplitude of a frame, normalized to `0.0..=1.0`.
/// Presentational loudness feedback only.
pub fn mean_abs_level(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64).abs()).sum();
    (sum / samples.len() as f64 / i16::MAX as f64) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_conversion_clamps_out_of_range() {
        let samples = f32_to_pcm16(&[0.0, 1.0, -1.0, 2.0, -2.0]);
        assert_eq!(samples, vec![0, i16::MAX, -i16::MAX, i16::MAX, -i16::MAX]);
    }

    #[test]
    fn byte_round_trip() {
        let samples = vec![0i16, 1, -1, i16::MAX, i16::MIN];
        assert_eq!(bytes_to_pcm16(&pcm16_to_bytes(&samples)), samples);
    }

    #[test]
    fn level_is_zero_for_silence_and_one_for_full_scale() {
        assert_eq!(mean_abs_level(&[]), 0.0);
        assert_eq!(mean_abs_level(&[0, 0, 0]), 0.0);
        let full = vec![i16::MAX; 64];
        assert!((mean_abs_level(&full) - 1.0).abs() < 1e-4);
        let half = vec![i16::MAX / 2; 64];
        assert!((mean_abs_level(&half) - 0.5).abs() < 1e-2);
    }
}
