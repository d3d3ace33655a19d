//! Audio-related types.

use serde::{Deserialize, Serialize};

/// Request for speech synthesis.
#[derive(Debug, Clone)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: Voice,
}

impl SpeechRequest {
    pub fn new(text: impl Into<String>, voice: Voice) -> Self {
        Self {
            text: text.into(),
            voice,
        }
    }
}

/// A prebuilt voice offered by the service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Voice {
    pub name: String,
}

impl Voice {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for Voice {
    fn default() -> Self {
        Self {
            name: "Kore".to_string(),
        }
    }
}

/// Synthesized audio with its sample format.
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    /// Raw little-endian PCM16 samples.
    pub pcm: Vec<u8>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl SynthesizedAudio {
    /// Reinterpret the byte payload as i16 samples.
    pub fn samples(&self) -> Vec<i16> {
        self.pcm
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect()
    }

    /// Playback length derived from the sample count.
    pub fn duration(&self) -> std::time::Duration {
        let frames = (self.pcm.len() / 2) as u64 / self.channels.max(1) as u64;
        std::time::Duration::from_secs_f64(frames as f64 / self.sample_rate.max(1) as f64)
    }
}

/// Result of audio transcription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub text: String,
    pub language: Option<String>,
}

/// Parse the rate parameter of a PCM MIME type, e.g. `audio/pcm;rate=24000`.
/// The parameter is authoritative when present.
pub fn sample_rate_from_mime(mime_type: &str, fallback: u32) -> u32 {
    mime_type
        .split(';')
        .filter_map(|param| param.trim().strip_prefix("rate="))
        .find_map(|rate| rate.parse().ok())
        .unwrap_or(fallback)
}
