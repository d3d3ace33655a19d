//! Realtime session configuration.

use std::time::Duration;

/// Sample rate the service accepts for input audio.
pub const INPUT_SAMPLE_RATE_HZ: u32 = 16_000;

/// Sample rate the service streams output audio at.
pub const OUTPUT_SAMPLE_RATE_HZ: u32 = 24_000;

/// Configuration for one realtime voice session, sent once at setup.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    pub model: String,
    /// Credential; falls back to the global config when unset.
    pub api_key: Option<String>,
    /// WebSocket endpoint (overridable for tests).
    pub endpoint: String,
    /// Prebuilt voice for the spoken responses.
    pub voice: Option<String>,
    /// Behavioral instruction text.
    pub instructions: Option<String>,
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    /// Bound on connection open + setup acknowledgment.
    pub connect_timeout: Duration,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            model: "models/gemini-2.0-flash-exp".to_string(),
            api_key: None,
            endpoint: crate::config::DEFAULT_LIVE_ENDPOINT.to_string(),
            voice: None,
            instructions: None,
            input_sample_rate: INPUT_SAMPLE_RATE_HZ,
            output_sample_rate: OUTPUT_SAMPLE_RATE_HZ,
            connect_timeout: Duration::from_secs(10),
        }
    }
}
