//! Speech synthesis.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use tracing::debug;

use crate::error::{CalliopeError, Result};
use crate::http::{keyed_url, shared_client, status_to_error};
use crate::util::retry::RetryPolicy;
use crate::util::timeout::with_timeout;
use crate::wire;

use super::types::{sample_rate_from_mime, SpeechRequest, SynthesizedAudio};

const DEFAULT_TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const FALLBACK_SAMPLE_RATE: u32 = 24_000;

/// Trait for text-to-speech backends.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Render text to audio.
    async fn synthesize(&self, request: &SpeechRequest) -> Result<SynthesizedAudio>;
}

/// Speech synthesis through the hosted TTS model.
#[derive(Debug, Clone)]
pub struct GeminiSpeech {
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
    retry_policy: RetryPolicy,
}

impl GeminiSpeech {
    pub fn new(api_key: String) -> Self {
        Self::new_with_base_url(api_key, crate::config::DEFAULT_BASE_URL)
    }

    pub fn new_with_base_url(api_key: String, base_url: impl Into<String>) -> Self {
        Self {
            api_key,
            base_url: base_url.into(),
            model: DEFAULT_TTS_MODEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    fn validate(&self, request: &SpeechRequest) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(CalliopeError::Authentication(
                "Missing API key for speech synthesis".to_string(),
            ));
        }
        if request.text.trim().is_empty() {
            return Err(CalliopeError::InvalidArgument(
                "Speech text cannot be empty".to_string(),
            ));
        }
        if request.voice.name.trim().is_empty() {
            return Err(CalliopeError::InvalidArgument(
                "Voice name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    async fn synthesize_once(&self, request: &SpeechRequest) -> Result<SynthesizedAudio> {
        let body = wire::GenerateContentRequest {
            contents: vec![wire::WireContent {
                role: Some("user".to_string()),
                parts: vec![wire::WirePart::text(request.text.clone())],
            }],
            generation_config: Some(wire::WireGenerationConfig {
                response_modalities: Some(vec!["AUDIO".to_string()]),
                speech_config: Some(wire::WireSpeechConfig::prebuilt(&request.voice.name)),
                ..wire::WireGenerationConfig::default()
            }),
            ..wire::GenerateContentRequest::default()
        };
        let url = keyed_url(
            &self.base_url,
            &format!("models/{}:generateContent", self.model),
            &self.api_key,
        );

        debug!(model = %self.model, voice = %request.voice.name, "speech synthesize");

        with_timeout(self.timeout, async {
            let response = shared_client().post(&url).json(&body).send().await?;
            let status = response.status().as_u16();
            if status != 200 {
                let body_text = response.text().await.unwrap_or_default();
                return Err(status_to_error(status, &body_text));
            }

            let data: wire::GenerateContentResponse = response.json().await?;
            let candidate = wire::first_candidate(data)?;
            let blob = wire::candidate_blobs(&candidate)
                .into_iter()
                .next()
                .ok_or_else(|| {
                    CalliopeError::InvalidState(
                        "Speech response contained no audio".to_string(),
                    )
                })?;

            let pcm = base64::engine::general_purpose::STANDARD
                .decode(&blob.data)
                .map_err(|e| {
                    CalliopeError::InvalidState(format!("Undecodable audio payload: {e}"))
                })?;
            if pcm.is_empty() {
                return Err(CalliopeError::InvalidState(
                    "Speech response contained empty audio".to_string(),
                ));
            }

            Ok(SynthesizedAudio {
                pcm,
                sample_rate: sample_rate_from_mime(&blob.mime_type, FALLBACK_SAMPLE_RATE),
                channels: 1,
            })
        })
        .await
    }
}

#[async_trait]
impl SpeechSynthesizer for GeminiSpeech {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<SynthesizedAudio> {
        self.validate(request)?;
        self.retry_policy
            .execute(|| self.synthesize_once(request))
            .await
    }
}

