//! Audio transcription.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use tracing::debug;

use crate::error::{CalliopeError, Result};
use crate::http::{keyed_url, shared_client, status_to_error};
use crate::util::retry::RetryPolicy;
use crate::util::timeout::with_timeout;
use crate::wire;

use super::types::TranscriptionResult;

const DEFAULT_TRANSCRIPTION_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

const SUPPORTED_MIME_TYPES: &[&str] = &[
    "audio/wav",
    "audio/x-wav",
    "audio/mpeg",
    "audio/mp3",
    "audio/aac",
    "audio/ogg",
    "audio/flac",
    "audio/aiff",
    "audio/pcm",
    "audio/webm",
];

/// Trait for transcription backends.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe audio data.
    async fn transcribe(
        &self,
        audio: &[u8],
        mime_type: &str,
        language: Option<&str>,
    ) -> Result<TranscriptionResult>;
}

/// Transcription through the hosted multimodal model: the audio travels
/// inline and the transcript comes back as plain text.
#[derive(Debug, Clone)]
pub struct GeminiTranscriber {
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
    retry_policy: RetryPolicy,
}

impl GeminiTranscriber {
    pub fn new(api_key: String) -> Self {
        Self::new_with_base_url(api_key, crate::config::DEFAULT_BASE_URL)
    }

    pub fn new_with_base_url(api_key: String, base_url: impl Into<String>) -> Self {
        Self {
            api_key,
            base_url: base_url.into(),
            model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
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

    fn validate(&self, audio: &[u8], mime_type: &str, language: Option<&str>) -> Result<String> {
        if self.api_key.trim().is_empty() {
            return Err(CalliopeError::Authentication(
                "Missing API key for transcription".to_string(),
            ));
        }
        if audio.is_empty() {
            return Err(CalliopeError::InvalidArgument(
                "Audio payload cannot be empty".to_string(),
            ));
        }

        let normalized = mime_type
            .split(';')
            .next()
            .map(str::trim)
            .map(str::to_ascii_lowercase)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| {
                CalliopeError::InvalidArgument("MIME type cannot be empty".to_string())
            })?;
        if !SUPPORTED_MIME_TYPES.contains(&normalized.as_str()) {
            return Err(CalliopeError::InvalidArgument(format!(
                "Unsupported transcription MIME type: {normalized}"
            )));
        }

        if let Some(lang) = language {
            if lang.trim().is_empty() {
                return Err(CalliopeError::InvalidArgument(
                    "Language hint cannot be empty".to_string(),
                ));
            }
        }

        Ok(normalized)
    }

    async fn transcribe_once(
        &self,
        audio: &[u8],
        mime_type: &str,
        language: Option<&str>,
    ) -> Result<TranscriptionResult> {
        let instruction = match language {
            Some(lang) => format!(
                "Transcribe this audio verbatim. The language is {lang}. \
                 Return only the transcript text."
            ),
            None => "Transcribe this audio verbatim. Return only the transcript text.".to_string(),
        };

        let body = wire::GenerateContentRequest {
            contents: vec![wire::WireContent {
                role: Some("user".to_string()),
                parts: vec![
                    wire::WirePart::inline(
                        mime_type,
                        base64::engine::general_purpose::STANDARD.encode(audio),
                    ),
                    wire::WirePart::text(instruction),
                ],
            }],
            ..wire::GenerateContentRequest::default()
        };
        let url = keyed_url(
            &self.base_url,
            &format!("models/{}:generateContent", self.model),
            &self.api_key,
        );

        debug!(model = %self.model, bytes = audio.len(), "transcribe");

        with_timeout(self.timeout, async {
            let response = shared_client().post(&url).json(&body).send().await?;
            let status = response.status().as_u16();
            if status != 200 {
                let body_text = response.text().await.unwrap_or_default();
                return Err(status_to_error(status, &body_text));
            }

            let data: wire::GenerateContentResponse = response.json().await?;
            let candidate = wire::first_candidate(data)?;
            let text = wire::candidate_text(&candidate);
            if text.trim().is_empty() {
                return Err(CalliopeError::InvalidState(
                    "Transcription response contained no text".to_string(),
                ));
            }

            Ok(TranscriptionResult {
                text,
                language: language.map(str::to_string),
            })
        })
        .await
    }
}

#[async_trait]
impl Transcriber for GeminiTranscriber {
    async fn transcribe(
        &self,
        audio: &[u8],
        mime_type: &str,
        language: Option<&str>,
    ) -> Result<TranscriptionResult> {
        let normalized = self.validate(audio, mime_type, language)?;
        self.retry_policy
            .execute(|| self.transcribe_once(audio, &normalized, language))
            .await
    }
}
