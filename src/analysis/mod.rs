//! Analysis of uploaded media (video and audio understanding).

pub mod files;

pub use files::{FileState, FilesClient, RemoteFile};

use std::time::Duration;

use base64::Engine;
use tracing::debug;

use crate::error::{CalliopeError, Result};
use crate::http::{keyed_url, shared_client, status_to_error};
use crate::util::retry::RetryPolicy;
use crate::util::timeout::with_timeout;
use crate::wire;

const DEFAULT_ANALYSIS_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

/// Client for asking questions about media content.
#[derive(Debug, Clone)]
pub struct AnalysisClient {
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
    retry_policy: RetryPolicy,
}

impl AnalysisClient {
    pub fn new(api_key: String) -> Self {
        Self::new_with_base_url(api_key, crate::config::DEFAULT_BASE_URL)
    }

    pub fn new_with_base_url(api_key: String, base_url: impl Into<String>) -> Self {
        Self {
            api_key,
            base_url: base_url.into(),
            model: DEFAULT_ANALYSIS_MODEL.to_string(),
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

    /// Ask about an uploaded file. The file must be `Active`.
    pub async fn describe(&self, file: &RemoteFile, prompt: &str) -> Result<String> {
        if prompt.trim().is_empty() {
            return Err(CalliopeError::InvalidArgument(
                "Analysis prompt cannot be empty".to_string(),
            ));
        }
        if file.state != FileState::Active {
            return Err(CalliopeError::InvalidState(format!(
                "File {} is not active yet",
                file.name
            )));
        }
        let parts = vec![
            wire::WirePart::file(file.uri.clone(), file.mime_type.clone()),
            wire::WirePart::text(prompt),
        ];
        self.retry_policy
            .execute(|| self.describe_once(parts.clone()))
            .await
    }

    /// Ask about media small enough to travel inline.
    pub async fn describe_bytes(
        &self,
        media: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<String> {
        if prompt.trim().is_empty() {
            return Err(CalliopeError::InvalidArgument(
                "Analysis prompt cannot be empty".to_string(),
            ));
        }
        if media.is_empty() {
            return Err(CalliopeError::InvalidArgument(
                "Media payload cannot be empty".to_string(),
            ));
        }
        let parts = vec![
            wire::WirePart::inline(
                mime_type,
                base64::engine::general_purpose::STANDARD.encode(media),
            ),
            wire::WirePart::text(prompt),
        ];
        self.retry_policy
            .execute(|| self.describe_once(parts.clone()))
            .await
    }

    async fn describe_once(&self, parts: Vec<wire::WirePart>) -> Result<String> {
        let body = wire::GenerateContentRequest {
            contents: vec![wire::WireContent {
                role: Some("user".to_string()),
                parts,
            }],
            ..wire::GenerateContentRequest::default()
        };
        let url = keyed_url(
            &self.base_url,
            &format!("models/{}:generateContent", self.model),
            &self.api_key,
        );

        debug!(model = %self.model, "media analysis");

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
                    "Analysis response contained no text".to_string(),
                ));
            }
            Ok(text)
        })
        .await
    }
}
