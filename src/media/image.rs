//! Image generation and editing.
//!
//! Generation goes through the dedicated image model's `:predict` endpoint;
//! editing is an image-out `generateContent` call carrying the source image
//! inline.

use std::time::Duration;

use base64::Engine;
use serde::Deserialize;
use strum::{Display, EnumString};
use tracing::debug;

use crate::error::{CalliopeError, Result};
use crate::http::{keyed_url, shared_client, status_to_error};
use crate::util::retry::RetryPolicy;
use crate::util::timeout::with_timeout;
use crate::wire;

const DEFAULT_GENERATE_MODEL: &str = "imagen-3.0-generate-002";
const DEFAULT_EDIT_MODEL: &str = "gemini-2.5-flash-image";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Output aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum AspectRatio {
    #[strum(serialize = "1:1")]
    Square,
    #[strum(serialize = "16:9")]
    Wide,
    #[strum(serialize = "9:16")]
    Tall,
    #[strum(serialize = "4:3")]
    Landscape,
    #[strum(serialize = "3:4")]
    Portrait,
}

/// Request for image generation.
#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub prompt: String,
    pub count: u32,
    pub aspect_ratio: Option<AspectRatio>,
}

impl ImageRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            count: 1,
            aspect_ratio: None,
        }
    }
}

/// Request for editing an existing image with a text instruction.
#[derive(Debug, Clone)]
pub struct ImageEditRequest {
    pub prompt: String,
    pub image: Vec<u8>,
    pub mime_type: String,
}

/// A generated or edited image, decoded to raw bytes.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    /// Commentary text the editing model sometimes returns alongside.
    pub commentary: Option<String>,
}

/// Client for the image endpoints.
#[derive(Debug, Clone)]
pub struct ImageClient {
    api_key: String,
    base_url: String,
    generate_model: String,
    edit_model: String,
    timeout: Duration,
    retry_policy: RetryPolicy,
}

impl ImageClient {
    pub fn new(api_key: String) -> Self {
        Self::new_with_base_url(api_key, crate::config::DEFAULT_BASE_URL)
    }

    pub fn new_with_base_url(api_key: String, base_url: impl Into<String>) -> Self {
        Self {
            api_key,
            base_url: base_url.into(),
            generate_model: DEFAULT_GENERATE_MODEL.to_string(),
            edit_model: DEFAULT_EDIT_MODEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_generate_model(mut self, model: impl Into<String>) -> Self {
        self.generate_model = model.into();
        self
    }

    pub fn with_edit_model(mut self, model: impl Into<String>) -> Self {
        self.edit_model = model.into();
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

    /// Generate `request.count` images from a prompt.
    pub async fn generate(&self, request: &ImageRequest) -> Result<Vec<GeneratedImage>> {
        if request.prompt.trim().is_empty() {
            return Err(CalliopeError::InvalidArgument(
                "Image prompt cannot be empty".to_string(),
            ));
        }
        if request.count == 0 || request.count > 4 {
            return Err(CalliopeError::InvalidArgument(
                "Image count must be between 1 and 4".to_string(),
            ));
        }
        self.retry_policy
            .execute(|| self.generate_once(request))
            .await
    }

    async fn generate_once(&self, request: &ImageRequest) -> Result<Vec<GeneratedImage>> {
        let mut parameters = serde_json::json!({ "sampleCount": request.count });
        if let Some(ratio) = request.aspect_ratio {
            parameters["aspectRatio"] = serde_json::json!(ratio.to_string());
        }
        let body = serde_json::json!({
            "instances": [{"prompt": request.prompt}],
            "parameters": parameters,
        });
        let url = keyed_url(
            &self.base_url,
            &format!("models/{}:predict", self.generate_model),
            &self.api_key,
        );

        debug!(model = %self.generate_model, count = request.count, "image generate");

        with_timeout(self.timeout, async {
            let response = shared_client().post(&url).json(&body).send().await?;
            let status = response.status().as_u16();
            if status != 200 {
                let body_text = response.text().await.unwrap_or_default();
                return Err(status_to_error(status, &body_text));
            }

            let data: PredictResponse = response.json().await?;
            if data.predictions.is_empty() {
                return Err(CalliopeError::InvalidState(
                    "Image response contained no predictions".to_string(),
                ));
            }

            data.predictions
                .into_iter()
                .map(|p| {
                    let bytes = base64::engine::general_purpose::STANDARD
                        .decode(&p.bytes_base64_encoded)
                        .map_err(|e| {
                            CalliopeError::InvalidState(format!("Undecodable image payload: {e}"))
                        })?;
                    Ok(GeneratedImage {
                        bytes,
                        mime_type: p.mime_type.unwrap_or_else(|| "image/png".to_string()),
                        commentary: None,
                    })
                })
                .collect()
        })
        .await
    }

    /// Edit an image according to a text instruction.
    pub async fn edit(&self, request: &ImageEditRequest) -> Result<GeneratedImage> {
        if request.prompt.trim().is_empty() {
            return Err(CalliopeError::InvalidArgument(
                "Edit instruction cannot be empty".to_string(),
            ));
        }
        if request.image.is_empty() {
            return Err(CalliopeError::InvalidArgument(
                "Edit source image cannot be empty".to_string(),
            ));
        }
        self.retry_policy.execute(|| self.edit_once(request)).await
    }

    async fn edit_once(&self, request: &ImageEditRequest) -> Result<GeneratedImage> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&request.image);
        let body = wire::GenerateContentRequest {
            contents: vec![wire::WireContent {
                role: Some("user".to_string()),
                parts: vec![
                    wire::WirePart::inline(request.mime_type.clone(), encoded),
                    wire::WirePart::text(request.prompt.clone()),
                ],
            }],
            generation_config: Some(wire::WireGenerationConfig {
                response_modalities: Some(vec!["TEXT".to_string(), "IMAGE".to_string()]),
                ..wire::WireGenerationConfig::default()
            }),
            ..wire::GenerateContentRequest::default()
        };
        let url = keyed_url(
            &self.base_url,
            &format!("models/{}:generateContent", self.edit_model),
            &self.api_key,
        );

        debug!(model = %self.edit_model, "image edit");

        with_timeout(self.timeout, async {
            let response = shared_client().post(&url).json(&body).send().await?;
            let status = response.status().as_u16();
            if status != 200 {
                let body_text = response.text().await.unwrap_or_default();
                return Err(status_to_error(status, &body_text));
            }

            let data: wire::GenerateContentResponse = response.json().await?;
            let candidate = wire::first_candidate(data)?;
            let commentary = {
                let text = wire::candidate_text(&candidate);
                (!text.trim().is_empty()).then_some(text)
            };

            let blob = wire::candidate_blobs(&candidate)
                .into_iter()
                .next()
                .ok_or_else(|| {
                    CalliopeError::InvalidState(
                        "Edit response contained no image".to_string(),
                    )
                })?;

            let bytes = base64::engine::general_purpose::STANDARD
                .decode(&blob.data)
                .map_err(|e| {
                    CalliopeError::InvalidState(format!("Undecodable edited image: {e}"))
                })?;

            Ok(GeneratedImage {
                bytes,
                mime_type: blob.mime_type.clone(),
                commentary,
            })
        })
        .await
    }
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    bytes_base64_encoded: String,
    mime_type: Option<String>,
}
