//! Video generation as a polled long-running job.
//!
//! Submission returns an operation handle; the service renders remotely and
//! the client polls at a fixed interval until the operation reports done.
//! The loop is unbounded by default; callers who want a client-side limit
//! opt in with [`VideoClient::with_poll_deadline`].

use std::time::Duration;

use base64::Engine;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{CalliopeError, Result};
use crate::http::{keyed_url, shared_client, status_to_error};
use crate::media::image::AspectRatio;
use crate::util::retry::RetryPolicy;
use crate::util::timeout::with_timeout;

const DEFAULT_VIDEO_MODEL: &str = "veo-2.0-generate-001";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Request for video generation: a prompt, a seed image, or both.
#[derive(Debug, Clone, Default)]
pub struct VideoRequest {
    pub prompt: Option<String>,
    pub image: Option<(Vec<u8>, String)>,
    pub aspect_ratio: Option<AspectRatio>,
}

impl VideoRequest {
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            ..Self::default()
        }
    }
}

/// Handle to a submitted generation job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoJob {
    /// Operation name, e.g. `models/…/operations/abc123`.
    pub name: String,
}

/// Current state of a job.
#[derive(Debug, Clone)]
pub enum JobState {
    Pending,
    Done(VideoAsset),
}

/// Reference to a rendered video asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoAsset {
    pub uri: String,
}

/// Client for the video-generation endpoints.
#[derive(Debug, Clone)]
pub struct VideoClient {
    api_key: String,
    base_url: String,
    model: String,
    poll_interval: Duration,
    poll_deadline: Option<Duration>,
    timeout: Duration,
    retry_policy: RetryPolicy,
}

impl VideoClient {
    pub fn new(api_key: String) -> Self {
        Self::new_with_base_url(api_key, crate::config::DEFAULT_BASE_URL)
    }

    pub fn new_with_base_url(api_key: String, base_url: impl Into<String>) -> Self {
        Self {
            api_key,
            base_url: base_url.into(),
            model: DEFAULT_VIDEO_MODEL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_deadline: None,
            timeout: DEFAULT_TIMEOUT,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Bound the poll loop. Without this the loop runs until the remote job
    /// terminates, which is the service's own contract.
    pub fn with_poll_deadline(mut self, deadline: Duration) -> Self {
        self.poll_deadline = Some(deadline);
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

    /// Submit a generation job.
    pub async fn submit(&self, request: &VideoRequest) -> Result<VideoJob> {
        if request.prompt.as_deref().unwrap_or("").trim().is_empty() && request.image.is_none() {
            return Err(CalliopeError::InvalidArgument(
                "Video request needs a prompt or a seed image".to_string(),
            ));
        }
        self.retry_policy
            .execute(|| self.submit_once(request))
            .await
    }

    async fn submit_once(&self, request: &VideoRequest) -> Result<VideoJob> {
        let mut instance = serde_json::Map::new();
        if let Some(prompt) = &request.prompt {
            instance.insert("prompt".to_string(), serde_json::json!(prompt));
        }
        if let Some((bytes, mime_type)) = &request.image {
            instance.insert(
                "image".to_string(),
                serde_json::json!({
                    "bytesBase64Encoded": base64::engine::general_purpose::STANDARD.encode(bytes),
                    "mimeType": mime_type,
                }),
            );
        }
        let mut parameters = serde_json::json!({ "numberOfVideos": 1 });
        if let Some(ratio) = request.aspect_ratio {
            parameters["aspectRatio"] = serde_json::json!(ratio.to_string());
        }
        let body = serde_json::json!({
            "instances": [instance],
            "parameters": parameters,
        });
        let url = keyed_url(
            &self.base_url,
            &format!("models/{}:predictLongRunning", self.model),
            &self.api_key,
        );

        debug!(model = %self.model, "video submit");

        with_timeout(self.timeout, async {
            let response = shared_client().post(&url).json(&body).send().await?;
            let status = response.status().as_u16();
            if status != 200 {
                let body_text = response.text().await.unwrap_or_default();
                return Err(status_to_error(status, &body_text));
            }
            let data: OperationRef = response.json().await?;
            Ok(VideoJob { name: data.name })
        })
        .await
    }

    /// Ask the service where a job stands.
    pub async fn status(&self, job: &VideoJob) -> Result<JobState> {
        let url = keyed_url(&self.base_url, &job.name, &self.api_key);

        with_timeout(self.timeout, async {
            let response = shared_client().get(&url).send().await?;
            let status = response.status().as_u16();
            if status != 200 {
                let body_text = response.text().await.unwrap_or_default();
                return Err(status_to_error(status, &body_text));
            }

            let data: Operation = response.json().await?;
            if !data.done {
                return Ok(JobState::Pending);
            }
            if let Some(error) = data.error {
                return Err(CalliopeError::JobFailed(error.message));
            }

            let uri = data
                .response
                .and_then(|r| r.generate_video_response)
                .and_then(|r| r.generated_samples.into_iter().next())
                .and_then(|s| s.video)
                .map(|v| v.uri)
                .ok_or_else(|| {
                    CalliopeError::InvalidState(
                        "Completed job carried no video asset".to_string(),
                    )
                })?;
            Ok(JobState::Done(VideoAsset { uri }))
        })
        .await
    }

    /// Poll a job at a fixed interval until it terminates.
    pub async fn wait(&self, job: &VideoJob) -> Result<VideoAsset> {
        let started = Instant::now();
        loop {
            match self.status(job).await? {
                JobState::Done(asset) => return Ok(asset),
                JobState::Pending => {
                    if let Some(deadline) = self.poll_deadline {
                        if started.elapsed() >= deadline {
                            return Err(CalliopeError::Timeout(deadline.as_millis() as u64));
                        }
                    }
                    info!(job = %job.name, "video job still rendering");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// Submit and wait in one call.
    pub async fn generate(&self, request: &VideoRequest) -> Result<VideoAsset> {
        let job = self.submit(request).await?;
        self.wait(&job).await
    }

    /// Fetch the rendered bytes. Asset URIs require the API key appended.
    pub async fn download(&self, asset: &VideoAsset) -> Result<Vec<u8>> {
        let separator = if asset.uri.contains('?') { '&' } else { '?' };
        let url = format!("{}{}key={}", asset.uri, separator, self.api_key);
        let response = shared_client().get(&url).send().await?;
        let status = response.status().as_u16();
        if status != 200 {
            let body_text = response.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body_text));
        }
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(CalliopeError::InvalidState(
                "Video download was empty".to_string(),
            ));
        }
        Ok(bytes.to_vec())
    }
}

#[derive(Debug, Deserialize)]
struct OperationRef {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Operation {
    #[serde(default)]
    done: bool,
    error: Option<OperationError>,
    response: Option<OperationResponse>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResponse {
    generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateVideoResponse {
    #[serde(default)]
    generated_samples: Vec<GeneratedSample>,
}

#[derive(Debug, Deserialize)]
struct GeneratedSample {
    video: Option<VideoRef>,
}

#[derive(Debug, Deserialize)]
struct VideoRef {
    uri: String,
}
