//! Media file upload and lifecycle.
//!
//! Uploads use the two-step resumable protocol: a start request yields an
//! upload URL, the payload goes there in one finalized chunk, and the
//! resulting file is polled until the service finishes processing it.

use std::time::Duration;

use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{CalliopeError, Result};
use crate::http::{keyed_url, shared_client, status_to_error};
use crate::util::timeout::with_timeout;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Remote processing state of an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Processing,
    Active,
    Failed,
    Other,
}

impl FileState {
    fn from_wire(raw: &str) -> Self {
        match raw {
            "PROCESSING" => Self::Processing,
            "ACTIVE" => Self::Active,
            "FAILED" => Self::Failed,
            _ => Self::Other,
        }
    }
}

/// An uploaded file as the service sees it.
#[derive(Debug, Clone)]
pub struct RemoteFile {
    pub name: String,
    pub uri: String,
    pub mime_type: String,
    pub state: FileState,
}

/// Client for the file-upload endpoints.
#[derive(Debug, Clone)]
pub struct FilesClient {
    api_key: String,
    base_url: String,
    upload_base_url: String,
    poll_interval: Duration,
    poll_deadline: Option<Duration>,
    timeout: Duration,
}

impl FilesClient {
    pub fn new(api_key: String) -> Self {
        Self::new_with_base_urls(
            api_key,
            crate::config::DEFAULT_BASE_URL,
            crate::config::DEFAULT_UPLOAD_BASE_URL,
        )
    }

    pub fn new_with_base_urls(
        api_key: String,
        base_url: impl Into<String>,
        upload_base_url: impl Into<String>,
    ) -> Self {
        Self {
            api_key,
            base_url: base_url.into(),
            upload_base_url: upload_base_url.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_deadline: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Bound the activation poll loop; unbounded without it.
    pub fn with_poll_deadline(mut self, deadline: Duration) -> Self {
        self.poll_deadline = Some(deadline);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Upload a media payload, returning the (possibly still processing)
    /// remote file.
    pub async fn upload(
        &self,
        data: Vec<u8>,
        mime_type: &str,
        display_name: &str,
    ) -> Result<RemoteFile> {
        if data.is_empty() {
            return Err(CalliopeError::InvalidArgument(
                "Upload payload cannot be empty".to_string(),
            ));
        }
        if self.api_key.trim().is_empty() {
            return Err(CalliopeError::Authentication(
                "Missing API key for file upload".to_string(),
            ));
        }

        let start_url = keyed_url(&self.upload_base_url, "files", &self.api_key);
        let metadata = serde_json::json!({"file": {"display_name": display_name}});

        debug!(bytes = data.len(), mime_type, "starting resumable upload");

        with_timeout(self.timeout, async {
            let start = shared_client()
                .post(&start_url)
                .header("X-Goog-Upload-Protocol", "resumable")
                .header("X-Goog-Upload-Command", "start")
                .header("X-Goog-Upload-Header-Content-Length", data.len())
                .header("X-Goog-Upload-Header-Content-Type", mime_type)
                .json(&metadata)
                .send()
                .await?;

            let status = start.status().as_u16();
            if status != 200 {
                let body_text = start.text().await.unwrap_or_default();
                return Err(status_to_error(status, &body_text));
            }

            let upload_url = start
                .headers()
                .get("x-goog-upload-url")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| {
                    CalliopeError::InvalidState(
                        "Upload start response missing upload URL".to_string(),
                    )
                })?;

            let upload = shared_client()
                .post(&upload_url)
                .header("X-Goog-Upload-Offset", 0)
                .header("X-Goog-Upload-Command", "upload, finalize")
                .body(data)
                .send()
                .await?;

            let status = upload.status().as_u16();
            if status != 200 {
                let body_text = upload.text().await.unwrap_or_default();
                return Err(status_to_error(status, &body_text));
            }

            let envelope: FileEnvelope = upload.json().await?;
            Ok(envelope.file.into_remote())
        })
        .await
    }

    /// Fetch the current state of a file by its resource name.
    pub async fn get(&self, name: &str) -> Result<RemoteFile> {
        let url = keyed_url(&self.base_url, name, &self.api_key);
        with_timeout(self.timeout, async {
            let response = shared_client().get(&url).send().await?;
            let status = response.status().as_u16();
            if status != 200 {
                let body_text = response.text().await.unwrap_or_default();
                return Err(status_to_error(status, &body_text));
            }
            let file: WireFile = response.json().await?;
            Ok(file.into_remote())
        })
        .await
    }

    /// Poll at a fixed interval until the file leaves `Processing`.
    pub async fn wait_active(&self, file: RemoteFile) -> Result<RemoteFile> {
        let started = Instant::now();
        let mut current = file;
        loop {
            match current.state {
                FileState::Active => return Ok(current),
                FileState::Failed => {
                    return Err(CalliopeError::JobFailed(format!(
                        "File {} failed remote processing",
                        current.name
                    )))
                }
                FileState::Processing | FileState::Other => {
                    if let Some(deadline) = self.poll_deadline {
                        if started.elapsed() >= deadline {
                            return Err(CalliopeError::Timeout(deadline.as_millis() as u64));
                        }
                    }
                    info!(file = %current.name, "file still processing");
                    tokio::time::sleep(self.poll_interval).await;
                    current = self.get(&current.name).await?;
                }
            }
        }
    }

    /// Upload and wait for activation in one call.
    pub async fn upload_and_wait(
        &self,
        data: Vec<u8>,
        mime_type: &str,
        display_name: &str,
    ) -> Result<RemoteFile> {
        let file = self.upload(data, mime_type, display_name).await?;
        self.wait_active(file).await
    }
}

#[derive(Debug, Deserialize)]
struct FileEnvelope {
    file: WireFile,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFile {
    name: String,
    uri: String,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

impl WireFile {
    fn into_remote(self) -> RemoteFile {
        RemoteFile {
            name: self.name,
            uri: self.uri,
            mime_type: self.mime_type.unwrap_or_else(|| "video/mp4".to_string()),
            state: self
                .state
                .as_deref()
                .map(FileState::from_wire)
                .unwrap_or(FileState::Other),
        }
    }
}
