//! Text chat with optional server-side tool augmentation.
//!
//! Tools (web search, maps grounding) execute remotely; the client declares
//! them on the request and renders the returned citations. Extended
//! reasoning is a budget knob in [`GenerationSettings`], not a local loop.

use std::time::Duration;

use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::debug;

use crate::error::{CalliopeError, Result};
use crate::http::{keyed_url, keyed_url_with_query, parse_sse_data, shared_client, status_to_error};
use crate::types::{
    FinishReason, GenerationSettings, GroundingMetadata, ModelMessage, ToolChoice, Usage,
};
use crate::util::retry::RetryPolicy;
use crate::util::timeout::with_timeout;
use crate::wire;

const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// One chat turn's worth of input.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<ModelMessage>,
    pub system_instruction: Option<String>,
    pub settings: GenerationSettings,
    pub tools: Vec<ToolChoice>,
}

impl ChatRequest {
    /// Single-turn request from a user prompt.
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![ModelMessage::user(prompt)],
            ..Self::default()
        }
    }
}

/// A completed chat response.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub text: String,
    pub grounding: Option<GroundingMetadata>,
    pub usage: Usage,
    pub finish_reason: Option<FinishReason>,
}

/// One streamed increment of a chat response.
#[derive(Debug, Clone)]
pub struct ChatDelta {
    pub text: String,
    pub done: bool,
    pub grounding: Option<GroundingMetadata>,
    pub usage: Option<Usage>,
}

/// Client for the text-generation endpoint.
#[derive(Debug, Clone)]
pub struct ChatClient {
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
    retry_policy: RetryPolicy,
}

impl ChatClient {
    pub fn new(api_key: String) -> Self {
        Self::new_with_base_url(api_key, crate::config::DEFAULT_BASE_URL)
    }

    pub fn new_with_base_url(api_key: String, base_url: impl Into<String>) -> Self {
        Self {
            api_key,
            base_url: base_url.into(),
            model: DEFAULT_CHAT_MODEL.to_string(),
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

    fn validate(&self, request: &ChatRequest) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(CalliopeError::Authentication(
                "Missing API key for chat".to_string(),
            ));
        }
        if request.messages.is_empty() {
            return Err(CalliopeError::InvalidArgument(
                "Chat request needs at least one message".to_string(),
            ));
        }
        Ok(())
    }

    fn build_body(&self, request: &ChatRequest) -> wire::GenerateContentRequest {
        let (tools, tool_config) = wire::tools_from(&request.tools);
        wire::GenerateContentRequest {
            contents: wire::contents_from_messages(&request.messages),
            system_instruction: request
                .system_instruction
                .as_ref()
                .map(wire::system_instruction),
            generation_config: Some(wire::generation_config_from(&request.settings)),
            tools,
            tool_config,
        }
    }

    /// Generate a complete response.
    pub async fn generate(&self, request: &ChatRequest) -> Result<ChatResponse> {
        self.validate(request)?;
        self.retry_policy
            .execute(|| self.generate_once(request))
            .await
    }

    async fn generate_once(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let body = self.build_body(request);
        let url = keyed_url(
            &self.base_url,
            &format!("models/{}:generateContent", self.model),
            &self.api_key,
        );

        debug!(model = %self.model, "chat generate");

        with_timeout(self.timeout, async {
            let response = shared_client().post(&url).json(&body).send().await?;
            let status = response.status().as_u16();
            if status != 200 {
                let body_text = response.text().await.unwrap_or_default();
                return Err(status_to_error(status, &body_text));
            }

            let data: wire::GenerateContentResponse = response.json().await?;
            let usage = wire::usage_from(data.usage_metadata.clone());
            let candidate = wire::first_candidate(data)?;

            Ok(ChatResponse {
                text: wire::candidate_text(&candidate),
                grounding: wire::grounding_from(candidate.grounding_metadata.clone()),
                usage,
                finish_reason: wire::finish_reason_from(&candidate),
            })
        })
        .await
    }

    /// Stream a response as it is generated.
    pub async fn stream(
        &self,
        request: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<ChatDelta>>> {
        self.validate(request)?;
        let body = self.build_body(request);
        let url = keyed_url_with_query(
            &self.base_url,
            &format!("models/{}:streamGenerateContent?alt=sse", self.model),
            &self.api_key,
        );

        debug!(model = %self.model, "chat stream");

        let response = shared_client().post(&url).json(&body).send().await?;
        let status = response.status().as_u16();
        if status != 200 {
            let body_text = response.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body_text));
        }

        let byte_stream = response.bytes_stream();

        let stream = async_stream::stream! {
            let mut buffer = String::new();
            futures::pin_mut!(byte_stream);

            while let Some(chunk_result) = byte_stream.next().await {
                let chunk = match chunk_result {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(CalliopeError::Network(e));
                        break;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    let Some(data) = parse_sse_data(&line) else {
                        continue;
                    };
                    let Ok(parsed) = serde_json::from_str::<wire::GenerateContentResponse>(data)
                    else {
                        continue;
                    };

                    let usage = parsed.usage_metadata.clone();
                    if let Some(candidate) = parsed.candidates.into_iter().next() {
                        let done = candidate.finish_reason.is_some();
                        yield Ok(ChatDelta {
                            text: wire::candidate_text(&candidate),
                            done,
                            grounding: wire::grounding_from(candidate.grounding_metadata.clone()),
                            usage: done.then(|| wire::usage_from(usage)),
                        });
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

/// A chat conversation with owned history.
#[derive(Debug)]
pub struct ChatSession {
    client: ChatClient,
    system_instruction: Option<String>,
    settings: GenerationSettings,
    tools: Vec<ToolChoice>,
    history: Vec<ModelMessage>,
}

impl ChatSession {
    pub fn new(client: ChatClient) -> Self {
        Self {
            client,
            system_instruction: None,
            settings: GenerationSettings::default(),
            tools: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolChoice>) -> Self {
        self.tools = tools;
        self
    }

    pub fn history(&self) -> &[ModelMessage] {
        &self.history
    }

    /// Send a user turn and record both sides in the history.
    pub async fn send(&mut self, text: impl Into<String>) -> Result<ChatResponse> {
        self.history.push(ModelMessage::user(text));
        let request = ChatRequest {
            messages: self.history.clone(),
            system_instruction: self.system_instruction.clone(),
            settings: self.settings.clone(),
            tools: self.tools.clone(),
        };
        let response = self.client.generate(&request).await?;
        self.history.push(ModelMessage::model(&response.text));
        Ok(response)
    }
}
