//! REST wire format shared by the request/response endpoints.
//!
//! Chat, speech synthesis, transcription, image editing, and uploaded-media
//! analysis all speak `generateContent`; the structs here are the one
//! serde image of that format. Field names follow the service's camelCase.

use serde::{Deserialize, Serialize};

use crate::error::{CalliopeError, Result};
use crate::types::{
    ContentPart, FinishReason, GenerationSettings, GroundingMetadata, GroundingSource,
    ModelMessage, Role, ToolChoice, Usage,
};

// Request side

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<WireGenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<WireToolConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WireContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<WirePart>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WirePart {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<WireBlob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_data: Option<WireFileData>,
}

impl WirePart {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn inline(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            inline_data: Some(WireBlob {
                mime_type: mime_type.into(),
                data: data.into(),
            }),
            ..Self::default()
        }
    }

    pub fn file(uri: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            file_data: Some(WireFileData {
                file_uri: uri.into(),
                mime_type: mime_type.into(),
            }),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireBlob {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireFileData {
    pub file_uri: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WireGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_modalities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_config: Option<WireThinkingConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<WireSpeechConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireThinkingConfig {
    pub thinking_budget: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireSpeechConfig {
    pub voice_config: WireVoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireVoiceConfig {
    pub prebuilt_voice_config: WirePrebuiltVoice,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePrebuiltVoice {
    pub voice_name: String,
}

impl WireSpeechConfig {
    pub fn prebuilt(voice_name: impl Into<String>) -> Self {
        Self {
            voice_config: WireVoiceConfig {
                prebuilt_voice_config: WirePrebuiltVoice {
                    voice_name: voice_name.into(),
                },
            },
        }
    }
}

/// Server-side tool declaration, e.g. `{"googleSearch": {}}`.
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WireTool {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_search: Option<EmptyObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_maps: Option<EmptyObject>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct EmptyObject {}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireToolConfig {
    pub retrieval_config: WireRetrievalConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRetrievalConfig {
    pub lat_lng: WireLatLng,
}

#[derive(Debug, Clone, Serialize)]
pub struct WireLatLng {
    pub latitude: f64,
    pub longitude: f64,
}

// Response side

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<WireCandidate>,
    pub usage_metadata: Option<WireUsageMetadata>,
    pub prompt_feedback: Option<WirePromptFeedback>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireCandidate {
    pub content: Option<WireContent>,
    pub finish_reason: Option<String>,
    pub grounding_metadata: Option<WireGroundingMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireUsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub candidates_token_count: u32,
    #[serde(default)]
    pub thoughts_token_count: u32,
    #[serde(default)]
    pub total_token_count: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePromptFeedback {
    pub block_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireGroundingMetadata {
    #[serde(default)]
    pub web_search_queries: Vec<String>,
    #[serde(default)]
    pub grounding_chunks: Vec<WireGroundingChunk>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireGroundingChunk {
    pub web: Option<WireGroundingSource>,
    pub maps: Option<WireGroundingSource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireGroundingSource {
    pub uri: Option<String>,
    pub title: Option<String>,
}

// Conversions

/// Render conversation messages into wire contents.
pub fn contents_from_messages(messages: &[ModelMessage]) -> Vec<WireContent> {
    messages.iter().map(content_from_message).collect()
}

fn content_from_message(message: &ModelMessage) -> WireContent {
    let role = match message.role {
        Role::User => "user",
        Role::Model => "model",
    };
    WireContent {
        role: Some(role.to_string()),
        parts: message.content.iter().map(part_from_content).collect(),
    }
}

fn part_from_content(part: &ContentPart) -> WirePart {
    match part {
        ContentPart::Text { text } => WirePart::text(text.clone()),
        ContentPart::InlineData { mime_type, data } => {
            WirePart::inline(mime_type.clone(), data.clone())
        }
        ContentPart::FileRef { uri, mime_type } => WirePart::file(uri.clone(), mime_type.clone()),
    }
}

/// A bare system-instruction content (no role).
pub fn system_instruction(text: impl Into<String>) -> WireContent {
    WireContent {
        role: None,
        parts: vec![WirePart::text(text)],
    }
}

/// Map generation settings onto the wire config.
pub fn generation_config_from(settings: &GenerationSettings) -> WireGenerationConfig {
    WireGenerationConfig {
        temperature: settings.temperature,
        top_p: settings.top_p,
        top_k: settings.top_k,
        max_output_tokens: settings.max_output_tokens,
        stop_sequences: settings.stop_sequences.clone(),
        candidate_count: settings.candidate_count,
        response_modalities: settings
            .response_modalities
            .as_ref()
            .map(|ms| ms.iter().map(|m| m.to_string()).collect()),
        thinking_config: settings
            .thinking_budget
            .map(|thinking_budget| WireThinkingConfig { thinking_budget }),
        speech_config: None,
    }
}

/// Map tool choices onto declarations plus the optional retrieval config
/// carrying a grounding coordinate.
pub fn tools_from(choices: &[ToolChoice]) -> (Option<Vec<WireTool>>, Option<WireToolConfig>) {
    if choices.is_empty() {
        return (None, None);
    }

    let mut tools = Vec::new();
    let mut tool_config = None;
    for choice in choices {
        match choice {
            ToolChoice::WebSearch => tools.push(WireTool {
                google_search: Some(EmptyObject {}),
                ..WireTool::default()
            }),
            ToolChoice::MapsGrounding {
                latitude,
                longitude,
            } => {
                tools.push(WireTool {
                    google_maps: Some(EmptyObject {}),
                    ..WireTool::default()
                });
                if let (Some(latitude), Some(longitude)) = (latitude, longitude) {
                    tool_config = Some(WireToolConfig {
                        retrieval_config: WireRetrievalConfig {
                            lat_lng: WireLatLng {
                                latitude: *latitude,
                                longitude: *longitude,
                            },
                        },
                    });
                }
            }
        }
    }
    (Some(tools), tool_config)
}

/// Take the first candidate, surfacing blocked prompts and empty responses
/// as errors rather than empty strings.
pub fn first_candidate(response: GenerateContentResponse) -> Result<WireCandidate> {
    if let Some(feedback) = &response.prompt_feedback {
        if let Some(reason) = &feedback.block_reason {
            return Err(CalliopeError::InvalidState(format!(
                "Prompt was blocked: {reason}"
            )));
        }
    }
    response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| CalliopeError::InvalidState("Response contained no candidates".to_string()))
}

/// Concatenate the text parts of a candidate.
pub fn candidate_text(candidate: &WireCandidate) -> String {
    let Some(content) = &candidate.content else {
        return String::new();
    };
    content
        .parts
        .iter()
        .filter_map(|p| p.text.as_deref())
        .collect::<Vec<_>>()
        .join("")
}

/// Pull the inline media blobs out of a candidate.
pub fn candidate_blobs(candidate: &WireCandidate) -> Vec<&WireBlob> {
    let Some(content) = &candidate.content else {
        return Vec::new();
    };
    content
        .parts
        .iter()
        .filter_map(|p| p.inline_data.as_ref())
        .collect()
}

pub fn finish_reason_from(candidate: &WireCandidate) -> Option<FinishReason> {
    candidate
        .finish_reason
        .as_deref()
        .map(FinishReason::from_wire)
}

pub fn usage_from(metadata: Option<WireUsageMetadata>) -> Usage {
    metadata
        .map(|u| Usage {
            prompt_tokens: u.prompt_token_count,
            response_tokens: u.candidates_token_count,
            thought_tokens: u.thoughts_token_count,
            total_tokens: u.total_token_count,
        })
        .unwrap_or_default()
}

pub fn grounding_from(metadata: Option<WireGroundingMetadata>) -> Option<GroundingMetadata> {
    let metadata = metadata?;
    let sources = metadata
        .grounding_chunks
        .into_iter()
        .filter_map(|chunk| chunk.web.or(chunk.maps))
        .filter_map(|source| {
            source.uri.map(|uri| GroundingSource {
                uri,
                title: source.title,
            })
        })
        .collect();
    let grounding = GroundingMetadata {
        web_search_queries: metadata.web_search_queries,
        sources,
    };
    (!grounding.is_empty()).then_some(grounding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_camel_case_and_skips_empty() {
        let request = GenerateContentRequest {
            contents: vec![WireContent {
                role: Some("user".into()),
                parts: vec![WirePart::text("hi")],
            }],
            system_instruction: Some(system_instruction("be brief")),
            generation_config: Some(generation_config_from(
                &GenerationSettings::builder()
                    .max_output_tokens(256)
                    .thinking_budget(1024)
                    .build(),
            )),
            tools: None,
            tool_config: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 256);
        assert_eq!(
            value["generationConfig"]["thinkingConfig"]["thinkingBudget"],
            1024
        );
        assert!(value.get("tools").is_none());
        assert!(value["generationConfig"].get("temperature").is_none());
    }

    #[test]
    fn tool_choices_become_declarations() {
        let (tools, tool_config) = tools_from(&[
            ToolChoice::WebSearch,
            ToolChoice::MapsGrounding {
                latitude: Some(37.42),
                longitude: Some(-122.08),
            },
        ]);
        let tools = serde_json::to_value(tools.unwrap()).unwrap();
        assert_eq!(tools[0], json!({"googleSearch": {}}));
        assert_eq!(tools[1], json!({"googleMaps": {}}));
        let config = serde_json::to_value(tool_config.unwrap()).unwrap();
        assert_eq!(config["retrievalConfig"]["latLng"]["latitude"], 37.42);
    }

    #[test]
    fn blocked_prompt_is_an_error_not_an_empty_string() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }))
        .unwrap();
        let err = first_candidate(response).unwrap_err();
        assert!(matches!(err, CalliopeError::InvalidState(msg) if msg.contains("SAFETY")));
    }

    #[test]
    fn grounding_collects_web_and_maps_chunks() {
        let metadata: WireGroundingMetadata = serde_json::from_value(json!({
            "webSearchQueries": ["coffee near me"],
            "groundingChunks": [
                {"web": {"uri": "https://example.com/a", "title": "A"}},
                {"maps": {"uri": "https://maps.example.com/b", "title": "B"}},
                {"web": {"title": "no uri, dropped"}}
            ]
        }))
        .unwrap();
        let grounding = grounding_from(Some(metadata)).unwrap();
        assert_eq!(grounding.web_search_queries, vec!["coffee near me"]);
        assert_eq!(grounding.sources.len(), 2);
        assert_eq!(grounding.sources[1].title.as_deref(), Some("B"));
    }
}
