//! Generation settings, tool declarations, and response metadata.

use bon::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Settings controlling text generation.
#[derive(Debug, Clone, Builder, Serialize, Deserialize, Default)]
pub struct GenerationSettings {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<u32>,
    pub max_output_tokens: Option<u32>,
    pub stop_sequences: Option<Vec<String>>,
    pub candidate_count: Option<u32>,
    /// Extended-reasoning budget in tokens. `Some(0)` disables reasoning;
    /// `None` leaves the service default in place.
    pub thinking_budget: Option<u32>,
    pub response_modalities: Option<Vec<Modality>>,
}

/// Response modality requested from the model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum Modality {
    Text,
    Image,
    Audio,
}

/// A server-side tool attached to a request. These execute remotely; the
/// client only declares them and renders the returned grounding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ToolChoice {
    /// Ground answers in web search results.
    WebSearch,
    /// Ground answers in place data around an optional coordinate.
    MapsGrounding {
        latitude: Option<f64>,
        longitude: Option<f64>,
    },
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FinishReason {
    Stop,
    MaxTokens,
    Safety,
    Recitation,
    Other,
}

impl FinishReason {
    /// Map the wire-format string to a finish reason.
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "STOP" => Self::Stop,
            "MAX_TOKENS" => Self::MaxTokens,
            "SAFETY" => Self::Safety,
            "RECITATION" => Self::Recitation,
            _ => Self::Other,
        }
    }
}

/// Token accounting for a request.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub response_tokens: u32,
    pub thought_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn merge(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.response_tokens += other.response_tokens;
        self.thought_tokens += other.thought_tokens;
        self.total_tokens += other.total_tokens;
    }
}
