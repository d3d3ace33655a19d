//! Grounding metadata attached to tool-augmented responses.

use serde::{Deserialize, Serialize};

/// Supplementary source citations returned when a server-side tool
/// (web search, maps) grounded the response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GroundingMetadata {
    /// Search queries the service issued on the model's behalf.
    pub web_search_queries: Vec<String>,
    /// Sources the response draws on.
    pub sources: Vec<GroundingSource>,
}

impl GroundingMetadata {
    pub fn is_empty(&self) -> bool {
        self.web_search_queries.is_empty() && self.sources.is_empty()
    }
}

/// One cited source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroundingSource {
    pub uri: String,
    pub title: Option<String>,
}
