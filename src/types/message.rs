//! Message types for model communication.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelMessage {
    pub role: Role,
    pub content: Vec<ContentPart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ModelMessage {
    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentPart::Text { text: text.into() }],
            timestamp: Some(Utc::now()),
        }
    }

    /// Create a model (assistant) message.
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            content: vec![ContentPart::Text { text: text.into() }],
            timestamp: Some(Utc::now()),
        }
    }

    /// Create a user message carrying inline media alongside text.
    pub fn user_with_media(
        text: impl Into<String>,
        mime_type: impl Into<String>,
        base64_data: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::User,
            content: vec![
                ContentPart::Text { text: text.into() },
                ContentPart::InlineData {
                    mime_type: mime_type.into(),
                    data: base64_data.into(),
                },
            ],
            timestamp: Some(Utc::now()),
        }
    }

    /// Extract the text content, concatenating all text parts.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Conversation role. The wire format knows only `user` and `model`;
/// system text travels out-of-band as the system instruction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One part of a message's content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text.
    Text { text: String },
    /// Base64-encoded media carried inline.
    InlineData { mime_type: String, data: String },
    /// Reference to a previously uploaded file.
    FileRef { uri: String, mime_type: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_concatenates_only_text_parts() {
        let msg = ModelMessage {
            role: Role::User,
            content: vec![
                ContentPart::Text {
                    text: "look at ".into(),
                },
                ContentPart::InlineData {
                    mime_type: "image/png".into(),
                    data: "aGk=".into(),
                },
                ContentPart::Text {
                    text: "this".into(),
                },
            ],
            timestamp: None,
        };
        assert_eq!(msg.text(), "look at this");
    }
}
