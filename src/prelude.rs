//! Convenience re-exports for common use.

pub use crate::analysis::{AnalysisClient, FilesClient};
pub use crate::audio::{
    GeminiSpeech, GeminiTranscriber, SpeechRequest, SpeechSynthesizer, Transcriber, Voice,
};
pub use crate::chat::{ChatClient, ChatRequest, ChatResponse, ChatSession};
pub use crate::config::CalliopeConfig;
pub use crate::error::{CalliopeError, Result};
pub use crate::media::{ImageClient, ImageRequest, VideoClient, VideoRequest};
pub use crate::types::{
    ContentPart, FinishReason, GenerationSettings, GroundingMetadata, ModelMessage, Role,
    ToolChoice, Usage,
};

#[cfg(feature = "live")]
pub use crate::live::{LiveConfig, LiveEvent, LiveSession, SessionState};
