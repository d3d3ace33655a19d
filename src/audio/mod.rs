//! Speech synthesis and transcription.

pub mod transcription;
pub mod tts;
pub mod types;

pub use transcription::{GeminiTranscriber, Transcriber};
pub use tts::{GeminiSpeech, SpeechSynthesizer};
pub use types::*;
