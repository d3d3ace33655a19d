//! Calliope — Rust client for a hosted multimodal generative-AI service.
//!
//! Five modes, one credential: tool-grounded text chat, a realtime
//! bidirectional voice session, image/video generation and editing, speech
//! synthesis and transcription, and uploaded-media analysis. All heavy
//! lifting happens remotely; this crate is the typed plumbing, plus the one
//! piece with real ordering obligations — the realtime session's playback
//! scheduling and interruption handling in [`live`].
//!
//! # Quick Start
//!
//! ```no_run
//! use calliope::chat::{ChatClient, ChatRequest};
//! use calliope::config::CalliopeConfig;
//!
//! # async fn example() -> calliope::error::Result<()> {
//! let api_key = CalliopeConfig::global().require_api_key()?;
//! let client = ChatClient::new(api_key);
//! let response = client.generate(&ChatRequest::from_prompt("Hello!")).await?;
//! println!("{}", response.text);
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod audio;
pub mod chat;
pub mod config;
pub mod error;
pub mod http;
pub mod media;
pub mod prelude;
pub mod types;
pub mod util;
pub mod wire;

#[cfg(feature = "live")]
pub mod live;

#[cfg(feature = "cli")]
pub mod cli;
