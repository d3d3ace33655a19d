//! Configuration (env-layered, single credential).
//!
//! The service authenticates every call with one API key. Its absence is
//! fatal: nothing in the crate works without it, so `require_api_key` is the
//! first thing every client constructor goes through.

use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

use crate::error::{CalliopeError, Result};

/// REST endpoint root.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Media upload endpoint root (resumable upload protocol).
pub const DEFAULT_UPLOAD_BASE_URL: &str = "https://generativelanguage.googleapis.com/upload/v1beta";

/// Bidirectional realtime endpoint.
pub const DEFAULT_LIVE_ENDPOINT: &str =
    "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Global default config (lazy-initialized from env).
static DEFAULT_CONFIG: OnceLock<CalliopeConfig> = OnceLock::new();

#[derive(Debug, Default)]
struct Overrides {
    api_key: Option<String>,
    base_url: Option<String>,
    upload_base_url: Option<String>,
    live_endpoint: Option<String>,
}

/// Layered configuration.
///
/// Resolution order: explicit setters > environment (`GEMINI_API_KEY`, with
/// `GOOGLE_API_KEY` accepted as an alias) > built-in endpoint defaults.
#[derive(Clone, Default)]
pub struct CalliopeConfig {
    inner: Arc<RwLock<Overrides>>,
}

impl fmt::Debug for CalliopeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read().expect("config lock poisoned");
        f.debug_struct("CalliopeConfig")
            .field("api_key", &inner.api_key.as_ref().map(|_| "<set>"))
            .field("base_url", &inner.base_url)
            .field("upload_base_url", &inner.upload_base_url)
            .field("live_endpoint", &inner.live_endpoint)
            .finish()
    }
}

impl CalliopeConfig {
    /// Create an empty config (no credential, default endpoints).
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from environment variables, reading `.env` if present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let config = Self::new();

        for var in ["GEMINI_API_KEY", "GOOGLE_API_KEY"] {
            if let Ok(key) = std::env::var(var) {
                if !key.trim().is_empty() {
                    config.set_api_key(key);
                    break;
                }
            }
        }

        if let Ok(url) = std::env::var("GEMINI_BASE_URL") {
            config.set_base_url(url);
        }
        if let Ok(url) = std::env::var("GEMINI_UPLOAD_BASE_URL") {
            config.set_upload_base_url(url);
        }
        if let Ok(url) = std::env::var("GEMINI_LIVE_ENDPOINT") {
            config.set_live_endpoint(url);
        }

        config
    }

    /// Get (or create) the global default config.
    pub fn global() -> &'static CalliopeConfig {
        DEFAULT_CONFIG.get_or_init(Self::from_env)
    }

    pub fn set_api_key(&self, key: String) {
        self.inner.write().expect("config lock poisoned").api_key = Some(key);
    }

    pub fn api_key(&self) -> Option<String> {
        self.inner
            .read()
            .expect("config lock poisoned")
            .api_key
            .clone()
    }

    /// Resolve the credential, failing with a user-facing error if absent.
    pub fn require_api_key(&self) -> Result<String> {
        self.api_key().ok_or_else(|| {
            CalliopeError::Authentication(
                "No API key configured. Set GEMINI_API_KEY (or GOOGLE_API_KEY) in the environment"
                    .to_string(),
            )
        })
    }

    pub fn has_credentials(&self) -> bool {
        self.api_key().is_some()
    }

    pub fn set_base_url(&self, url: String) {
        self.inner.write().expect("config lock poisoned").base_url = Some(url);
    }

    pub fn base_url(&self) -> String {
        self.inner
            .read()
            .expect("config lock poisoned")
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    pub fn set_upload_base_url(&self, url: String) {
        self.inner
            .write()
            .expect("config lock poisoned")
            .upload_base_url = Some(url);
    }

    pub fn upload_base_url(&self) -> String {
        self.inner
            .read()
            .expect("config lock poisoned")
            .upload_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_UPLOAD_BASE_URL.to_string())
    }

    pub fn set_live_endpoint(&self, url: String) {
        self.inner
            .write()
            .expect("config lock poisoned")
            .live_endpoint = Some(url);
    }

    pub fn live_endpoint(&self) -> String {
        self.inner
            .read()
            .expect("config lock poisoned")
            .live_endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_LIVE_ENDPOINT.to_string())
    }
}
