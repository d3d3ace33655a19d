//! Error types for Calliope.

use thiserror::Error;

/// Primary error type for all Calliope operations.
#[derive(Error, Debug)]
pub enum CalliopeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Remote job failed: {0}")]
    JobFailed(String),

    #[error("Could not open realtime session: {0}")]
    ConnectionFailed(String),

    #[error("Realtime transport error: {0}")]
    Transport(String),

    #[error("Audio capture permission denied: {0}")]
    PermissionDenied(String),

    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),
}

/// Coarse classification used for retry decisions and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    RateLimit,
    Network,
    Timeout,
    Configuration,
    Serialization,
    Server,
    Api,
    Device,
    Realtime,
    Unknown,
}

impl CalliopeError {
    /// Create an API error from a status code and message body.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Authentication(_) => ErrorCategory::Authentication,
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::Network(_) => ErrorCategory::Network,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                429 => ErrorCategory::RateLimit,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Api,
            },
            Self::PermissionDenied(_) | Self::DeviceUnavailable(_) => ErrorCategory::Device,
            Self::ConnectionFailed(_) | Self::Transport(_) => ErrorCategory::Realtime,
            _ => ErrorCategory::Unknown,
        }
    }

    /// Whether this error is potentially retryable.
    ///
    /// Device and realtime failures are not: a denied microphone stays
    /// denied, and a dropped session must be reconnected explicitly.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::RateLimit
                | ErrorCategory::Network
                | ErrorCategory::Timeout
                | ErrorCategory::Server
        )
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, CalliopeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_status_drives_category() {
        assert_eq!(
            CalliopeError::api(401, "nope").category(),
            ErrorCategory::Authentication
        );
        assert_eq!(
            CalliopeError::api(429, "slow down").category(),
            ErrorCategory::RateLimit
        );
        assert_eq!(
            CalliopeError::api(503, "unavailable").category(),
            ErrorCategory::Server
        );
        assert_eq!(
            CalliopeError::api(404, "missing").category(),
            ErrorCategory::Api
        );
    }

    #[test]
    fn server_errors_are_retryable_device_errors_are_not() {
        assert!(CalliopeError::api(500, "boom").is_retryable());
        assert!(CalliopeError::Timeout(5_000).is_retryable());
        assert!(!CalliopeError::PermissionDenied("mic".into()).is_retryable());
        assert!(!CalliopeError::Transport("dropped".into()).is_retryable());
        assert!(!CalliopeError::Authentication("missing key".into()).is_retryable());
    }
}
