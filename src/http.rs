//! Shared HTTP client and wire-level helpers.

use std::sync::OnceLock;

use crate::error::CalliopeError;

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Get (or create) the shared reqwest client.
pub fn shared_client() -> &'static reqwest::Client {
    SHARED_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .pool_max_idle_per_host(10)
            .build()
            .expect("Failed to build HTTP client")
    })
}

/// Build an endpoint URL with the API key in the query string, which is how
/// this service authenticates REST calls.
pub fn keyed_url(base_url: &str, path: &str, api_key: &str) -> String {
    format!("{}/{}?key={}", trim_trailing_slash(base_url), path, api_key)
}

/// Same as [`keyed_url`] but appending to an existing query string.
pub fn keyed_url_with_query(base_url: &str, path_and_query: &str, api_key: &str) -> String {
    format!(
        "{}/{}&key={}",
        trim_trailing_slash(base_url),
        path_and_query,
        api_key
    )
}

pub fn trim_trailing_slash(url: &str) -> &str {
    url.trim_end_matches('/')
}

/// Parse an SSE "data:" line. This endpoint never sends a terminator
/// sentinel; the stream just ends.
pub fn parse_sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data: ")
}

/// Map a non-200 response to an error, mining the standard
/// `{"error": {"message": ...}}` body shape when present.
pub fn status_to_error(status: u16, body: &str) -> CalliopeError {
    let message = extract_error_message(body).unwrap_or_else(|| body.to_string());
    match status {
        401 | 403 => CalliopeError::Authentication(message),
        429 => CalliopeError::RateLimited {
            retry_after_ms: extract_retry_after_ms(body),
        },
        _ => CalliopeError::api(status, message),
    }
}

fn extract_error_message(body: &str) -> Option<String> {
    let parsed: serde_json::Value = serde_json::from_str(body).ok()?;
    parsed
        .get("error")?
        .get("message")?
        .as_str()
        .map(ToString::to_string)
}

fn extract_retry_after_ms(body: &str) -> Option<u64> {
    // RetryInfo detail, e.g. {"retryDelay": "7s"}
    let parsed: serde_json::Value = serde_json::from_str(body).ok()?;
    let details = parsed.get("error")?.get("details")?.as_array()?;
    details.iter().find_map(|d| {
        let delay = d.get("retryDelay")?.as_str()?;
        let seconds: f64 = delay.trim_end_matches('s').parse().ok()?;
        Some((seconds * 1000.0) as u64)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyed_url_joins_and_strips_slashes() {
        assert_eq!(
            keyed_url("http://host/v1beta/", "models/m:generateContent", "k"),
            "http://host/v1beta/models/m:generateContent?key=k"
        );
        assert_eq!(
            keyed_url_with_query("http://host/v1beta", "models/m:streamGenerateContent?alt=sse", "k"),
            "http://host/v1beta/models/m:streamGenerateContent?alt=sse&key=k"
        );
    }

    #[test]
    fn status_mapping_mines_error_body() {
        let body = r#"{"error": {"code": 403, "message": "key not valid", "status": "PERMISSION_DENIED"}}"#;
        match status_to_error(403, body) {
            CalliopeError::Authentication(msg) => assert_eq!(msg, "key not valid"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn retry_delay_detail_is_parsed() {
        let body = r#"{"error": {"code": 429, "message": "quota", "details": [{"retryDelay": "12s"}]}}"#;
        match status_to_error(429, body) {
            CalliopeError::RateLimited { retry_after_ms } => {
                assert_eq!(retry_after_ms, Some(12_000))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn sse_lines_without_data_prefix_are_skipped() {
        assert_eq!(parse_sse_data("data: {\"x\":1}"), Some("{\"x\":1}"));
        assert_eq!(parse_sse_data(": keepalive"), None);
        assert_eq!(parse_sse_data(""), None);
    }
}
