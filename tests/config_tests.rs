use calliope::config::{
    CalliopeConfig, DEFAULT_BASE_URL, DEFAULT_LIVE_ENDPOINT, DEFAULT_UPLOAD_BASE_URL,
};
use calliope::error::CalliopeError;
use pretty_assertions::assert_eq;

#[test]
fn missing_credential_is_a_fatal_authentication_error() {
    let config = CalliopeConfig::new();
    let err = config.require_api_key().expect_err("no key configured");
    match err {
        CalliopeError::Authentication(message) => {
            assert!(message.contains("GEMINI_API_KEY"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn explicit_key_wins_and_reports_credentials() {
    let config = CalliopeConfig::new();
    assert!(!config.has_credentials());
    config.set_api_key("k-explicit".to_string());
    assert!(config.has_credentials());
    assert_eq!(config.require_api_key().unwrap(), "k-explicit");
}

#[test]
fn endpoint_overrides_are_independent() {
    let config = CalliopeConfig::new();
    assert_eq!(config.base_url(), DEFAULT_BASE_URL);
    assert_eq!(config.upload_base_url(), DEFAULT_UPLOAD_BASE_URL);
    assert_eq!(config.live_endpoint(), DEFAULT_LIVE_ENDPOINT);

    config.set_base_url("http://localhost:4000/v1beta".to_string());
    config.set_live_endpoint("ws://localhost:4001/live".to_string());

    assert_eq!(config.base_url(), "http://localhost:4000/v1beta");
    assert_eq!(config.live_endpoint(), "ws://localhost:4001/live");
    assert_eq!(config.upload_base_url(), DEFAULT_UPLOAD_BASE_URL);
}

#[test]
fn cloned_configs_share_overrides() {
    let config = CalliopeConfig::new();
    let clone = config.clone();
    config.set_api_key("shared".to_string());
    assert_eq!(clone.api_key().as_deref(), Some("shared"));
}
