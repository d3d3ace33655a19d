use std::time::Duration;

use base64::Engine;
use calliope::error::CalliopeError;
use calliope::media::{
    AspectRatio, ImageClient, ImageEditRequest, ImageRequest, VideoClient, VideoRequest,
};
use calliope::util::retry::RetryPolicy;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn no_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 1,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(1),
        multiplier: 1.0,
    }
}

fn b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[tokio::test]
async fn image_generation_decodes_predictions() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/imagen-3.0-generate-002:predict"))
        .and(query_param("key", "test-key"))
        .and(body_string_contains("\"sampleCount\":2"))
        .and(body_string_contains("\"aspectRatio\":\"16:9\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "predictions": [
                {"bytesBase64Encoded": b64(b"first-png"), "mimeType": "image/png"},
                {"bytesBase64Encoded": b64(b"second-png"), "mimeType": "image/png"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ImageClient::new_with_base_url("test-key".to_string(), server.uri())
        .with_retry_policy(no_retry());
    let images = client
        .generate(&ImageRequest {
            prompt: "a lighthouse at dusk".to_string(),
            count: 2,
            aspect_ratio: Some(AspectRatio::Wide),
        })
        .await
        .expect("generation should succeed");

    assert_eq!(images.len(), 2);
    assert_eq!(images[0].bytes, b"first-png");
    assert_eq!(images[1].bytes, b"second-png");
    assert_eq!(images[0].mime_type, "image/png");
}

#[tokio::test]
async fn empty_predictions_are_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/imagen-3.0-generate-002:predict"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"predictions": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = ImageClient::new_with_base_url("test-key".to_string(), server.uri())
        .with_retry_policy(no_retry());
    let err = client
        .generate(&ImageRequest::new("anything"))
        .await
        .expect_err("empty predictions should fail");
    assert!(matches!(err, CalliopeError::InvalidState(_)));
}

#[tokio::test]
async fn image_count_is_validated_locally() {
    let server = MockServer::start().await;
    let client = ImageClient::new_with_base_url("test-key".to_string(), server.uri());

    let mut request = ImageRequest::new("too many");
    request.count = 9;
    let err = client.generate(&request).await.expect_err("count > 4");
    assert!(matches!(err, CalliopeError::InvalidArgument(_)));
}

#[tokio::test]
async fn image_edit_returns_edited_blob_and_commentary() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/gemini-2.5-flash-image:generateContent"))
        .and(body_string_contains("\"inlineData\""))
        .and(body_string_contains("\"IMAGE\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"text": "Added a red scarf."},
                    {"inlineData": {"mimeType": "image/png", "data": b64(b"edited-png")}}
                ]},
                "finishReason": "STOP"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ImageClient::new_with_base_url("test-key".to_string(), server.uri())
        .with_retry_policy(no_retry());
    let edited = client
        .edit(&ImageEditRequest {
            prompt: "add a red scarf".to_string(),
            image: b"source-png".to_vec(),
            mime_type: "image/png".to_string(),
        })
        .await
        .expect("edit should succeed");

    assert_eq!(edited.bytes, b"edited-png");
    assert_eq!(edited.commentary.as_deref(), Some("Added a red scarf."));
}

#[tokio::test]
async fn video_job_polls_until_done() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/veo-2.0-generate-001:predictLongRunning"))
        .and(body_string_contains("\"prompt\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "models/veo-2.0-generate-001/operations/op-123"
        })))
        .expect(1)
        .mount(&server)
        .await;

    // Two pending polls, then done.
    Mock::given(method("GET"))
        .and(path("/models/veo-2.0-generate-001/operations/op-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"done": false})))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/models/veo-2.0-generate-001/operations/op-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "done": true,
            "response": {
                "generateVideoResponse": {
                    "generatedSamples": [
                        {"video": {"uri": format!("{}/files/render.mp4", server.uri())}}
                    ]
                }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = VideoClient::new_with_base_url("test-key".to_string(), server.uri())
        .with_poll_interval(Duration::from_millis(5))
        .with_retry_policy(no_retry());
    let asset = client
        .generate(&VideoRequest::from_prompt("waves on a shore"))
        .await
        .expect("job should complete");
    assert!(asset.uri.ends_with("/files/render.mp4"));
}

#[tokio::test]
async fn failed_video_job_surfaces_the_remote_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/veo-2.0-generate-001:predictLongRunning"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "models/veo-2.0-generate-001/operations/op-bad"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/models/veo-2.0-generate-001/operations/op-bad"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "done": true,
            "error": {"message": "safety filters rejected the prompt"}
        })))
        .mount(&server)
        .await;

    let client = VideoClient::new_with_base_url("test-key".to_string(), server.uri())
        .with_poll_interval(Duration::from_millis(5))
        .with_retry_policy(no_retry());
    let err = client
        .generate(&VideoRequest::from_prompt("something"))
        .await
        .expect_err("job failure should propagate");
    assert!(matches!(err, CalliopeError::JobFailed(msg) if msg.contains("safety filters")));
}

#[tokio::test]
async fn poll_deadline_turns_into_timeout() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/veo-2.0-generate-001:predictLongRunning"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "models/veo-2.0-generate-001/operations/op-slow"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/models/veo-2.0-generate-001/operations/op-slow"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"done": false})))
        .mount(&server)
        .await;

    let client = VideoClient::new_with_base_url("test-key".to_string(), server.uri())
        .with_poll_interval(Duration::from_millis(5))
        .with_poll_deadline(Duration::from_millis(30))
        .with_retry_policy(no_retry());
    let err = client
        .generate(&VideoRequest::from_prompt("forever"))
        .await
        .expect_err("deadline should fire");
    assert!(matches!(err, CalliopeError::Timeout(_)));
}

#[tokio::test]
async fn download_appends_the_key_to_the_asset_uri() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/files/render.mp4"))
        .and(query_param("key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mp4-bytes".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let client = VideoClient::new_with_base_url("test-key".to_string(), server.uri());
    let asset = calliope::media::VideoAsset {
        uri: format!("{}/files/render.mp4", server.uri()),
    };
    let bytes = client.download(&asset).await.expect("download");
    assert_eq!(bytes, b"mp4-bytes");
}

#[tokio::test]
async fn video_request_needs_prompt_or_image() {
    let server = MockServer::start().await;
    let client = VideoClient::new_with_base_url("test-key".to_string(), server.uri());
    let err = client
        .submit(&VideoRequest::default())
        .await
        .expect_err("empty request should fail");
    assert!(matches!(err, CalliopeError::InvalidArgument(_)));
}
