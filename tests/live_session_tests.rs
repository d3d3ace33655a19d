#![cfg(feature = "live")]

mod live {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use base64::Engine;
    use calliope::error::{CalliopeError, Result};
    use calliope::live::{AudioSegment, CaptureSource, LiveConfig, LiveEvent, LiveSession, SessionState};
    use futures::{SinkExt, StreamExt};
    use serde_json::{json, Value};
    use tokio::net::TcpListener;
    use tokio::time::timeout;
    use tokio_tungstenite::{
        accept_hdr_async,
        tungstenite::{
            handshake::server::{Request, Response},
            http::StatusCode,
            Message,
        },
    };

    #[derive(Clone, Default)]
    struct CaptureProbe {
        started: Arc<AtomicUsize>,
        stopped: Arc<AtomicUsize>,
    }

    impl CaptureProbe {
        fn starts(&self) -> usize {
            self.started.load(Ordering::SeqCst)
        }

        fn stops(&self) -> usize {
            self.stopped.load(Ordering::SeqCst)
        }
    }

    struct MockCapture {
        probe: CaptureProbe,
        deny: bool,
    }

    impl MockCapture {
        fn new(probe: &CaptureProbe) -> Self {
            Self {
                probe: probe.clone(),
                deny: false,
            }
        }

        fn denied(probe: &CaptureProbe) -> Self {
            Self {
                probe: probe.clone(),
                deny: true,
            }
        }
    }

    impl CaptureSource for MockCapture {
        fn start(&mut self) -> Result<()> {
            if self.deny {
                return Err(CalliopeError::PermissionDenied(
                    "Microphone access refused".to_string(),
                ));
            }
            self.probe.started.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&mut self) {
            self.probe.stopped.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn test_config(address: std::net::SocketAddr) -> LiveConfig {
        LiveConfig {
            api_key: Some("test-key".to_string()),
            endpoint: format!("ws://{address}"),
            voice: Some("Puck".to_string()),
            connect_timeout: Duration::from_secs(2),
            ..LiveConfig::default()
        }
    }

    /// Base64 PCM16 of `samples` zero samples (at 24 kHz, `samples / 24_000`
    /// seconds of audio).
    fn pcm_chunk(samples: usize) -> String {
        base64::engine::general_purpose::STANDARD.encode(vec![0u8; samples * 2])
    }

    fn audio_message(samples: usize) -> Message {
        Message::Text(
            json!({
                "serverContent": {
                    "modelTurn": {
                        "parts": [{
                            "inlineData": {
                                "mimeType": "audio/pcm;rate=24000",
                                "data": pcm_chunk(samples)
                            }
                        }]
                    }
                }
            })
            .to_string(),
        )
    }

    async fn next_event(session: &mut LiveSession) -> LiveEvent {
        timeout(Duration::from_secs(2), session.next_event())
            .await
            .expect("event should arrive before timeout")
            .expect("event stream should stay open")
    }

    fn expect_segment(event: LiveEvent) -> AudioSegment {
        match event {
            LiveEvent::Segment(segment) => segment,
            other => panic!("expected segment, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn chunks_schedule_back_to_back_and_interruption_resets_the_timeline() {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let address = listener.local_addr().expect("local addr");

        let query_capture = Arc::new(Mutex::new(String::new()));
        let query_capture_server = Arc::clone(&query_capture);
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("server should accept");
            let query_inner = Arc::clone(&query_capture_server);
            let mut ws = accept_hdr_async(stream, move |req: &Request, response: Response| {
                *query_inner.lock().expect("query lock") =
                    req.uri().query().unwrap_or_default().to_string();
                Ok(response)
            })
            .await
            .expect("handshake should succeed");

            // One-time session configuration comes first.
            let setup_frame = timeout(Duration::from_secs(1), ws.next())
                .await
                .expect("setup wait should not time out")
                .expect("setup frame should exist")
                .expect("setup frame should parse");
            let setup: Value = match setup_frame {
                Message::Text(text) => serde_json::from_str(&text).expect("setup should be JSON"),
                other => panic!("unexpected setup frame: {other:?}"),
            };
            assert_eq!(setup["setup"]["model"], "models/gemini-2.0-flash-exp");
            assert_eq!(
                setup["setup"]["generationConfig"]["speechConfig"]["voiceConfig"]
                    ["prebuiltVoiceConfig"]["voiceName"],
                "Puck"
            );

            ws.send(Message::Text(json!({"setupComplete": {}}).to_string()))
                .await
                .expect("setupComplete should send");

            // The client streams one captured frame.
            let frame = timeout(Duration::from_secs(1), ws.next())
                .await
                .expect("audio wait should not time out")
                .expect("audio frame should exist")
                .expect("audio frame should parse");
            let input: Value = match frame {
                Message::Text(text) => serde_json::from_str(&text).expect("input should be JSON"),
                other => panic!("unexpected input frame: {other:?}"),
            };
            assert_eq!(
                input["realtimeInput"]["mediaChunks"][0]["mimeType"],
                "audio/pcm;rate=16000"
            );

            // Two chunks, barge-in, one more chunk, end of turn.
            ws.send(audio_message(48_000)).await.expect("chunk 1"); // 2.0s
            ws.send(audio_message(36_000)).await.expect("chunk 2"); // 1.5s
            ws.send(Message::Text(
                json!({"serverContent": {"interrupted": true}}).to_string(),
            ))
            .await
            .expect("interruption should send");
            ws.send(audio_message(24_000)).await.expect("chunk 3"); // 1.0s
            ws.send(Message::Text(
                json!({"serverContent": {"turnComplete": true}}).to_string(),
            ))
            .await
            .expect("turnComplete should send");

            // Hold the connection until the client hangs up.
            let _ = timeout(Duration::from_secs(2), ws.next()).await;
        });

        let probe = CaptureProbe::default();
        let mut session = LiveSession::new(test_config(address));
        session.attach_capture(Box::new(MockCapture::new(&probe)));
        session.connect().await.expect("connect should succeed");
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(probe.starts(), 1);

        // A second session on the same handle is refused while one is live.
        let err = session.connect().await.expect_err("double connect");
        assert!(matches!(err, CalliopeError::InvalidState(_)));

        let sent = session
            .send_audio(&[0i16; 1_600])
            .await
            .expect("send should succeed");
        assert!(sent);

        let first = expect_segment(next_event(&mut session).await);
        assert_eq!(first.duration, Duration::from_secs(2));
        assert_eq!(first.sample_rate, 24_000);

        let second = expect_segment(next_event(&mut session).await);
        assert_eq!(second.start, first.start + first.duration);
        assert_eq!(second.duration, Duration::from_millis(1_500));
        assert_eq!(session.active_segments(), 2);

        match next_event(&mut session).await {
            LiveEvent::Interrupted { cancelled } => assert_eq!(cancelled, 2),
            other => panic!("expected interruption, got {other:?}"),
        }
        assert_eq!(session.active_segments(), 0);

        // Playback resumes at "now", not at the stale cumulative slot.
        let resumed = expect_segment(next_event(&mut session).await);
        assert!(resumed.start < first.start + first.duration);
        assert_eq!(resumed.duration, Duration::from_secs(1));

        assert_eq!(next_event(&mut session).await, LiveEvent::TurnComplete);

        session.close().await.expect("close should succeed");
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(next_event(&mut session).await, LiveEvent::Closed);
        assert_eq!(probe.starts(), 1);
        assert_eq!(probe.stops(), 1);
        assert!(query_capture
            .lock()
            .expect("query lock")
            .contains("key=test-key"));

        server.await.expect("server task should complete");
    }

    #[tokio::test]
    async fn rejected_handshake_is_an_auth_error_and_releases_capture() {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let address = listener.local_addr().expect("local addr");

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("server should accept");
            let result = accept_hdr_async(stream, |_req: &Request, _response: Response| {
                let response = tokio_tungstenite::tungstenite::http::Response::builder()
                    .status(StatusCode::UNAUTHORIZED)
                    .body(Some("unauthorized".to_string()))
                    .expect("rejection response should build");
                Err(response)
            })
            .await;
            assert!(result.is_err());
        });

        let probe = CaptureProbe::default();
        let mut session = LiveSession::new(test_config(address));
        session.attach_capture(Box::new(MockCapture::new(&probe)));

        let err = session.connect().await.expect_err("connect should fail");
        assert!(matches!(err, CalliopeError::Authentication(_)));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(probe.starts(), 1);
        assert_eq!(probe.stops(), 1);

        server.await.expect("server task should complete");
    }

    #[tokio::test]
    async fn denied_microphone_leaves_the_session_idle() {
        let probe = CaptureProbe::default();
        let mut config = LiveConfig::default();
        config.api_key = Some("test-key".to_string());
        config.endpoint = "ws://127.0.0.1:9".to_string(); // never reached

        let mut session = LiveSession::new(config);
        session.attach_capture(Box::new(MockCapture::denied(&probe)));

        let err = session.connect().await.expect_err("connect should fail");
        assert!(matches!(err, CalliopeError::PermissionDenied(_)));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(probe.starts(), 0);
        assert_eq!(probe.stops(), 0);
    }

    #[tokio::test]
    async fn frames_produced_outside_active_are_dropped() {
        let mut config = LiveConfig::default();
        config.api_key = Some("test-key".to_string());
        let mut session = LiveSession::new(config);

        let sent = session
            .send_audio(&[0i16; 160])
            .await
            .expect("drop is not an error");
        assert!(!sent);
    }

    #[tokio::test]
    async fn remote_close_tears_down_and_reports_closed() {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let address = listener.local_addr().expect("local addr");

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("server should accept");
            let mut ws = accept_hdr_async(stream, |_req: &Request, response: Response| Ok(response))
                .await
                .expect("handshake should succeed");
            let _ = timeout(Duration::from_secs(1), ws.next()).await; // setup
            ws.send(Message::Text(json!({"setupComplete": {}}).to_string()))
                .await
                .expect("setupComplete should send");
            ws.close(None).await.expect("server-side close");
        });

        let probe = CaptureProbe::default();
        let mut session = LiveSession::new(test_config(address));
        session.attach_capture(Box::new(MockCapture::new(&probe)));
        session.connect().await.expect("connect should succeed");

        assert_eq!(next_event(&mut session).await, LiveEvent::Closed);
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(probe.starts(), 1);
        assert_eq!(probe.stops(), 1);

        // Closing again is a no-op, not a double release.
        session.close().await.expect("close after close");
        assert_eq!(probe.stops(), 1);

        server.await.expect("server task should complete");
    }

    #[tokio::test]
    async fn transport_error_tears_down_and_reports_the_error() {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let address = listener.local_addr().expect("local addr");

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("server should accept");
            let mut ws = accept_hdr_async(stream, |_req: &Request, response: Response| Ok(response))
                .await
                .expect("handshake should succeed");
            let _ = timeout(Duration::from_secs(1), ws.next()).await; // setup
            ws.send(Message::Text(json!({"setupComplete": {}}).to_string()))
                .await
                .expect("setupComplete should send");
            // Drop the connection without a closing handshake.
            drop(ws);
        });

        let probe = CaptureProbe::default();
        let mut session = LiveSession::new(test_config(address));
        session.attach_capture(Box::new(MockCapture::new(&probe)));
        session.connect().await.expect("connect should succeed");

        match next_event(&mut session).await {
            LiveEvent::Error { .. } | LiveEvent::Closed => {}
            other => panic!("expected error or close, got {other:?}"),
        }
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(probe.starts(), 1);
        assert_eq!(probe.stops(), 1);

        server.await.expect("server task should complete");
    }
}
