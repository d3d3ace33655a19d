//! The realtime session lifecycle.
//!
//! A [`LiveSession`] moves through `Idle → Connecting → Active → Closing →
//! Idle`. Exactly one connection is live per session; the connection handle,
//! the capture source, and the playback scheduler are owned by the session
//! and torn down together on every exit path — user stop, remote close, or
//! transport error — before the triggering error is surfaced.

use std::collections::VecDeque;
use std::time::Duration;

use base64::Engine;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::audio::types::sample_rate_from_mime;
use crate::error::{CalliopeError, Result};

use super::capture::{bytes_to_pcm16, CaptureSource};
use super::config::LiveConfig;
use super::events::{AudioSegment, LiveEvent};
use super::playback::{MonotonicClock, OutputClock, PlaybackScheduler};
use super::wire::{self, ServerMessage};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Active,
    Closing,
}

/// What the reader task forwards to the session handle. Frames are parsed
/// off the socket and processed strictly in arrival order by `next_event`.
#[derive(Debug)]
enum ReaderEvent {
    Message(ServerMessage),
    Closed,
    TransportError(String),
}

/// One realtime voice session.
pub struct LiveSession {
    config: LiveConfig,
    state: SessionState,
    writer: Option<WsSink>,
    inbound: Option<mpsc::Receiver<ReaderEvent>>,
    reader_task: Option<JoinHandle<()>>,
    cancel: CancellationToken,
    scheduler: PlaybackScheduler,
    clock: Box<dyn OutputClock>,
    capture: Option<Box<dyn CaptureSource>>,
    capture_started: bool,
    pending: VecDeque<LiveEvent>,
}

impl LiveSession {
    /// Create a session (does not connect yet).
    pub fn new(config: LiveConfig) -> Self {
        Self {
            config,
            state: SessionState::Idle,
            writer: None,
            inbound: None,
            reader_task: None,
            cancel: CancellationToken::new(),
            scheduler: PlaybackScheduler::new(),
            clock: Box::new(MonotonicClock::start()),
            capture: None,
            capture_started: false,
            pending: VecDeque::new(),
        }
    }

    /// Substitute the output clock. The default counts wall-clock time from
    /// session construction.
    pub fn with_clock(mut self, clock: Box<dyn OutputClock>) -> Self {
        self.clock = clock;
        self
    }

    /// Attach the input pipeline. The session starts it on connect and
    /// releases it exactly once on every exit path.
    pub fn attach_capture(&mut self, capture: Box<dyn CaptureSource>) {
        self.capture = Some(capture);
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Segments scheduled but not yet finished.
    pub fn active_segments(&self) -> usize {
        self.scheduler.active_count()
    }

    /// Where the next chunk would be scheduled.
    pub fn playback_cursor(&self) -> Duration {
        self.scheduler.cursor()
    }

    /// Connect to the realtime endpoint and wait for the open
    /// acknowledgment.
    pub async fn connect(&mut self) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(CalliopeError::InvalidState(
                "A session is already active".to_string(),
            ));
        }

        // The microphone comes first: if capture cannot be acquired there
        // is nothing to connect for, and the session stays Idle.
        if let Some(capture) = self.capture.as_mut() {
            capture.start()?;
            self.capture_started = true;
        }

        self.state = SessionState::Connecting;

        let api_key = match self.config.api_key.clone() {
            Some(key) => key,
            None => match crate::config::CalliopeConfig::global().require_api_key() {
                Ok(key) => key,
                Err(e) => {
                    self.fail_connect();
                    return Err(e);
                }
            },
        };
        let url = format!("{}?key={}", self.config.endpoint, api_key);

        debug!(model = %self.config.model, "opening realtime session");

        let opened =
            tokio::time::timeout(self.config.connect_timeout, Self::open(&url, &self.config))
                .await;
        let (writer, reader, early) = match opened {
            Err(_) => {
                self.fail_connect();
                return Err(CalliopeError::ConnectionFailed(
                    "Timed out waiting for open acknowledgment".to_string(),
                ));
            }
            Ok(Err(e)) => {
                self.fail_connect();
                return Err(e);
            }
            Ok(Ok(opened)) => opened,
        };

        self.writer = Some(writer);
        self.spawn_reader(reader);
        self.state = SessionState::Active;

        // The playback timeline starts at connection-open time.
        let now = self.clock.now();
        self.scheduler.reset(now);
        self.pending.clear();
        for message in early {
            self.ingest(message);
        }
        Ok(())
    }

    async fn open(
        url: &str,
        config: &LiveConfig,
    ) -> Result<(WsSink, WsSource, Vec<ServerMessage>)> {
        let (stream, _response) = connect_async(url).await.map_err(map_handshake_error)?;
        let (mut writer, mut reader) = stream.split();

        let setup = serde_json::to_string(&wire::setup_message(config))?;
        writer
            .send(Message::Text(setup))
            .await
            .map_err(|e| CalliopeError::ConnectionFailed(e.to_string()))?;

        // Content frames may race the acknowledgment; keep them for after
        // the transition to Active.
        let mut early = Vec::new();
        loop {
            let parsed = match reader.next().await {
                Some(Ok(Message::Text(text))) => serde_json::from_str::<ServerMessage>(&text).ok(),
                Some(Ok(Message::Binary(bytes))) => {
                    serde_json::from_slice::<ServerMessage>(&bytes).ok()
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(CalliopeError::ConnectionFailed(
                        "Connection closed during setup".to_string(),
                    ));
                }
                Some(Ok(_)) => None,
                Some(Err(e)) => {
                    return Err(CalliopeError::ConnectionFailed(e.to_string()));
                }
            };
            let Some(message) = parsed else { continue };
            if message.setup_complete.is_some() {
                return Ok((writer, reader, early));
            }
            if message.server_content.is_some() {
                early.push(message);
            }
        }
    }

    fn spawn_reader(&mut self, mut reader: WsSource) {
        let (tx, rx) = mpsc::channel(64);
        self.cancel = CancellationToken::new();
        let cancelled = self.cancel.clone();
        self.inbound = Some(rx);
        self.reader_task = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    frame = reader.next() => {
                        let event = match frame {
                            Some(Ok(Message::Text(text))) => {
                                match serde_json::from_str::<ServerMessage>(&text) {
                                    Ok(message) => ReaderEvent::Message(message),
                                    Err(e) => {
                                        warn!(error = %e, "unparseable realtime frame");
                                        continue;
                                    }
                                }
                            }
                            Some(Ok(Message::Binary(bytes))) => {
                                match serde_json::from_slice::<ServerMessage>(&bytes) {
                                    Ok(message) => ReaderEvent::Message(message),
                                    Err(e) => {
                                        warn!(error = %e, "unparseable realtime frame");
                                        continue;
                                    }
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => ReaderEvent::Closed,
                            Some(Ok(_)) => continue,
                            Some(Err(e)) => ReaderEvent::TransportError(e.to_string()),
                        };
                        let terminal = !matches!(event, ReaderEvent::Message(_));
                        if tx.send(event).await.is_err() || terminal {
                            break;
                        }
                    }
                }
            }
        }));
    }

    /// Send one captured input frame.
    ///
    /// Frames produced while the session is not `Active` are dropped (no
    /// backlog); the return value reports whether the frame went out.
    pub async fn send_audio(&mut self, samples: &[i16]) -> Result<bool> {
        if self.state != SessionState::Active {
            return Ok(false);
        }
        let message =
            serde_json::to_string(&wire::audio_chunk(samples, self.config.input_sample_rate))?;
        let writer = self.writer.as_mut().ok_or_else(|| {
            CalliopeError::InvalidState("Active session has no connection".to_string())
        })?;
        match writer.send(Message::Text(message)).await {
            Ok(()) => Ok(true),
            Err(e) => {
                let description = e.to_string();
                self.teardown();
                Err(CalliopeError::Transport(description))
            }
        }
    }

    /// Next session event, in arrival order. Returns `None` once the
    /// session is idle and nothing is pending.
    pub async fn next_event(&mut self) -> Option<LiveEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            let raw = self.inbound.as_mut()?.recv().await;
            match raw {
                Some(ReaderEvent::Message(message)) => self.ingest(message),
                Some(ReaderEvent::Closed) | None => {
                    self.teardown();
                    return Some(LiveEvent::Closed);
                }
                Some(ReaderEvent::TransportError(message)) => {
                    self.teardown();
                    return Some(LiveEvent::Error { message });
                }
            }
        }
    }

    /// Report that a segment's playback finished naturally.
    pub fn segment_finished(&mut self, id: u64) -> bool {
        self.scheduler.finish(id)
    }

    /// Stop the session. Idempotent; releases the capture source and the
    /// connection, discards scheduled segments.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == SessionState::Idle {
            return Ok(());
        }
        self.state = SessionState::Closing;
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.send(Message::Close(None)).await;
        }
        self.teardown();
        self.pending.push_back(LiveEvent::Closed);
        Ok(())
    }

    fn fail_connect(&mut self) {
        self.release_capture();
        self.state = SessionState::Idle;
    }

    /// Release every session resource. Safe to call repeatedly.
    fn teardown(&mut self) {
        self.state = SessionState::Closing;
        self.cancel.cancel();
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        self.writer = None;
        self.inbound = None;
        self.release_capture();
        let now = self.clock.now();
        self.scheduler.interrupt(now);
        self.pending.clear();
        self.state = SessionState::Idle;
    }

    fn release_capture(&mut self) {
        if self.capture_started {
            if let Some(mut capture) = self.capture.take() {
                capture.stop();
            }
            self.capture_started = false;
        }
    }

    fn ingest(&mut self, message: ServerMessage) {
        let Some(content) = message.server_content else {
            return;
        };

        // Barge-in: stale output must stop before any new content lands.
        if content.interrupted {
            let now = self.clock.now();
            let cancelled = self.scheduler.interrupt(now);
            debug!(cancelled = cancelled.len(), "interruption: output flushed");
            self.pending.push_back(LiveEvent::Interrupted {
                cancelled: cancelled.len(),
            });
        }

        if let Some(turn) = content.model_turn {
            for part in turn.parts {
                if let Some(text) = part.text {
                    if !text.is_empty() {
                        self.pending.push_back(LiveEvent::Text { text });
                    }
                }
                if let Some(blob) = part.inline_data {
                    match base64::engine::general_purpose::STANDARD.decode(&blob.data) {
                        Ok(bytes) => self.schedule_chunk(&blob.mime_type, &bytes),
                        Err(e) => warn!(error = %e, "undecodable audio chunk, skipped"),
                    }
                }
            }
        }

        if content.turn_complete {
            self.pending.push_back(LiveEvent::TurnComplete);
        }
    }

    fn schedule_chunk(&mut self, mime_type: &str, bytes: &[u8]) {
        let samples = bytes_to_pcm16(bytes);
        if samples.is_empty() {
            return;
        }
        let sample_rate = sample_rate_from_mime(mime_type, self.config.output_sample_rate);
        let duration = Duration::from_secs_f64(samples.len() as f64 / sample_rate as f64);
        let now = self.clock.now();
        self.scheduler.reap(now);
        let scheduled = self.scheduler.schedule(duration, now);
        self.pending.push_back(LiveEvent::Segment(AudioSegment {
            id: scheduled.id,
            start: scheduled.start,
            duration,
            samples,
            sample_rate,
        }));
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        self.release_capture();
    }
}

fn map_handshake_error(error: tungstenite::Error) -> CalliopeError {
    match error {
        tungstenite::Error::Http(response) => {
            let status = response.status().as_u16();
            let body = response
                .body()
                .as_ref()
                .map(|bytes| String::from_utf8_lossy(bytes).to_string())
                .unwrap_or_default();
            if status == 401 || status == 403 {
                CalliopeError::Authentication(format!(
                    "Realtime endpoint rejected the handshake (status {status}): {body}"
                ))
            } else {
                CalliopeError::ConnectionFailed(format!(
                    "Handshake failed with status {status}: {body}"
                ))
            }
        }
        other => CalliopeError::ConnectionFailed(other.to_string()),
    }
}
