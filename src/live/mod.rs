//! Realtime bidirectional voice session.
//!
//! One [`LiveSession`] owns one live audio conversation: it streams captured
//! input frames outward, sequences playback of streamed response audio, and
//! reacts to server-signaled interruption (barge-in). Everything above the
//! audio-device layer lives here; device I/O plugs in through
//! [`capture::CaptureSource`] and the scheduled segments handed out by
//! [`session::LiveSession::next_event`].

pub mod capture;
pub mod config;
pub mod events;
pub mod playback;
pub mod session;
mod wire;

pub use capture::CaptureSource;
pub use config::LiveConfig;
pub use events::{AudioSegment, LiveEvent};
pub use playback::{MonotonicClock, OutputClock, PlaybackScheduler, ScheduledSegment};
pub use session::{LiveSession, SessionState};
