//! Events surfaced by a realtime session.

use std::time::Duration;

/// One decoded output audio chunk with its slot on the playback timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    /// Scheduler id; hand it back via `segment_finished` when playback ends.
    pub id: u64,
    /// Scheduled start on the output timeline.
    pub start: Duration,
    /// Decoded length.
    pub duration: Duration,
    /// PCM16 samples, mono.
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

/// Events in a realtime voice session.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    /// Output audio scheduled for playback.
    Segment(AudioSegment),
    /// Text content in the model turn (transcripts, text-modality replies).
    Text { text: String },
    /// The model finished its turn.
    TurnComplete,
    /// The user spoke over the response: `cancelled` segments were
    /// force-stopped and the playback cursor was reset.
    Interrupted { cancelled: usize },
    /// The session ended (remote close or local stop). Resources are
    /// already released when this is observed.
    Closed,
    /// The session died on a transport error. Resources are already
    /// released when this is observed.
    Error { message: String },
}
