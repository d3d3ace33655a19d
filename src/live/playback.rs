//! Output playback scheduling.
//!
//! Streamed response audio arrives as independent chunks; the scheduler
//! assigns each a start time on the output timeline so chunks play
//! back-to-back in arrival order. A chunk that arrives after its slot has
//! passed is clamped to "now" — the resulting audible gap is the accepted
//! degradation under sustained network delay, never corrected by skipping
//! or resync.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// A clock over the output timeline.
pub trait OutputClock: Send {
    /// Time elapsed on the output timeline.
    fn now(&self) -> Duration;
}

/// Wall-clock seconds since construction.
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl OutputClock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// One scheduled unit of output audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledSegment {
    pub id: u64,
    pub start: Duration,
    pub duration: Duration,
}

impl ScheduledSegment {
    pub fn end(&self) -> Duration {
        self.start + self.duration
    }
}

/// Tracks the playback cursor and the set of scheduled-but-unfinished
/// segments.
///
/// The cursor is monotonically non-decreasing except across
/// [`PlaybackScheduler::interrupt`], which collapses it to the present.
#[derive(Debug, Default)]
pub struct PlaybackScheduler {
    cursor: Duration,
    next_id: u64,
    active: BTreeMap<u64, ScheduledSegment>,
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Where the next chunk would start if it arrived at or before the
    /// cursor.
    pub fn cursor(&self) -> Duration {
        self.cursor
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Reset to a fresh timeline starting at `now` (connection open).
    pub fn reset(&mut self, now: Duration) {
        self.cursor = now;
        self.active.clear();
    }

    /// Schedule a chunk of the given duration: it starts at
    /// `max(cursor, now)` and advances the cursor by its duration.
    pub fn schedule(&mut self, duration: Duration, now: Duration) -> ScheduledSegment {
        let start = self.cursor.max(now);
        let segment = ScheduledSegment {
            id: self.next_id,
            start,
            duration,
        };
        self.next_id += 1;
        self.cursor = start + duration;
        self.active.insert(segment.id, segment);
        segment
    }

    /// Force-stop everything scheduled and collapse the cursor to `now`.
    /// Returns the segments that were cut off.
    pub fn interrupt(&mut self, now: Duration) -> Vec<ScheduledSegment> {
        let cancelled = std::mem::take(&mut self.active).into_values().collect();
        self.cursor = now;
        cancelled
    }

    /// Remove one segment on natural completion.
    pub fn finish(&mut self, id: u64) -> bool {
        self.active.remove(&id).is_some()
    }

    /// Remove every segment whose playback window has passed.
    pub fn reap(&mut self, now: Duration) -> usize {
        let before = self.active.len();
        self.active.retain(|_, segment| segment.end() > now);
        before - self.active.len()
    }
}
