//! Timeline primitives: tempo grids, labelled intervals, and timed text cues.
//!
//! These are the in-memory shapes every artifact file normalizes to,
//! regardless of which adapter strategy produced the raw rows.

use serde::{Deserialize, Serialize};

/// Width a degenerate interval (`end <= start`) is widened by during
/// normalization, in seconds.
pub const INTERVAL_EPSILON: f64 = 1e-3;

/// Tempo estimate together with the beat grid that produced it.
///
/// Immutable once written: consumers treat the persisted grid as final.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempoGrid {
    /// Beats per minute. Always positive for a well-formed grid.
    #[serde(default)]
    pub bpm: f64,
    /// Beat timestamps in seconds, non-decreasing after normalization.
    #[serde(default)]
    pub beat_times: Vec<f64>,
}

impl TempoGrid {
    pub fn new(bpm: f64, beat_times: Vec<f64>) -> Self {
        Self { bpm, beat_times }
    }

    /// Sort beat timestamps so the grid is non-decreasing.
    pub fn normalized(mut self) -> Self {
        self.beat_times.sort_by(|a, b| a.total_cmp(b));
        self
    }
}

/// A labelled time range, used for both chords and structural sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalLabel {
    /// Range start in seconds.
    pub start: f64,
    /// Range end in seconds. Strictly greater than `start` after normalization.
    pub end: f64,
    /// Chord name or section name.
    pub label: String,
}

impl IntervalLabel {
    pub fn new(start: f64, end: f64, label: impl Into<String>) -> Self {
        Self {
            start,
            end,
            label: label.into(),
        }
    }
}

/// Widen degenerate intervals and sort by start time.
///
/// Guarantees `end > start` for every row and ascending start order.
/// Overlaps between adjacent intervals are left untouched; the backend
/// owns that decision.
pub fn normalize_intervals(rows: Vec<IntervalLabel>) -> Vec<IntervalLabel> {
    let mut out: Vec<IntervalLabel> = rows
        .into_iter()
        .map(|mut row| {
            if row.end <= row.start {
                row.end = row.start + INTERVAL_EPSILON;
            }
            row
        })
        .collect();
    out.sort_by(|a, b| a.start.total_cmp(&b.start));
    out
}

/// A point-in-time lyric or caption line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedTextCue {
    /// Timestamp in seconds.
    pub time: f64,
    /// Line text.
    pub text: String,
}

impl TimedTextCue {
    pub fn new(time: f64, text: impl Into<String>) -> Self {
        Self {
            time,
            text: text.into(),
        }
    }
}

/// One word inside a word-level lyric line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordCue {
    /// Word onset in seconds.
    pub time: f64,
    /// The word token.
    pub token: String,
}

/// A lyric line with optional per-word timing, anchored at the first
/// word's timestamp. When `words` is empty the plain `text` is used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordLineCue {
    /// Line anchor in seconds (first word onset, or segment start).
    pub time: f64,
    /// Fallback text for lines without word timing.
    pub text: String,
    /// Per-word cues, possibly empty.
    pub words: Vec<WordCue>,
}
