//! Data model shared across the pipeline, adapter, and codecs.

pub mod chords;
mod job_record;
mod timeline;

pub use chords::{canonicalize_chord_label, Enharmonic};
pub(crate) use job_record::epoch_seconds;
pub use job_record::{JobRecord, JobStatus, PRODUCT_TAG, SCHEMA_TAG};
pub use timeline::{
    normalize_intervals, IntervalLabel, TempoGrid, TimedTextCue, WordCue, WordLineCue,
    INTERVAL_EPSILON,
};
