//! Artifact codecs: encode/decode for every file the pipeline persists.
//!
//! All functions here are pure with respect to the data they carry; the
//! only state is the filesystem path they are given. Both adapter
//! strategies and the orchestrator funnel through these codecs so the
//! on-disk formats have exactly one reader and one writer each.

mod lab;
mod lrc;
mod srt;
mod tempo;

use std::io;

use thiserror::Error;

pub use lab::{decode_lab, encode_lab, read_lab, write_lab};
pub use lrc::{
    decode_lrc, encode_lrc, encode_word_lrc, format_lrc_timestamp, read_lyrics,
    try_write_word_lrc, write_lrc,
};
pub use srt::parse_srt;
pub use tempo::{read_tempo, write_tempo};

/// Fixed artifact file names inside a job's output directory.
pub const META_FILE: &str = "meta.json";
pub const TEMPO_FILE: &str = "tempo.json";
pub const CHORDS_FILE: &str = "chords.lab";
pub const SECTIONS_FILE: &str = "sections.lab";
pub const LYRICS_FILE: &str = "lyrics.lrc";
pub const WORD_LRC_FILE: &str = "lyrics.word.lrc";
pub const SUBTITLES_FILE: &str = "video_subtitles.srt";
pub const SUMMARY_FILE: &str = "summary.json";

/// Errors raised while encoding or decoding artifact files.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse {what}: {message}")]
    Parse { what: String, message: String },
}

impl ArtifactError {
    pub fn io(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    pub fn parse(what: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            what: what.into(),
            message: message.into(),
        }
    }
}

/// Result type for codec operations.
pub type ArtifactResult<T> = Result<T, ArtifactError>;
