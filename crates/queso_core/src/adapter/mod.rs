//! Analysis adapter: four operations over two interchangeable strategies.
//!
//! The adapter is the single unit the orchestrator talks to. Whether an
//! operation was satisfied by an in-process backend call or by shelling
//! out to the backend command, the caller sees identical artifact
//! semantics: chord labels are canonicalized and intervals normalized
//! here, uniformly, after either strategy returns its raw rows.

mod backend;
mod command;
mod native;
mod options;

use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::artifacts::{self, ArtifactError, SECTIONS_FILE};
use crate::models::{
    canonicalize_chord_label, normalize_intervals, IntervalLabel, TempoGrid, TimedTextCue,
};

pub use backend::{resolve_backend, AnalysisBackend, Capability, StubBackend};
pub use options::{AdapterMode, AdapterOptions, ProgressFraction};

/// Errors raised by adapter operations.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// The configured backend cannot satisfy the requested operation.
    #[error("Backend '{backend}' does not provide capability '{capability}'")]
    CapabilityMissing {
        capability: &'static str,
        backend: String,
    },

    /// No backend is registered under the configured name.
    #[error("Unknown backend '{name}' (known backends: {known})")]
    UnknownBackend { name: String, known: String },

    /// The backend command could not be spawned or waited on.
    #[error("Failed to run backend command `{command}`: {source}")]
    CommandSpawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The backend command outlived its configured deadline.
    #[error("Backend command `{command}` timed out after {timeout_secs}s: {stderr}")]
    CommandTimeout {
        command: String,
        timeout_secs: u64,
        stderr: String,
    },

    /// The backend command completed but never produced the artifact.
    #[error("Expected artifact '{artifact}' missing after `{command}`: {detail}")]
    ArtifactMissing {
        artifact: String,
        command: String,
        detail: String,
    },

    /// Artifact file present but unreadable.
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    /// File I/O outside the codecs.
    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },

    /// Failure reported by an in-process backend.
    #[error("Backend failure: {0}")]
    Backend(String),
}

impl AdapterError {
    pub fn io(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    pub(crate) fn spawn(command: &str, source: io::Error) -> Self {
        Self::CommandSpawn {
            command: command.to_string(),
            source,
        }
    }
}

/// Result type for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

enum Strategy {
    Native(Arc<dyn AnalysisBackend>),
    Command,
}

/// Dispatcher for the four analysis operations.
pub struct AnalysisAdapter {
    strategy: Strategy,
}

impl AnalysisAdapter {
    /// Build an adapter over an in-process backend.
    pub fn native(backend: Arc<dyn AnalysisBackend>) -> Self {
        Self {
            strategy: Strategy::Native(backend),
        }
    }

    /// Build an adapter that shells out to the backend command configured
    /// in the per-run options.
    pub fn command() -> Self {
        Self {
            strategy: Strategy::Command,
        }
    }

    /// Build the adapter selected by the options: `adapter_mode` picks the
    /// strategy, `backend` names the in-process implementation.
    pub fn from_options(opts: &AdapterOptions) -> AdapterResult<Self> {
        match opts.adapter_mode() {
            AdapterMode::Command => Ok(Self::command()),
            AdapterMode::Native => Ok(Self::native(resolve_backend(opts.backend_name())?)),
        }
    }

    /// Human-readable strategy tag for logs.
    pub fn strategy_name(&self) -> &'static str {
        match &self.strategy {
            Strategy::Native(_) => "native",
            Strategy::Command => "command",
        }
    }

    /// Estimate tempo and beats. The grid is normalized (sorted beats)
    /// regardless of strategy.
    pub fn tempo_and_beats(&self, input: &str, opts: &AdapterOptions) -> AdapterResult<TempoGrid> {
        let grid = match &self.strategy {
            Strategy::Native(backend) => native::tempo_and_beats(backend, input, opts)?,
            Strategy::Command => command::tempo_and_beats(input, opts)?,
        };
        Ok(grid.normalized())
    }

    /// Estimate the chord progression. Labels are canonicalized under the
    /// configured enharmonic preference and intervals normalized.
    pub fn chords(&self, input: &str, opts: &AdapterOptions) -> AdapterResult<Vec<IntervalLabel>> {
        let raw = match &self.strategy {
            Strategy::Native(backend) => native::chords(backend, input, opts)?,
            Strategy::Command => command::chords(input, opts)?,
        };

        let enharmonic = opts.enharmonic();
        let rows = raw
            .into_iter()
            .map(|mut row| {
                row.label = canonicalize_chord_label(&row.label, enharmonic);
                row
            })
            .collect();
        Ok(normalize_intervals(rows))
    }

    /// Estimate structural sections. The `sections.lab` artifact is
    /// guaranteed to exist after a successful call: the subprocess backend
    /// writes it, and the native path persists the normalized rows itself.
    pub fn sections(&self, input: &str, opts: &AdapterOptions) -> AdapterResult<Vec<IntervalLabel>> {
        match &self.strategy {
            Strategy::Native(backend) => {
                let rows = normalize_intervals(native::sections(backend, input, opts)?);
                artifacts::write_lab(&opts.out_dir().join(SECTIONS_FILE), &rows)?;
                Ok(rows)
            }
            Strategy::Command => Ok(normalize_intervals(command::sections(input, opts)?)),
        }
    }

    /// Transcribe lyrics. Line-level cues are read back through the
    /// LRC-then-SRT fallback chain, and a word-level side artifact is
    /// derived opportunistically when richer backend output exists.
    pub fn lyrics(&self, input: &str, opts: &AdapterOptions) -> AdapterResult<Vec<TimedTextCue>> {
        match &self.strategy {
            Strategy::Native(backend) => {
                let rows = native::lyrics(backend, input, opts)?;
                if artifacts::try_write_word_lrc(opts.out_dir()) {
                    tracing::debug!("word-level lyric artifact written");
                }
                Ok(rows)
            }
            Strategy::Command => {
                let run = command::lyrics(input, opts)?;
                if artifacts::try_write_word_lrc(opts.out_dir()) {
                    tracing::debug!("word-level lyric artifact written");
                }
                let rows = artifacts::read_lyrics(opts.out_dir())?;
                if rows.is_empty() {
                    let detail = if !run.stderr.trim().is_empty() {
                        run.stderr.trim().to_string()
                    } else if !run.stdout.trim().is_empty() {
                        run.stdout.trim().to_string()
                    } else {
                        "lyrics.lrc/.srt missing".to_string()
                    };
                    return Err(AdapterError::ArtifactMissing {
                        artifact: format!(
                            "{}/{}",
                            artifacts::LYRICS_FILE,
                            artifacts::SUBTITLES_FILE
                        ),
                        command: run.command,
                        detail,
                    });
                }
                Ok(rows)
            }
        }
    }
}
