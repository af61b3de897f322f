//! The backend capability boundary.
//!
//! The actual signal analysis lives outside this crate. In-process
//! strategies talk to it through [`AnalysisBackend`]: one required
//! operation per pipeline stage, implemented per backend version and
//! selected by configuration. Subprocess mode bypasses the trait entirely
//! and drives the backend command line instead.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::models::{IntervalLabel, TempoGrid};

use super::options::AdapterOptions;
use super::{AdapterError, AdapterResult};

/// The four analysis capabilities a backend may provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Tempo,
    Chords,
    Sections,
    Lyrics,
}

impl Capability {
    /// Stable name used in error messages and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Tempo => "tempo_and_beats",
            Capability::Chords => "chords",
            Capability::Sections => "sections",
            Capability::Lyrics => "lyrics",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-process analysis backend.
///
/// Implementations return raw rows; canonicalization and interval
/// normalization are applied uniformly by the adapter, never here.
pub trait AnalysisBackend: Send + Sync {
    /// Backend name, used in configuration and error messages.
    fn name(&self) -> &str;

    /// Whether the backend provides a capability. Defaults to all four;
    /// partial backends override this so the adapter can fail with a
    /// descriptive capability error instead of a confusing one deep
    /// inside the stage.
    fn supports(&self, _capability: Capability) -> bool {
        true
    }

    /// Estimate tempo and the beat grid.
    fn tempo_and_beats(&self, input: &str, opts: &AdapterOptions) -> AdapterResult<TempoGrid>;

    /// Estimate the chord progression as raw labelled intervals.
    fn chord_progression(
        &self,
        input: &str,
        opts: &AdapterOptions,
    ) -> AdapterResult<Vec<IntervalLabel>>;

    /// Estimate structural sections as raw labelled intervals. The
    /// resolved validation thresholds are passed explicitly.
    fn sections(
        &self,
        input: &str,
        opts: &AdapterOptions,
        thresholds: &Map<String, Value>,
    ) -> AdapterResult<Vec<IntervalLabel>>;

    /// Transcribe lyrics, writing `lyrics.lrc` (or the subtitle file) and
    /// any richer word-timing output into `out_dir` as a side effect.
    fn transcribe(&self, input: &str, out_dir: &Path) -> AdapterResult<()>;
}

/// Resolve a configured backend name to an implementation.
///
/// Real backends register here per version; the stub backend is always
/// available for smoke runs and harness tests.
pub fn resolve_backend(name: &str) -> AdapterResult<Arc<dyn AnalysisBackend>> {
    match name {
        "stub" => Ok(Arc::new(StubBackend)),
        other => Err(AdapterError::UnknownBackend {
            name: other.to_string(),
            known: "stub".to_string(),
        }),
    }
}

/// Deterministic smoke-test backend.
///
/// Emits a fixed 120 BPM grid, a four-chord loop, three sections, and a
/// two-line lyric file, so the full pipeline can be exercised end to end
/// without any analysis dependency installed.
pub struct StubBackend;

impl AnalysisBackend for StubBackend {
    fn name(&self) -> &str {
        "stub"
    }

    fn tempo_and_beats(&self, _input: &str, _opts: &AdapterOptions) -> AdapterResult<TempoGrid> {
        let beats = (0..16).map(|i| i as f64 * 0.5).collect();
        Ok(TempoGrid::new(120.0, beats))
    }

    fn chord_progression(
        &self,
        _input: &str,
        _opts: &AdapterOptions,
    ) -> AdapterResult<Vec<IntervalLabel>> {
        Ok(vec![
            IntervalLabel::new(0.0, 2.0, "C:maj"),
            IntervalLabel::new(2.0, 4.0, "G:maj"),
            IntervalLabel::new(4.0, 6.0, "Am"),
            IntervalLabel::new(6.0, 8.0, "F:maj"),
        ])
    }

    fn sections(
        &self,
        _input: &str,
        _opts: &AdapterOptions,
        _thresholds: &Map<String, Value>,
    ) -> AdapterResult<Vec<IntervalLabel>> {
        Ok(vec![
            IntervalLabel::new(0.0, 12.0, "Intro"),
            IntervalLabel::new(12.0, 36.0, "Verse"),
            IntervalLabel::new(36.0, 48.0, "Chorus"),
        ])
    }

    fn transcribe(&self, _input: &str, out_dir: &Path) -> AdapterResult<()> {
        let path = out_dir.join(crate::artifacts::LYRICS_FILE);
        fs::write(&path, "[00:00.00] Hello\n[00:02.00] QUESO\n")
            .map_err(|e| AdapterError::io(format!("write {}", path.display()), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn stub_resolves_by_name() {
        let backend = resolve_backend("stub").unwrap();
        assert_eq!(backend.name(), "stub");
        assert!(backend.supports(Capability::Tempo));
    }

    #[test]
    fn unknown_backend_names_candidates() {
        let err = resolve_backend("essentia-v9").err().unwrap();
        let message = err.to_string();
        assert!(message.contains("essentia-v9"));
        assert!(message.contains("stub"));
    }

    #[test]
    fn stub_writes_lyrics() {
        let dir = tempdir().unwrap();
        StubBackend.transcribe("song.wav", dir.path()).unwrap();
        let content =
            fs::read_to_string(dir.path().join(crate::artifacts::LYRICS_FILE)).unwrap();
        assert!(content.contains("[00:00.00] Hello"));
    }
}
