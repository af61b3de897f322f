//! In-process strategy: call the backend trait directly.
//!
//! Capability checks happen here so a partial backend fails with an error
//! naming the capability; sub-stage progress callbacks are invoked around
//! the tempo estimate the way long-running backends report it.

use std::sync::Arc;

use crate::models::{IntervalLabel, TempoGrid, TimedTextCue};

use super::backend::{AnalysisBackend, Capability};
use super::options::AdapterOptions;
use super::{AdapterError, AdapterResult};
use crate::artifacts;

fn require(backend: &dyn AnalysisBackend, capability: Capability) -> AdapterResult<()> {
    if backend.supports(capability) {
        Ok(())
    } else {
        Err(AdapterError::CapabilityMissing {
            capability: capability.as_str(),
            backend: backend.name().to_string(),
        })
    }
}

pub(crate) fn tempo_and_beats(
    backend: &Arc<dyn AnalysisBackend>,
    input: &str,
    opts: &AdapterOptions,
) -> AdapterResult<TempoGrid> {
    require(backend.as_ref(), Capability::Tempo)?;

    if let Some(cb) = &opts.on_progress {
        cb(0.1);
    }
    let grid = backend.tempo_and_beats(input, opts)?;
    if let Some(cb) = &opts.on_progress {
        cb(0.9);
    }
    Ok(grid)
}

pub(crate) fn chords(
    backend: &Arc<dyn AnalysisBackend>,
    input: &str,
    opts: &AdapterOptions,
) -> AdapterResult<Vec<IntervalLabel>> {
    require(backend.as_ref(), Capability::Chords)?;
    backend.chord_progression(input, opts)
}

pub(crate) fn sections(
    backend: &Arc<dyn AnalysisBackend>,
    input: &str,
    opts: &AdapterOptions,
) -> AdapterResult<Vec<IntervalLabel>> {
    require(backend.as_ref(), Capability::Sections)?;
    let thresholds = opts.resolve_thresholds();
    backend.sections(input, opts, &thresholds)
}

/// Run transcription and read the lyric cues back from disk; the backend
/// is responsible for writing its lyric artifacts into `out_dir`.
pub(crate) fn lyrics(
    backend: &Arc<dyn AnalysisBackend>,
    input: &str,
    opts: &AdapterOptions,
) -> AdapterResult<Vec<TimedTextCue>> {
    require(backend.as_ref(), Capability::Lyrics)?;
    backend.transcribe(input, opts.out_dir())?;
    Ok(artifacts::read_lyrics(opts.out_dir())?)
}
