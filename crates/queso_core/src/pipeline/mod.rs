//! Pipeline orchestrator: the fixed-order analysis stages.
//!
//! Stage order is init → tempo → chords → sections → lyrics → finalize.
//! Each stage boundary checks for cancellation (a silent early exit, never
//! a failure), reports a phase-banded progress percent so progress stays
//! monotonic across stages of unpredictable duration, invokes the adapter,
//! and persists the stage's artifact. Errors propagate to the caller
//! uncaught; the job entry point owns the conversion into a terminal
//! record. There is no retry: a failed stage fails the run.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::adapter::{AdapterError, AdapterOptions, AnalysisAdapter};
use crate::artifacts::{
    self, ArtifactError, CHORDS_FILE, LYRICS_FILE, SECTIONS_FILE, SUBTITLES_FILE, TEMPO_FILE,
};
use crate::logging::JobLogger;
use crate::progress::ProgressRecorder;

/// Progress percent bands per stage: (enter, exit).
const TEMPO_BAND: (u32, u32) = (5, 18);
const CHORDS_BAND: (u32, u32) = (22, 45);
const SECTIONS_BAND: (u32, u32) = (50, 72);
const LYRICS_BAND: (u32, u32) = (75, 92);
const FINALIZE_PERCENT: u32 = 99;

/// Errors raised while running the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A stage's adapter call failed.
    #[error("Stage '{stage}' failed: {source}")]
    StageFailed {
        stage: &'static str,
        #[source]
        source: AdapterError,
    },

    /// Persisting a stage's artifact failed.
    #[error("Stage '{stage}' could not persist its artifact: {source}")]
    ArtifactWrite {
        stage: &'static str,
        #[source]
        source: ArtifactError,
    },

    /// A stage that delegates persistence to the adapter completed
    /// without the artifact appearing.
    #[error("Stage '{stage}' completed but artifact {path} is missing")]
    ArtifactAbsent { stage: &'static str, path: PathBuf },

    /// Output directory setup failed.
    #[error("Pipeline setup failed: {source}")]
    Setup {
        #[source]
        source: io::Error,
    },
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineRunResult {
    /// True when a cancellation signal stopped the run at a stage
    /// boundary. The job record is left `running` in that case.
    pub cancelled: bool,
    /// Stages that ran to completion, in order.
    pub stages_completed: Vec<String>,
}

/// Orchestrator for one job's analysis stages.
pub struct PipelineOrchestrator {
    adapter: AnalysisAdapter,
    logger: Arc<JobLogger>,
}

impl PipelineOrchestrator {
    pub fn new(adapter: AnalysisAdapter, logger: Arc<JobLogger>) -> Self {
        Self { adapter, logger }
    }

    /// Run all stages against `input`, writing artifacts into `out_dir`
    /// and reporting progress through `recorder`.
    pub fn run(
        &self,
        input: &str,
        out_dir: &Path,
        opts: &mut AdapterOptions,
        recorder: &ProgressRecorder,
    ) -> PipelineResult<PipelineRunResult> {
        fs::create_dir_all(out_dir).map_err(|e| PipelineError::Setup { source: e })?;
        opts.set_out_dir(out_dir);

        let mut result = PipelineRunResult::default();
        self.logger
            .info(&format!("pipeline start ({} strategy)", self.adapter.strategy_name()));

        // tempo
        if self.cancelled(recorder, "tempo") {
            result.cancelled = true;
            return Ok(result);
        }
        self.logger.phase("tempo");
        let handle = recorder.handle();
        opts.on_progress = Some(Arc::new(move |frac: f64| {
            let pct = 5.0 + 10.0 * frac.clamp(0.0, 1.0);
            handle.step(pct as u32, "tempo");
        }));
        recorder.step(TEMPO_BAND.0, "tempo");
        let grid = self
            .adapter
            .tempo_and_beats(input, opts)
            .map_err(|e| stage_failed("tempo", e))?;
        artifacts::write_tempo(&out_dir.join(TEMPO_FILE), &grid).map_err(|e| {
            PipelineError::ArtifactWrite {
                stage: "tempo",
                source: e,
            }
        })?;
        opts.on_progress = None;
        recorder.step(TEMPO_BAND.1, "tempo");
        result.stages_completed.push("tempo".to_string());

        // chords
        if self.cancelled(recorder, "chords") {
            result.cancelled = true;
            return Ok(result);
        }
        self.logger.phase("chords");
        recorder.step(CHORDS_BAND.0, "chords");
        let chords = self
            .adapter
            .chords(input, opts)
            .map_err(|e| stage_failed("chords", e))?;
        let chords_path = out_dir.join(CHORDS_FILE);
        artifacts::write_lab(&chords_path, &chords).map_err(|e| PipelineError::ArtifactWrite {
            stage: "chords",
            source: e,
        })?;
        // Downstream section estimation may consult the chord intervals.
        opts.default_chord_lab_path(&chords_path);
        recorder.step(CHORDS_BAND.1, "chords");
        result.stages_completed.push("chords".to_string());

        // sections (artifact persisted by the adapter call)
        if self.cancelled(recorder, "sections") {
            result.cancelled = true;
            return Ok(result);
        }
        self.logger.phase("sections");
        recorder.step(SECTIONS_BAND.0, "sections");
        self.adapter
            .sections(input, opts)
            .map_err(|e| stage_failed("sections", e))?;
        let sections_path = out_dir.join(SECTIONS_FILE);
        if !sections_path.exists() {
            return Err(PipelineError::ArtifactAbsent {
                stage: "sections",
                path: sections_path,
            });
        }
        recorder.step(SECTIONS_BAND.1, "sections");
        result.stages_completed.push("sections".to_string());

        // lyrics (artifacts persisted by the adapter call)
        if self.cancelled(recorder, "lyrics") {
            result.cancelled = true;
            return Ok(result);
        }
        self.logger.phase("lyrics");
        recorder.step(LYRICS_BAND.0, "lyrics");
        self.adapter
            .lyrics(input, opts)
            .map_err(|e| stage_failed("lyrics", e))?;
        let lyrics_path = out_dir.join(LYRICS_FILE);
        if !lyrics_path.exists() && !out_dir.join(SUBTITLES_FILE).exists() {
            return Err(PipelineError::ArtifactAbsent {
                stage: "lyrics",
                path: lyrics_path,
            });
        }
        recorder.step(LYRICS_BAND.1, "lyrics");
        result.stages_completed.push("lyrics".to_string());

        // finalize
        if self.cancelled(recorder, "finalize") {
            result.cancelled = true;
            return Ok(result);
        }
        recorder.step(FINALIZE_PERCENT, "finalize");
        self.logger.success("pipeline complete");
        Ok(result)
    }

    fn cancelled(&self, recorder: &ProgressRecorder, next_stage: &str) -> bool {
        if recorder.is_cancelled() {
            self.logger
                .warn(&format!("cancelled before stage '{next_stage}'"));
            true
        } else {
            false
        }
    }
}

fn stage_failed(stage: &'static str, source: AdapterError) -> PipelineError {
    PipelineError::StageFailed { stage, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::StubBackend;
    use crate::models::JobStatus;
    use serde_json::Map;
    use tempfile::tempdir;

    fn orchestrator(dir: &Path) -> (PipelineOrchestrator, ProgressRecorder) {
        let logger = Arc::new(JobLogger::new(dir).unwrap());
        let adapter = AnalysisAdapter::native(Arc::new(StubBackend));
        let recorder = ProgressRecorder::start(dir, Some("song.wav"), Map::new()).unwrap();
        (PipelineOrchestrator::new(adapter, logger), recorder)
    }

    #[test]
    fn all_stages_produce_artifacts() {
        let dir = tempdir().unwrap();
        let (orchestrator, recorder) = orchestrator(dir.path());
        let mut opts = AdapterOptions::new(Map::new());

        let result = orchestrator
            .run("song.wav", dir.path(), &mut opts, &recorder)
            .unwrap();

        assert!(!result.cancelled);
        assert_eq!(
            result.stages_completed,
            vec!["tempo", "chords", "sections", "lyrics"]
        );
        for artifact in [TEMPO_FILE, CHORDS_FILE, SECTIONS_FILE, LYRICS_FILE] {
            assert!(dir.path().join(artifact).exists(), "{artifact} missing");
        }

        let record = recorder.snapshot();
        assert_eq!(record.progress, FINALIZE_PERCENT);
        assert_eq!(record.phase.as_deref(), Some("finalize"));
    }

    #[test]
    fn chord_side_input_defaults_to_written_artifact() {
        let dir = tempdir().unwrap();
        let (orchestrator, recorder) = orchestrator(dir.path());
        let mut opts = AdapterOptions::new(Map::new());

        orchestrator
            .run("song.wav", dir.path(), &mut opts, &recorder)
            .unwrap();

        assert_eq!(
            opts.chord_lab_path().unwrap(),
            dir.path().join(CHORDS_FILE)
        );
    }

    #[test]
    fn cancellation_skips_remaining_stages() {
        let dir = tempdir().unwrap();
        let (orchestrator, recorder) = orchestrator(dir.path());
        let mut opts = AdapterOptions::new(Map::new());

        recorder.cancel_handle().cancel();
        let result = orchestrator
            .run("song.wav", dir.path(), &mut opts, &recorder)
            .unwrap();

        assert!(result.cancelled);
        assert!(result.stages_completed.is_empty());
        assert!(!dir.path().join(TEMPO_FILE).exists());

        // Cancellation is not a failure: the record stays running.
        assert_eq!(recorder.snapshot().status, JobStatus::Running);
    }
}
