//! Job entry point: run one analysis job end to end.
//!
//! This is the single place where an in-flight error becomes a terminal
//! job record. The pipeline itself never calls `fail()`; it propagates,
//! and the entry converts.

use std::io;
use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::adapter::{AdapterError, AdapterOptions, AnalysisAdapter};
use crate::logging::JobLogger;
use crate::pipeline::{PipelineError, PipelineOrchestrator};
use crate::progress::ProgressRecorder;

/// Errors surfaced by the job entry.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("Job setup failed: {source}")]
    Setup {
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Outcome of a job run that did not fail.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    /// True when the run was cancelled at a stage boundary; the job
    /// record is left `running` and no artifacts beyond the completed
    /// stages exist.
    pub cancelled: bool,
}

/// Run one analysis job: start the progress record, build the adapter
/// from the merged options, run all stages, finalize the record.
///
/// On success the output directory contains the four artifact files and a
/// `meta.json` with `status: done`, `progress: 100`. On failure the record
/// is finalized with `status: failed` plus the error message, and the
/// error is returned for the caller to map onto its exit code.
pub fn run_job(
    input: &str,
    out_dir: &Path,
    opts_map: Map<String, Value>,
) -> Result<JobOutcome, JobError> {
    let recorder = ProgressRecorder::start(out_dir, Some(input), opts_map.clone())
        .map_err(|source| JobError::Setup { source })?;

    run_under_recorder(input, out_dir, opts_map, &recorder)
}

/// Variant used when the caller owns the recorder (and possibly a cancel
/// handle wired to it).
pub fn run_under_recorder(
    input: &str,
    out_dir: &Path,
    opts_map: Map<String, Value>,
    recorder: &ProgressRecorder,
) -> Result<JobOutcome, JobError> {
    let mut opts = AdapterOptions::new(opts_map);

    let adapter = match AnalysisAdapter::from_options(&opts) {
        Ok(adapter) => adapter,
        Err(e) => {
            recorder.fail(&e);
            return Err(e.into());
        }
    };

    let logger = match JobLogger::new(out_dir) {
        Ok(logger) => Arc::new(logger),
        Err(e) => {
            let err = JobError::Setup { source: e };
            recorder.fail(&err);
            return Err(err);
        }
    };

    let orchestrator = PipelineOrchestrator::new(adapter, logger.clone());
    match orchestrator.run(input, out_dir, &mut opts, recorder) {
        Ok(result) if result.cancelled => {
            tracing::info!("job cancelled; record left running");
            Ok(JobOutcome { cancelled: true })
        }
        Ok(_) => {
            recorder.done();
            Ok(JobOutcome { cancelled: false })
        }
        Err(e) => {
            logger.error(&e.to_string());
            recorder.fail(&e);
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{
        read_lab, read_tempo, CHORDS_FILE, LYRICS_FILE, META_FILE, SECTIONS_FILE, TEMPO_FILE,
    };
    use crate::models::{JobRecord, JobStatus};
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    fn read_record(dir: &Path) -> JobRecord {
        let content = fs::read_to_string(dir.join(META_FILE)).unwrap();
        serde_json::from_str(&content).unwrap()
    }

    #[test]
    fn stub_run_produces_all_artifacts_and_done_record() {
        let dir = tempdir().unwrap();
        let outcome = run_job("song.wav", dir.path(), Map::new()).unwrap();
        assert!(!outcome.cancelled);

        let grid = read_tempo(&dir.path().join(TEMPO_FILE)).unwrap();
        assert!(grid.bpm > 0.0);
        assert!(!grid.beat_times.is_empty());

        let chords = read_lab(&dir.path().join(CHORDS_FILE)).unwrap();
        assert!(!chords.is_empty());
        assert!(chords.iter().all(|r| r.label.contains(':')));

        let sections = read_lab(&dir.path().join(SECTIONS_FILE)).unwrap();
        assert!(!sections.is_empty());

        let lyrics = fs::read_to_string(dir.path().join(LYRICS_FILE)).unwrap();
        assert!(lyrics.lines().next().unwrap().starts_with('['));

        let record = read_record(dir.path());
        assert_eq!(record.status, JobStatus::Done);
        assert_eq!(record.progress, 100);
        assert!(record.ended.is_some());
    }

    #[test]
    fn unknown_backend_fails_record_and_names_backend() {
        let dir = tempdir().unwrap();
        let opts = match json!({"backend": "essentia-v9"}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };

        let err = run_job("song.wav", dir.path(), opts).unwrap_err();
        assert!(err.to_string().contains("essentia-v9"));

        let record = read_record(dir.path());
        assert_eq!(record.status, JobStatus::Failed);
        assert!(record.error.unwrap().contains("essentia-v9"));
    }

    #[test]
    fn cancelled_job_leaves_record_running() {
        let dir = tempdir().unwrap();
        let recorder =
            ProgressRecorder::start(dir.path(), Some("song.wav"), Map::new()).unwrap();
        recorder.cancel_handle().cancel();

        let outcome =
            run_under_recorder("song.wav", dir.path(), Map::new(), &recorder).unwrap();
        assert!(outcome.cancelled);

        let record = read_record(dir.path());
        assert_eq!(record.status, JobStatus::Running);
    }

    #[test]
    fn failed_command_backend_records_failure() {
        let dir = tempdir().unwrap();
        let opts = match json!({
            "adapter_mode": "command",
            "backend_command": ["sh", "-c", "echo no analyzers here >&2"],
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };

        let err = run_job("song.wav", dir.path(), opts).unwrap_err();
        assert!(err.to_string().contains("tempo.json"));

        let record = read_record(dir.path());
        assert_eq!(record.status, JobStatus::Failed);
        assert!(record.trace.is_some());
    }
}
