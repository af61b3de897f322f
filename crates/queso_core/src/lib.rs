//! QUESO Foundry core - audio analysis pipeline orchestration.
//!
//! This crate contains the pipeline, adapter, codec, progress, and batch
//! logic with zero CLI dependencies. The actual signal analysis is an
//! external capability reached either in-process through the
//! [`adapter::AnalysisBackend`] trait or by shelling out to the backend
//! command line; both paths converge on identical artifact semantics.

pub mod adapter;
pub mod artifacts;
pub mod batch;
pub mod config;
pub mod job;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod progress;

pub use adapter::{AdapterError, AdapterOptions, AnalysisAdapter, AnalysisBackend};
pub use job::{run_job, JobError, JobOutcome};
pub use models::{IntervalLabel, JobRecord, JobStatus, TempoGrid, TimedTextCue};
pub use pipeline::{PipelineError, PipelineOrchestrator};
pub use progress::{CancelHandle, ProgressRecorder};

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
