//! Persisted job status record.
//!
//! One JSON object (`meta.json`) per run is the sole inter-process channel
//! exposing job state; external pollers read it to distinguish a live run
//! from a stalled one. Readers must tolerate unknown fields and records
//! that are still `running`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Product tag stamped into every record.
pub const PRODUCT_TAG: &str = "queso";

/// Artifact schema version tag.
pub const SCHEMA_TAG: &str = "queso-artifacts@1";

/// Terminal and non-terminal job states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Done,
    Failed,
}

/// The pollable progress record for one pipeline run.
///
/// Timestamps are epoch seconds, matching what existing consumers of
/// `meta.json` already parse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub product: String,
    pub schema: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(default)]
    pub opts: Map<String, Value>,
    pub status: JobStatus,
    /// Free-form phase tag: tempo, chords, sections, lyrics, finalize, ...
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// Monotonically non-decreasing percent, 0-100.
    #[serde(default)]
    pub progress: u32,
    pub started: f64,
    pub updated: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Bounded error-cause chain recorded on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
    /// Fields written by newer producers pass through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JobRecord {
    /// Create a fresh running record with progress zero.
    pub fn new(input: Option<&str>, opts: Map<String, Value>) -> Self {
        let now = epoch_seconds();
        Self {
            product: PRODUCT_TAG.to_string(),
            schema: SCHEMA_TAG.to_string(),
            input: input.map(str::to_string),
            opts,
            status: JobStatus::Running,
            phase: None,
            progress: 0,
            started: now,
            updated: now,
            ended: None,
            error: None,
            trace: None,
            extra: Map::new(),
        }
    }

    /// Whether the record has reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, JobStatus::Done | JobStatus::Failed)
    }
}

/// Current wall-clock time as epoch seconds.
pub(crate) fn epoch_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_is_running_at_zero() {
        let record = JobRecord::new(Some("song.wav"), Map::new());
        assert_eq!(record.status, JobStatus::Running);
        assert_eq!(record.progress, 0);
        assert_eq!(record.product, "queso");
        assert!(!record.is_terminal());
        assert!(record.started > 0.0);
    }

    #[test]
    fn status_serializes_lowercase() {
        let record = JobRecord::new(None, Map::new());
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"status\":\"running\""));
        assert!(json.contains("\"schema\":\"queso-artifacts@1\""));
    }

    #[test]
    fn unknown_fields_round_trip() {
        let json = r#"{
            "product": "queso",
            "schema": "queso-artifacts@1",
            "status": "running",
            "progress": 40,
            "started": 1.0,
            "updated": 2.0,
            "custom_field": "kept"
        }"#;
        let record: JobRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.progress, 40);
        assert_eq!(record.extra.get("custom_field").unwrap(), "kept");

        let out = serde_json::to_string(&record).unwrap();
        assert!(out.contains("custom_field"));
    }
}
