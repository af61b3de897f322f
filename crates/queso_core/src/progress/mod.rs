//! Job progress recording.
//!
//! One `ProgressRecorder` owns the persisted `meta.json` for a run. The
//! pipeline reports stage transitions through `step`; a background
//! heartbeat thread refreshes the `updated` timestamp once per second so
//! an external poller can tell a stalled run from one that is alive
//! between steps. Every read-modify-persist cycle runs under a single
//! mutex, and every persist is an atomic full-record rewrite.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::artifacts::META_FILE;
use crate::models::{epoch_seconds, JobRecord, JobStatus};

/// Interval between heartbeat re-persists of the record.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// Longest error-cause chain captured into the record's trace.
const TRACE_CAUSE_LIMIT: usize = 8;

/// Maximum trace length in bytes.
const TRACE_BYTE_LIMIT: usize = 2000;

/// Handle for requesting cooperative cancellation of a run.
///
/// The pipeline observes the flag only at stage boundaries; cancellation
/// is a silent early exit, never a failure.
#[derive(Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

struct RecorderInner {
    path: PathBuf,
    record: Mutex<JobRecord>,
    stop: AtomicBool,
    cancelled: Arc<AtomicBool>,
}

impl RecorderInner {
    /// Serialize and atomically rewrite the record file. The caller holds
    /// the record lock, so the snapshot is always consistent.
    fn persist(&self, record: &JobRecord) -> io::Result<()> {
        let json = serde_json::to_string(record)?;

        let temp_path = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)
    }

    /// Persist under the lock, downgrading failures to a warning so a
    /// transient disk error cannot take down the run it is describing.
    fn persist_logged(&self, record: &JobRecord) {
        if let Err(e) = self.persist(record) {
            tracing::warn!("failed to persist {}: {}", self.path.display(), e);
        }
    }
}

/// Recorder for one run's persisted status record.
pub struct ProgressRecorder {
    inner: Arc<RecorderInner>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

/// Cloneable handle that can report progress steps without owning the
/// recorder. Used to wire adapter sub-stage callbacks back into the record.
#[derive(Clone)]
pub struct ProgressHandle {
    inner: Arc<RecorderInner>,
}

impl ProgressHandle {
    /// See [`ProgressRecorder::step`].
    pub fn step(&self, percent: u32, phase: &str) {
        step_inner(&self.inner, percent, phase);
    }
}

fn step_inner(inner: &RecorderInner, percent: u32, phase: &str) {
    let mut record = inner.record.lock();
    record.progress = record.progress.max(percent.min(100));
    if !phase.is_empty() {
        record.phase = Some(phase.to_string());
    }
    record.updated = epoch_seconds();
    inner.persist_logged(&record);
}

impl ProgressRecorder {
    /// Initialize and persist the record, then start the heartbeat thread.
    pub fn start(
        out_dir: &Path,
        input: Option<&str>,
        opts: Map<String, Value>,
    ) -> io::Result<Self> {
        fs::create_dir_all(out_dir)?;

        let inner = Arc::new(RecorderInner {
            path: out_dir.join(META_FILE),
            record: Mutex::new(JobRecord::new(input, opts)),
            stop: AtomicBool::new(false),
            cancelled: Arc::new(AtomicBool::new(false)),
        });

        // The initial write must succeed; later writes degrade to warnings.
        {
            let record = inner.record.lock();
            inner.persist(&record)?;
        }

        let heartbeat = Self::spawn_heartbeat(Arc::clone(&inner));

        Ok(Self {
            inner,
            heartbeat: Mutex::new(Some(heartbeat)),
        })
    }

    fn spawn_heartbeat(inner: Arc<RecorderInner>) -> JoinHandle<()> {
        std::thread::spawn(move || {
            // Short sleeps keep shutdown prompt while ticking once per second.
            let slice = Duration::from_millis(100);
            let slices = (HEARTBEAT_INTERVAL.as_millis() / slice.as_millis()).max(1);
            loop {
                for _ in 0..slices {
                    if inner.stop.load(Ordering::SeqCst) {
                        return;
                    }
                    std::thread::sleep(slice);
                }
                if inner.stop.load(Ordering::SeqCst) {
                    return;
                }
                let mut record = inner.record.lock();
                if record.is_terminal() {
                    return;
                }
                record.updated = epoch_seconds();
                inner.persist_logged(&record);
            }
        })
    }

    /// Raise progress to `max(current, percent)` and set the phase tag.
    pub fn step(&self, percent: u32, phase: &str) {
        step_inner(&self.inner, percent, phase);
    }

    /// Mark the run done: progress 100, ended timestamp, terminal status.
    /// A record that is already terminal is left untouched.
    pub fn done(&self) {
        {
            let mut record = self.inner.record.lock();
            if record.is_terminal() {
                tracing::debug!("done() after terminal status ignored");
                return;
            }
            record.progress = 100;
            record.status = JobStatus::Done;
            let now = epoch_seconds();
            record.updated = now;
            record.ended = Some(now);
            self.inner.persist_logged(&record);
        }
        self.stop_heartbeat();
    }

    /// Mark the run failed, recording the error message and a bounded
    /// cause-chain trace.
    pub fn fail(&self, error: &dyn std::error::Error) {
        {
            let mut record = self.inner.record.lock();
            if record.is_terminal() {
                tracing::debug!("fail() after terminal status ignored");
                return;
            }
            record.status = JobStatus::Failed;
            record.error = Some(error.to_string());
            record.trace = Some(bounded_trace(error));
            let now = epoch_seconds();
            record.updated = now;
            record.ended = Some(now);
            self.inner.persist_logged(&record);
        }
        self.stop_heartbeat();
    }

    /// Whether an external cancellation signal was observed. Always false
    /// when no [`CancelHandle`] has been wired up.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Get a handle an external controller can use to request cancellation.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            flag: Arc::clone(&self.inner.cancelled),
        }
    }

    /// Get a cloneable step handle for progress callbacks.
    pub fn handle(&self) -> ProgressHandle {
        ProgressHandle {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Path of the persisted record file.
    pub fn record_path(&self) -> &Path {
        &self.inner.path
    }

    /// Consistent snapshot of the current record.
    pub fn snapshot(&self) -> JobRecord {
        self.inner.record.lock().clone()
    }

    fn stop_heartbeat(&self) {
        self.inner.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.heartbeat.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ProgressRecorder {
    fn drop(&mut self) {
        self.stop_heartbeat();
    }
}

/// Walk the error's source chain into a bounded, single-string trace.
fn bounded_trace(error: &dyn std::error::Error) -> String {
    let mut trace = error.to_string();
    let mut source = error.source();
    let mut depth = 0;
    while let Some(cause) = source {
        if depth >= TRACE_CAUSE_LIMIT {
            trace.push_str("\n  ...");
            break;
        }
        trace.push_str(&format!("\n  caused by: {cause}"));
        source = cause.source();
        depth += 1;
    }
    if trace.len() > TRACE_BYTE_LIMIT {
        let mut cut = TRACE_BYTE_LIMIT;
        while !trace.is_char_boundary(cut) {
            cut -= 1;
        }
        trace.truncate(cut);
        trace.push_str("...");
    }
    trace
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn read_record(path: &Path) -> JobRecord {
        let content = fs::read_to_string(path).unwrap();
        serde_json::from_str(&content).unwrap()
    }

    #[test]
    fn start_persists_running_record() {
        let dir = tempdir().unwrap();
        let recorder =
            ProgressRecorder::start(dir.path(), Some("song.wav"), Map::new()).unwrap();

        let record = read_record(recorder.record_path());
        assert_eq!(record.status, JobStatus::Running);
        assert_eq!(record.progress, 0);
        assert_eq!(record.input.as_deref(), Some("song.wav"));
    }

    #[test]
    fn progress_is_monotone() {
        let dir = tempdir().unwrap();
        let recorder = ProgressRecorder::start(dir.path(), None, Map::new()).unwrap();

        recorder.step(40, "chords");
        recorder.step(10, "chords");
        recorder.step(55, "sections");

        let record = recorder.snapshot();
        assert_eq!(record.progress, 55);
        assert_eq!(record.phase.as_deref(), Some("sections"));

        // The lower step never reached the file either.
        let persisted = read_record(recorder.record_path());
        assert_eq!(persisted.progress, 55);
    }

    #[test]
    fn done_finalizes_once() {
        let dir = tempdir().unwrap();
        let recorder = ProgressRecorder::start(dir.path(), None, Map::new()).unwrap();

        recorder.step(50, "sections");
        recorder.done();

        let record = read_record(recorder.record_path());
        assert_eq!(record.status, JobStatus::Done);
        assert_eq!(record.progress, 100);
        assert!(record.ended.is_some());

        // A late fail() must not overwrite the terminal status.
        let err = io::Error::new(io::ErrorKind::Other, "late");
        recorder.fail(&err);
        let record = read_record(recorder.record_path());
        assert_eq!(record.status, JobStatus::Done);
    }

    #[test]
    fn fail_records_error_and_trace() {
        let dir = tempdir().unwrap();
        let recorder = ProgressRecorder::start(dir.path(), None, Map::new()).unwrap();

        let err = io::Error::new(io::ErrorKind::NotFound, "backend exploded");
        recorder.fail(&err);

        let record = read_record(recorder.record_path());
        assert_eq!(record.status, JobStatus::Failed);
        assert!(record.error.unwrap().contains("backend exploded"));
        assert!(record.trace.is_some());
        assert!(record.ended.is_some());
    }

    #[test]
    fn heartbeat_refreshes_updated() {
        let dir = tempdir().unwrap();
        let recorder = ProgressRecorder::start(dir.path(), None, Map::new()).unwrap();

        let before = read_record(recorder.record_path()).updated;
        std::thread::sleep(Duration::from_millis(1600));
        let after = read_record(recorder.record_path()).updated;

        assert!(after > before, "heartbeat did not refresh updated");
        recorder.done();
    }

    #[test]
    fn cancel_handle_flips_flag() {
        let dir = tempdir().unwrap();
        let recorder = ProgressRecorder::start(dir.path(), None, Map::new()).unwrap();

        assert!(!recorder.is_cancelled());
        let handle = recorder.cancel_handle();
        handle.cancel();
        assert!(recorder.is_cancelled());
        assert!(handle.is_cancelled());
    }

    #[test]
    fn bounded_trace_truncates() {
        let err = io::Error::new(io::ErrorKind::Other, "x".repeat(5000));
        let trace = bounded_trace(&err);
        assert!(trace.len() <= TRACE_BYTE_LIMIT + 3);
    }
}
