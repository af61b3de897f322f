//! Logging: per-job narrative log plus tracing initialization.
//!
//! Library modules emit diagnostics through `tracing`; each pipeline run
//! additionally writes a human-readable `job.log` into its output
//! directory, with phase markers, for post-mortem reading next to the
//! artifacts.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

/// File name of the per-job log inside the output directory.
pub const JOB_LOG_FILE: &str = "job.log";

/// Callback receiving each formatted log line (for UIs or test capture).
pub type LogCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Per-job logger with file output and an optional line callback.
pub struct JobLogger {
    log_path: PathBuf,
    file: Mutex<Option<BufWriter<File>>>,
    callback: Mutex<Option<LogCallback>>,
}

impl JobLogger {
    /// Create a logger writing `job.log` into the given directory.
    pub fn new(out_dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(out_dir)?;
        let log_path = out_dir.join(JOB_LOG_FILE);
        let file = BufWriter::new(File::create(&log_path)?);

        Ok(Self {
            log_path,
            file: Mutex::new(Some(file)),
            callback: Mutex::new(None),
        })
    }

    /// Attach a line callback.
    pub fn with_callback(self, callback: LogCallback) -> Self {
        *self.callback.lock() = Some(callback);
        self
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn info(&self, message: &str) {
        self.output(message);
    }

    pub fn warn(&self, message: &str) {
        self.output(&format!("[WARNING] {message}"));
    }

    pub fn error(&self, message: &str) {
        self.output(&format!("[ERROR] {message}"));
    }

    /// Phase marker: `=== tempo ===`.
    pub fn phase(&self, name: &str) {
        self.output(&format!("=== {name} ==="));
    }

    pub fn success(&self, message: &str) {
        self.output(&format!("[SUCCESS] {message}"));
    }

    pub fn flush(&self) {
        if let Some(ref mut writer) = *self.file.lock() {
            let _ = writer.flush();
        }
    }

    fn output(&self, message: &str) {
        let line = format!("[{}] {}", Local::now().format("%H:%M:%S"), message);

        if let Some(ref mut writer) = *self.file.lock() {
            let _ = writeln!(writer, "{line}");
        }
        if let Some(ref callback) = *self.callback.lock() {
            callback(&line);
        }
    }
}

impl Drop for JobLogger {
    fn drop(&mut self) {
        self.flush();
        *self.file.lock() = None;
    }
}

/// Initialize the global tracing subscriber for binaries.
///
/// Respects `RUST_LOG`; defaults to info-level output for this crate on
/// stderr. Safe to call more than once.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("queso=info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn writes_to_file() {
        let dir = tempdir().unwrap();
        let logger = JobLogger::new(dir.path()).unwrap();

        logger.phase("tempo");
        logger.info("analyzing");
        logger.flush();

        let content = fs::read_to_string(logger.log_path()).unwrap();
        assert!(content.contains("=== tempo ==="));
        assert!(content.contains("analyzing"));
    }

    #[test]
    fn callback_receives_lines() {
        let dir = tempdir().unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);

        let logger = JobLogger::new(dir.path()).unwrap().with_callback(Box::new(
            move |_line| {
                seen.fetch_add(1, Ordering::SeqCst);
            },
        ));

        logger.info("one");
        logger.warn("two");
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn log_lines_are_timestamped() {
        let dir = tempdir().unwrap();
        let logger = JobLogger::new(dir.path()).unwrap();

        logger.success("pipeline complete");
        logger.flush();

        let content = fs::read_to_string(logger.log_path()).unwrap();
        let line = content.lines().next().unwrap();
        assert!(line.starts_with('['));
        assert!(line.contains("[SUCCESS] pipeline complete"));
    }
}
