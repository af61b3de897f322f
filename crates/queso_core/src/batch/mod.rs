//! Batch harness: run the analysis entry across a list of inputs.
//!
//! Each input gets its own output directory and its own process, so one
//! crashing run can never poison its siblings. Per-run exit code, final
//! status (read back from the job record), and wall-clock time are
//! collected into one `summary.json` per batch, ordered as the runs
//! happened. Useful for manual regression passes when tuning analysis
//! heuristics.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::artifacts::{META_FILE, SUMMARY_FILE};
use crate::models::JobRecord;

/// Errors raised by the batch harness itself (individual run failures are
/// recorded, not raised).
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Sources file not found: {0}")]
    SourcesNotFound(PathBuf),

    #[error("No usable entries found in {0}")]
    NoSources(PathBuf),

    #[error("Failed to parse sources file {path}: {message}")]
    SourcesParse { path: PathBuf, message: String },

    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },
}

impl BatchError {
    fn io(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }
}

/// Result type for batch operations.
pub type BatchResult<T> = Result<T, BatchError>;

/// One row of the batch summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub input: String,
    pub tag: String,
    pub out_dir: String,
    pub returncode: i32,
    pub status: String,
    pub elapsed_sec: f64,
}

/// Outcome of a whole batch.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// Where `summary.json` was written.
    pub summary_path: PathBuf,
    /// Per-run records in execution order.
    pub records: Vec<RunRecord>,
}

/// Harness that drives the job entry across a sources list.
pub struct BatchRunner {
    sources_file: PathBuf,
    out_root: PathBuf,
    repeats: u32,
    extra_opts: Option<Map<String, Value>>,
    entry_command: Option<Vec<String>>,
}

impl BatchRunner {
    pub fn new(sources_file: impl Into<PathBuf>, out_root: impl Into<PathBuf>, repeats: u32) -> Self {
        Self {
            sources_file: sources_file.into(),
            out_root: out_root.into(),
            repeats: repeats.max(1),
            extra_opts: None,
            entry_command: None,
        }
    }

    /// Extra options forwarded to every run via `--opts`.
    pub fn with_extra_opts(mut self, opts: Map<String, Value>) -> Self {
        self.extra_opts = Some(opts);
        self
    }

    /// Override the entry command (program + leading arguments). Defaults
    /// to this executable's `analyze` subcommand.
    pub fn with_entry_command(mut self, command: Vec<String>) -> Self {
        self.entry_command = Some(command);
        self
    }

    /// Run the whole batch and write the summary.
    pub fn run(&self) -> BatchResult<BatchOutcome> {
        let sources = load_sources(&self.sources_file)?;

        let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S").to_string();
        let batch_root = self.out_root.join(stamp);
        fs::create_dir_all(&batch_root)
            .map_err(|e| BatchError::io(format!("create {}", batch_root.display()), e))?;

        let mut records = Vec::new();
        for repeat in 0..self.repeats {
            for (idx, (tag, input)) in sources.iter().enumerate() {
                let slug_source = if tag == "auto" { input } else { tag };
                let label = format!("{:02}-{:02}-{}", repeat + 1, idx + 1, slugify(slug_source));
                let out_dir = batch_root.join(&label);
                fs::create_dir_all(&out_dir)
                    .map_err(|e| BatchError::io(format!("create {}", out_dir.display()), e))?;

                let started = Instant::now();
                let returncode = self.invoke_entry(input, &out_dir);
                let elapsed = started.elapsed().as_secs_f64();

                let status = read_final_status(&out_dir);
                if returncode != 0 {
                    tracing::warn!("run failed for {} -> {} (status={})", input, label, status);
                } else {
                    tracing::info!("{} -> {} ({:.1}s, status={})", input, label, elapsed, status);
                }

                records.push(RunRecord {
                    input: input.clone(),
                    tag: tag.clone(),
                    out_dir: out_dir.to_string_lossy().into_owned(),
                    returncode,
                    status,
                    elapsed_sec: (elapsed * 100.0).round() / 100.0,
                });
            }
        }

        let summary_path = batch_root.join(SUMMARY_FILE);
        let json = serde_json::to_string_pretty(&records)
            .map_err(|e| BatchError::io("serialize summary", io::Error::new(io::ErrorKind::Other, e)))?;
        fs::write(&summary_path, json)
            .map_err(|e| BatchError::io(format!("write {}", summary_path.display()), e))?;

        Ok(BatchOutcome {
            summary_path,
            records,
        })
    }

    /// Spawn one isolated entry process. Spawn failures are folded into a
    /// sentinel exit code so the batch continues.
    fn invoke_entry(&self, input: &str, out_dir: &Path) -> i32 {
        let command = match &self.entry_command {
            Some(command) => command.clone(),
            None => match std::env::current_exe() {
                Ok(exe) => vec![exe.to_string_lossy().into_owned(), "analyze".to_string()],
                Err(e) => {
                    tracing::warn!("cannot resolve entry executable: {e}");
                    return -1;
                }
            },
        };

        let (program, leading) = match command.split_first() {
            Some(split) => split,
            None => return -1,
        };

        let mut cmd = Command::new(program);
        cmd.args(leading);
        cmd.arg("--input").arg(input);
        cmd.arg("--out").arg(out_dir);
        if let Some(opts) = &self.extra_opts {
            match serde_json::to_string(opts) {
                Ok(json) => {
                    cmd.arg("--opts").arg(json);
                }
                Err(e) => tracing::warn!("dropping unserializable extra opts: {e}"),
            }
        }

        match cmd.output() {
            Ok(output) => output.status.code().unwrap_or(-1),
            Err(e) => {
                tracing::warn!("failed to spawn entry for {input}: {e}");
                -1
            }
        }
    }
}

/// Read the run's final status back from its job record. Sentinels mirror
/// what regression tooling expects: `missing-meta` when no record was
/// produced, `meta-corrupt` when it does not parse.
fn read_final_status(out_dir: &Path) -> String {
    let meta_path = out_dir.join(META_FILE);
    if !meta_path.exists() {
        return "missing-meta".to_string();
    }
    match fs::read_to_string(&meta_path)
        .ok()
        .and_then(|content| serde_json::from_str::<JobRecord>(&content).ok())
    {
        Some(record) => match serde_json::to_value(record.status) {
            Ok(Value::String(status)) => status,
            _ => "unknown".to_string(),
        },
        None => "meta-corrupt".to_string(),
    }
}

/// Load the sources list: a JSON array of strings, a JSON object mapping
/// group tags to arrays of strings, or a plain text file with one entry
/// per line (`#` comments ignored). Returns `(tag, input)` pairs.
pub fn load_sources(path: &Path) -> BatchResult<Vec<(String, String)>> {
    if !path.exists() {
        return Err(BatchError::SourcesNotFound(path.to_path_buf()));
    }
    let text = fs::read_to_string(path)
        .map_err(|e| BatchError::io(format!("read {}", path.display()), e))?;
    let text = text.trim();
    if text.is_empty() {
        return Err(BatchError::NoSources(path.to_path_buf()));
    }

    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let mut entries = Vec::new();
    if is_json {
        let payload: Value =
            serde_json::from_str(text).map_err(|e| BatchError::SourcesParse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        match payload {
            Value::Object(groups) => {
                for (tag, values) in groups {
                    if let Value::Array(values) = values {
                        for value in values {
                            if let Some(s) = value.as_str() {
                                if !s.trim().is_empty() {
                                    entries.push((tag.clone(), s.trim().to_string()));
                                }
                            }
                        }
                    }
                }
            }
            Value::Array(values) => {
                for value in values {
                    if let Some(s) = value.as_str() {
                        if !s.trim().is_empty() {
                            entries.push(("auto".to_string(), s.trim().to_string()));
                        }
                    }
                }
            }
            _ => {
                return Err(BatchError::SourcesParse {
                    path: path.to_path_buf(),
                    message: "JSON sources file must be a list or an object".to_string(),
                })
            }
        }
    } else {
        for line in text.lines() {
            let entry = line.trim();
            if !entry.is_empty() && !entry.starts_with('#') {
                entries.push(("auto".to_string(), entry.to_string()));
            }
        }
    }

    if entries.is_empty() {
        return Err(BatchError::NoSources(path.to_path_buf()));
    }
    Ok(entries)
}

/// Collision-safe directory slug: alphanumerics kept, everything else
/// collapsed to single dashes, truncated to 48 characters.
pub fn slugify(label: &str) -> String {
    let safe: String = label
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect();
    let joined = safe
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    let truncated: String = joined.chars().take(48).collect();
    if truncated.is_empty() {
        "input".to_string()
    } else {
        truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn slugify_collapses_and_truncates() {
        assert_eq!(slugify("My Song (final).wav"), "My-Song-final-wav");
        assert_eq!(slugify("!!!"), "input");
        assert_eq!(slugify("https://example.com/watch?v=abc"), "https-example-com-watch-v-abc");
        assert!(slugify(&"x".repeat(100)).chars().count() == 48);
    }

    #[test]
    fn sources_from_json_object_keep_group_tags() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sources.json");
        fs::write(
            &path,
            json!({"golden": ["a.wav", "b.wav"], "noisy": ["c.wav"]}).to_string(),
        )
        .unwrap();

        let mut entries = load_sources(&path).unwrap();
        entries.sort();
        assert_eq!(
            entries,
            vec![
                ("golden".to_string(), "a.wav".to_string()),
                ("golden".to_string(), "b.wav".to_string()),
                ("noisy".to_string(), "c.wav".to_string()),
            ]
        );
    }

    #[test]
    fn sources_from_text_skip_comments() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sources.txt");
        fs::write(&path, "# comment\na.wav\n\nb.wav\n").unwrap();

        let entries = load_sources(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], ("auto".to_string(), "a.wav".to_string()));
    }

    #[test]
    fn empty_sources_are_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sources.txt");
        fs::write(&path, "# only comments\n").unwrap();
        assert!(matches!(
            load_sources(&path),
            Err(BatchError::NoSources(_))
        ));
    }

    #[test]
    fn batch_records_failures_and_continues() {
        let dir = tempdir().unwrap();
        let sources = dir.path().join("sources.txt");
        fs::write(&sources, "first.wav\nsecond.wav\n").unwrap();

        // An "entry" that always fails without writing a record: the batch
        // must still cover both inputs and produce a summary.
        let runner = BatchRunner::new(&sources, dir.path().join("runs"), 1)
            .with_entry_command(vec![
                "sh".to_string(),
                "-c".to_string(),
                "exit 3".to_string(),
            ]);

        let outcome = runner.run().unwrap();
        assert_eq!(outcome.records.len(), 2);
        assert!(outcome.records.iter().all(|r| r.returncode == 3));
        assert!(outcome.records.iter().all(|r| r.status == "missing-meta"));
        assert!(outcome.summary_path.exists());

        let content = fs::read_to_string(&outcome.summary_path).unwrap();
        let parsed: Vec<RunRecord> = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn repeats_produce_distinct_directories() {
        let dir = tempdir().unwrap();
        let sources = dir.path().join("sources.txt");
        fs::write(&sources, "one.wav\n").unwrap();

        let runner = BatchRunner::new(&sources, dir.path().join("runs"), 2)
            .with_entry_command(vec!["true".to_string()]);

        let outcome = runner.run().unwrap();
        assert_eq!(outcome.records.len(), 2);
        assert_ne!(outcome.records[0].out_dir, outcome.records[1].out_dir);
        assert!(outcome.records[0].out_dir.contains("01-01-one-wav"));
        assert!(outcome.records[1].out_dir.contains("02-01-one-wav"));
    }
}
