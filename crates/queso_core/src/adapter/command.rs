//! Subprocess strategy: drive the backend command line.
//!
//! For each requested operation the backend program is invoked with the
//! input path, the output directory, and disable flags for every other
//! analysis stage. The backend writes its artifact files as a side effect;
//! this module reads the expected file back and reports a descriptive
//! failure, carrying the captured process output, when it is absent.

use std::io::Read;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::models::{IntervalLabel, TempoGrid};

use super::backend::Capability;
use super::options::AdapterOptions;
use super::{AdapterError, AdapterResult};
use crate::artifacts::{self, CHORDS_FILE, SECTIONS_FILE, TEMPO_FILE};

/// Captured result of one backend invocation.
pub(crate) struct BackendRun {
    /// Rendered command line, for logs and error messages.
    pub command: String,
    pub stdout: String,
    pub stderr: String,
}

impl BackendRun {
    /// The most useful output snippet for an error message: stderr if any,
    /// else stdout, else a placeholder.
    fn detail(&self, fallback: &str) -> String {
        if !self.stderr.trim().is_empty() {
            self.stderr.trim().to_string()
        } else if !self.stdout.trim().is_empty() {
            self.stdout.trim().to_string()
        } else {
            fallback.to_string()
        }
    }
}

/// Stage-disable flags passed for every stage except the requested one.
/// Melody, drum, and beatgrid passes are never wanted by this pipeline.
fn disable_flags(requested: Capability) -> Vec<&'static str> {
    let mut flags = vec!["--no-melody", "--no-drums", "--no-beatgrid"];
    if requested != Capability::Lyrics {
        flags.push("--no-lyrics");
    }
    if requested != Capability::Chords {
        flags.push("--no-chords");
    }
    if requested != Capability::Sections {
        flags.push("--no-sections");
    }
    flags
}

/// Run the backend command for one operation, synchronously, capturing
/// stdout and stderr. A configured timeout kills a hung backend; the exit
/// status is recorded but not itself treated as failure, because artifact
/// presence is the contract.
pub(crate) fn run_backend(
    requested: Capability,
    input: &str,
    opts: &AdapterOptions,
) -> AdapterResult<BackendRun> {
    let out_dir = opts.out_dir();
    std::fs::create_dir_all(out_dir)
        .map_err(|e| AdapterError::io(format!("create {}", out_dir.display()), e))?;

    let parts = opts.backend_command();
    let (program, leading) = parts.split_first().expect("backend command is never empty");

    let mut args: Vec<String> = leading.to_vec();
    args.push("--in".to_string());
    args.push(input.to_string());
    args.push("--out".to_string());
    args.push(out_dir.to_string_lossy().into_owned());
    args.extend(disable_flags(requested).iter().map(|s| s.to_string()));

    let rendered = format!("{} {}", program, args.join(" "));
    tracing::debug!("running backend: {rendered}");

    let mut command = Command::new(program);
    command.args(&args);
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    let output = match opts.backend_timeout() {
        Some(limit) => run_with_timeout(command, &rendered, limit)?,
        None => command
            .output()
            .map_err(|e| AdapterError::spawn(&rendered, e))?,
    };

    // Exit status is recorded for diagnostics only; artifact presence is
    // the success signal.
    tracing::debug!("backend exited with status {:?}", output.status.code());

    Ok(BackendRun {
        command: rendered,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Spawn with piped output and kill the child once the deadline passes.
/// Reader threads drain the pipes so a chatty child cannot deadlock on a
/// full pipe buffer.
fn run_with_timeout(
    mut command: Command,
    rendered: &str,
    limit: Duration,
) -> AdapterResult<Output> {
    let mut child = command
        .spawn()
        .map_err(|e| AdapterError::spawn(rendered, e))?;
    let started_at = Instant::now();

    let mut stdout_pipe = child.stdout.take().expect("stdout piped");
    let mut stderr_pipe = child.stderr.take().expect("stderr piped");

    let (stdout_tx, stdout_rx) = std::sync::mpsc::channel();
    let (stderr_tx, stderr_rx) = std::sync::mpsc::channel();

    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stdout_pipe.read_to_end(&mut buf);
        let _ = stdout_tx.send(buf);
    });
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stderr_pipe.read_to_end(&mut buf);
        let _ = stderr_tx.send(buf);
    });

    loop {
        if let Some(status) = child
            .try_wait()
            .map_err(|e| AdapterError::spawn(rendered, e))?
        {
            let stdout = stdout_rx
                .recv_timeout(Duration::from_millis(100))
                .unwrap_or_default();
            let stderr = stderr_rx
                .recv_timeout(Duration::from_millis(100))
                .unwrap_or_default();
            return Ok(Output {
                status,
                stdout,
                stderr,
            });
        }

        if started_at.elapsed() >= limit {
            let _ = child.kill();
            let _ = child.wait();
            let stderr = stderr_rx
                .recv_timeout(Duration::from_millis(100))
                .unwrap_or_default();
            return Err(AdapterError::CommandTimeout {
                command: rendered.to_string(),
                timeout_secs: limit.as_secs(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
            });
        }

        thread::sleep(Duration::from_millis(20));
    }
}

/// Tempo via subprocess: run, then read `tempo.json` back.
pub(crate) fn tempo_and_beats(input: &str, opts: &AdapterOptions) -> AdapterResult<TempoGrid> {
    let run = run_backend(Capability::Tempo, input, opts)?;
    let path = opts.out_dir().join(TEMPO_FILE);
    if path.exists() {
        return Ok(artifacts::read_tempo(&path)?);
    }
    Err(missing(TEMPO_FILE, run))
}

/// Chords via subprocess: run, then read raw rows from `chords.lab`.
/// Canonicalization happens in the adapter, not here.
pub(crate) fn chords(input: &str, opts: &AdapterOptions) -> AdapterResult<Vec<IntervalLabel>> {
    let run = run_backend(Capability::Chords, input, opts)?;
    let path = opts.out_dir().join(CHORDS_FILE);
    if path.exists() {
        return Ok(artifacts::read_lab(&path)?);
    }
    Err(missing(CHORDS_FILE, run))
}

/// Sections via subprocess: run, then read raw rows from `sections.lab`.
pub(crate) fn sections(input: &str, opts: &AdapterOptions) -> AdapterResult<Vec<IntervalLabel>> {
    let run = run_backend(Capability::Sections, input, opts)?;
    let path = opts.out_dir().join(SECTIONS_FILE);
    if path.exists() {
        return Ok(artifacts::read_lab(&path)?);
    }
    Err(missing(SECTIONS_FILE, run))
}

/// Lyrics via subprocess: run and hand the captured output back so the
/// adapter can report it if the lyric artifacts never appeared.
pub(crate) fn lyrics(input: &str, opts: &AdapterOptions) -> AdapterResult<BackendRun> {
    run_backend(Capability::Lyrics, input, opts)
}

fn missing(artifact: &str, run: BackendRun) -> AdapterError {
    let fallback = format!("{artifact} missing");
    AdapterError::ArtifactMissing {
        artifact: artifact.to_string(),
        command: run.command.clone(),
        detail: run.detail(&fallback),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::Path;
    use tempfile::tempdir;

    fn command_opts(out_dir: &Path, cmd: Vec<&str>) -> AdapterOptions {
        let map = match json!({
            "adapter_mode": "command",
            "backend_command": cmd,
        }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        let mut opts = AdapterOptions::new(map);
        opts.set_out_dir(out_dir);
        opts
    }

    #[test]
    fn disable_flags_keep_requested_stage() {
        let flags = disable_flags(Capability::Chords);
        assert!(!flags.contains(&"--no-chords"));
        assert!(flags.contains(&"--no-lyrics"));
        assert!(flags.contains(&"--no-sections"));
        assert!(flags.contains(&"--no-beatgrid"));

        // Tempo disables all six side stages.
        assert_eq!(disable_flags(Capability::Tempo).len(), 6);
    }

    #[test]
    fn tempo_reads_artifact_written_by_backend() {
        let dir = tempdir().unwrap();
        // "Backend" that writes a tempo.json into its --out directory.
        let script = format!(
            "echo '{{\"bpm\": 99.0, \"beat_times\": [0.0, 0.5]}}' > {}/tempo.json",
            dir.path().display()
        );
        let opts = command_opts(dir.path(), vec!["sh", "-c", &script]);

        let grid = tempo_and_beats("song.wav", &opts).unwrap();
        assert!((grid.bpm - 99.0).abs() < 1e-9);
        assert_eq!(grid.beat_times.len(), 2);
    }

    #[test]
    fn missing_artifact_reports_captured_output() {
        let dir = tempdir().unwrap();
        let opts = command_opts(dir.path(), vec!["sh", "-c", "echo boom >&2"]);

        let err = chords("song.wav", &opts).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("chords.lab"));
        assert!(message.contains("boom"));
    }

    #[test]
    fn timeout_kills_hung_backend() {
        let dir = tempdir().unwrap();
        let map = match json!({
            "backend_command": ["sh", "-c", "sleep 30"],
            "backend_timeout_secs": 1,
        }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        let mut opts = AdapterOptions::new(map);
        opts.set_out_dir(dir.path());

        let started = Instant::now();
        let err = tempo_and_beats("song.wav", &opts).unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(matches!(err, AdapterError::CommandTimeout { .. }));
    }
}
