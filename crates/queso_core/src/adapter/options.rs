//! Options that flow end-to-end through a run.
//!
//! The merged options map is created once per run (defaults, config files,
//! caller overrides) and handed by reference to every adapter call. Typed
//! accessors read the knobs this crate understands; unknown keys pass
//! through untouched so backend-specific tuning data survives the trip
//! into `meta.json` and the backend command line.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::models::Enharmonic;

/// Callback reporting a backend-internal progress fraction in `[0, 1]`.
pub type ProgressFraction = Arc<dyn Fn(f64) + Send + Sync>;

/// How the adapter reaches the analysis backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdapterMode {
    /// Call an in-process [`crate::adapter::AnalysisBackend`] implementation.
    #[default]
    Native,
    /// Shell out to the backend command and read its artifact files.
    Command,
}

/// Built-in thresholds profiles for section validation, by name.
///
/// Key vocabulary matches what the section estimator consumes:
/// `energy_drop_db`, `centroid_jump_hz`, `chroma_max_corr`.
const THRESHOLD_PROFILES: [(&str, &str); 3] = [
    (
        "default",
        r#"{"energy_drop_db": 2.0, "centroid_jump_hz": 100.0, "chroma_max_corr": 0.9}"#,
    ),
    (
        "strict",
        r#"{"energy_drop_db": 3.0, "centroid_jump_hz": 150.0, "chroma_max_corr": 0.85}"#,
    ),
    (
        "lenient",
        r#"{"energy_drop_db": 1.0, "centroid_jump_hz": 60.0, "chroma_max_corr": 0.95}"#,
    ),
];

/// File names searched for on-disk thresholds profiles, relative to the
/// working directory.
const PROFILE_FILES: [&str; 2] = ["processing_profiles.json", "analysis/processing_profiles.json"];

/// Per-run options wrapper around the merged JSON map.
#[derive(Clone, Default)]
pub struct AdapterOptions {
    raw: Map<String, Value>,
    out_dir: PathBuf,
    /// Sub-stage progress callback, wired by the orchestrator. Not part of
    /// the serialized options.
    pub on_progress: Option<ProgressFraction>,
}

impl std::fmt::Debug for AdapterOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterOptions")
            .field("raw", &self.raw)
            .field("out_dir", &self.out_dir)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

impl AdapterOptions {
    pub fn new(raw: Map<String, Value>) -> Self {
        Self {
            raw,
            out_dir: PathBuf::new(),
            on_progress: None,
        }
    }

    /// The merged options map, as recorded into the job record.
    pub fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }

    /// Inject the resolved output directory. Mirrored into the raw map so
    /// the backend sees the same value the orchestrator resolved.
    pub fn set_out_dir(&mut self, dir: &Path) {
        self.out_dir = dir.to_path_buf();
        self.raw.insert(
            "out_dir".to_string(),
            Value::String(dir.to_string_lossy().into_owned()),
        );
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    fn get_str(&self, key: &str) -> Option<&str> {
        self.raw.get(key).and_then(Value::as_str)
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        self.raw.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    fn get_f64(&self, key: &str, default: f64) -> f64 {
        self.raw.get(key).and_then(Value::as_f64).unwrap_or(default)
    }

    /// Maximum number of sections the estimator may emit.
    pub fn max_sections(&self) -> u32 {
        self.raw
            .get("max_sections")
            .and_then(Value::as_u64)
            .unwrap_or(7) as u32
    }

    /// Minimum duration of a section, in seconds.
    pub fn min_section_duration(&self) -> f64 {
        self.get_f64("min_section_duration", 4.0)
    }

    /// Whether section boundaries snap to bar lines.
    pub fn sections_bar_align(&self) -> bool {
        self.get_bool("sections_bar_align", true)
    }

    /// Whether spectral validation prunes candidate sections.
    pub fn sections_spectral_validate(&self) -> bool {
        self.get_bool("sections_spectral_validate", true)
    }

    /// Enharmonic preference for chord roots.
    pub fn enharmonic(&self) -> Enharmonic {
        self.get_str("chord_enharmonic")
            .map(Enharmonic::from_option)
            .unwrap_or_default()
    }

    /// Chord interval file the section estimator may consult.
    pub fn chord_lab_path(&self) -> Option<PathBuf> {
        self.get_str("chord_lab_path").map(PathBuf::from)
    }

    /// Default the chord side-input to the given path when unset.
    pub fn default_chord_lab_path(&mut self, path: &Path) {
        if !self.raw.contains_key("chord_lab_path") {
            self.raw.insert(
                "chord_lab_path".to_string(),
                Value::String(path.to_string_lossy().into_owned()),
            );
        }
    }

    pub fn debug(&self) -> bool {
        self.get_bool("debug", false)
    }

    /// Opaque priors forwarded to the backend.
    pub fn beats_per_bar(&self) -> Option<&Value> {
        self.raw.get("beats_per_bar")
    }

    pub fn tuning_priors(&self) -> Option<&Value> {
        self.raw.get("tuning_priors")
    }

    pub fn key_prior(&self) -> Option<&Value> {
        self.raw.get("key_prior")
    }

    pub fn genre_priors(&self) -> Option<&Value> {
        self.raw.get("genre_priors")
    }

    /// Strategy selection: `adapter_mode` is `"native"` or `"command"`.
    pub fn adapter_mode(&self) -> AdapterMode {
        match self.get_str("adapter_mode") {
            Some(mode) if mode.eq_ignore_ascii_case("command") => AdapterMode::Command,
            _ => AdapterMode::Native,
        }
    }

    /// Registry name of the in-process backend.
    pub fn backend_name(&self) -> &str {
        self.get_str("backend").unwrap_or("stub")
    }

    /// The backend command vector for subprocess mode (program + leading
    /// arguments, before `--in`/`--out` and the stage-disable flags).
    pub fn backend_command(&self) -> Vec<String> {
        if let Some(cmd) = self.raw.get("backend_command").and_then(Value::as_array) {
            let parts: Vec<String> = cmd
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
            if !parts.is_empty() {
                return parts;
            }
        }
        vec!["python".to_string(), "-m".to_string(), "src.main".to_string()]
    }

    /// Optional wall-clock bound on one backend invocation.
    pub fn backend_timeout(&self) -> Option<Duration> {
        self.raw
            .get("backend_timeout_secs")
            .and_then(Value::as_u64)
            .map(Duration::from_secs)
    }

    /// Resolve the section validation thresholds, trying in order: an
    /// inline `sections_thresholds` object, the named profile in the
    /// built-in registry, then `processing_profiles.json` on disk. Every
    /// failed source is skipped quietly; the default is empty.
    pub fn resolve_thresholds(&self) -> Map<String, Value> {
        if let Some(inline) = self.raw.get("sections_thresholds").and_then(Value::as_object) {
            return inline.clone();
        }

        let Some(profile) = self.get_str("sections_profile") else {
            return Map::new();
        };

        for (name, json) in THRESHOLD_PROFILES {
            if name == profile {
                if let Ok(Value::Object(map)) = serde_json::from_str(json) {
                    return map;
                }
            }
        }

        for candidate in PROFILE_FILES {
            let path = Path::new(candidate);
            if !path.exists() {
                continue;
            }
            let Ok(content) = std::fs::read_to_string(path) else {
                continue;
            };
            match serde_json::from_str::<Value>(&content) {
                Ok(Value::Object(profiles)) => {
                    if let Some(Value::Object(map)) = profiles.get(profile) {
                        return map.clone();
                    }
                }
                _ => {
                    tracing::debug!("ignoring malformed thresholds file {}", path.display());
                }
            }
        }

        Map::new()
    }
}
