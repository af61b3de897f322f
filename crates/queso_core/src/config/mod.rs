//! Layered options loading.
//!
//! The options payload handed to a run is the shallow merge of three
//! layers, weakest first: the default config file, the primary config
//! file, and the caller's explicit payload (an inline JSON object or a
//! path to one). The file layers are optional tuning data: a missing or
//! malformed file is skipped with a warning rather than blocking the run.
//! The explicit payload is a direct instruction and parse failures there
//! are errors.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use thiserror::Error;

/// Primary config file, looked up in the working directory.
pub const PRIMARY_CONFIG_FILE: &str = "queso.config.json";

/// Default config file, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "queso.defaults.json";

/// Errors from the explicit options payload.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read options file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse options payload: {0}")]
    Parse(String),

    #[error("Options payload must be a JSON object")]
    NotAnObject,
}

/// Result type for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Merge the configured layers into one options map.
///
/// `explicit` is either inline JSON (first non-space character `{`) or a
/// path to a JSON file.
pub fn load_layered(explicit: Option<&str>) -> ConfigResult<Map<String, Value>> {
    load_layered_from(Path::new("."), explicit)
}

/// Same as [`load_layered`] with an explicit base directory for the
/// optional config files.
pub fn load_layered_from(base: &Path, explicit: Option<&str>) -> ConfigResult<Map<String, Value>> {
    let mut merged = Map::new();

    for name in [DEFAULT_CONFIG_FILE, PRIMARY_CONFIG_FILE] {
        merge_optional_file(&mut merged, &base.join(name));
    }

    if let Some(raw) = explicit {
        let overlay = parse_payload(raw)?;
        for (key, value) in overlay {
            merged.insert(key, value);
        }
    }

    Ok(merged)
}

/// Parse an explicit options payload: an inline JSON object, or a path to
/// a file containing one.
pub fn parse_payload(raw: &str) -> ConfigResult<Map<String, Value>> {
    let trimmed = raw.trim();
    let content = if trimmed.starts_with('{') {
        trimmed.to_string()
    } else {
        let path = PathBuf::from(trimmed);
        fs::read_to_string(&path).map_err(|source| ConfigError::Read { path, source })?
    };

    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ConfigError::NotAnObject),
        Err(e) => Err(ConfigError::Parse(e.to_string())),
    }
}

/// Merge one optional config file into the accumulator. Malformed or
/// unreadable files are skipped; optional tuning data never fails a run.
fn merge_optional_file(merged: &mut Map<String, Value>, path: &Path) {
    if !path.exists() {
        return;
    }
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!("skipping unreadable config {}: {}", path.display(), e);
            return;
        }
    };
    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(map)) => {
            for (key, value) in map {
                merged.insert(key, value);
            }
        }
        Ok(_) => tracing::warn!("skipping non-object config {}", path.display()),
        Err(e) => tracing::warn!("skipping malformed config {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn explicit_overrides_files() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(DEFAULT_CONFIG_FILE),
            r#"{"max_sections": 5, "chord_enharmonic": "flat"}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join(PRIMARY_CONFIG_FILE),
            r#"{"max_sections": 6}"#,
        )
        .unwrap();

        let merged =
            load_layered_from(dir.path(), Some(r#"{"max_sections": 9}"#)).unwrap();

        assert_eq!(merged.get("max_sections").unwrap(), 9);
        // Untouched keys survive from the weaker layer.
        assert_eq!(merged.get("chord_enharmonic").unwrap(), "flat");
    }

    #[test]
    fn malformed_file_layer_is_skipped() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(PRIMARY_CONFIG_FILE), "{broken").unwrap();

        let merged = load_layered_from(dir.path(), Some(r#"{"debug": true}"#)).unwrap();
        assert_eq!(merged.get("debug").unwrap(), &json!(true));
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn payload_can_be_a_path() {
        let dir = tempdir().unwrap();
        let opts_path = dir.path().join("my_opts.json");
        fs::write(&opts_path, r#"{"adapter_mode": "command"}"#).unwrap();

        let merged =
            load_layered_from(dir.path(), Some(opts_path.to_str().unwrap())).unwrap();
        assert_eq!(merged.get("adapter_mode").unwrap(), "command");
    }

    #[test]
    fn malformed_explicit_payload_is_an_error() {
        assert!(load_layered_from(Path::new("."), Some("{broken")).is_err());
        assert!(load_layered_from(Path::new("."), Some("[1,2,3]")).is_err());
    }

    #[test]
    fn missing_payload_path_is_an_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(load_layered_from(dir.path(), Some(missing.to_str().unwrap())).is_err());
    }

    #[test]
    fn empty_layers_merge_to_empty() {
        let dir = tempdir().unwrap();
        let merged = load_layered_from(dir.path(), None).unwrap();
        assert!(merged.is_empty());
    }
}
