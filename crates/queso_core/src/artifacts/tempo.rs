//! Tempo grid codec (`tempo.json`).

use std::fs;
use std::path::Path;

use crate::models::TempoGrid;

use super::{ArtifactError, ArtifactResult};

/// Write a tempo grid as `{"bpm": ..., "beat_times": [...]}`.
pub fn write_tempo(path: &Path, grid: &TempoGrid) -> ArtifactResult<()> {
    let json = serde_json::to_string(grid)
        .map_err(|e| ArtifactError::parse("tempo grid", e.to_string()))?;
    fs::write(path, json).map_err(|e| ArtifactError::io(format!("write {}", path.display()), e))
}

/// Read a tempo grid back. Missing keys decode to zero/empty, matching
/// what downstream consumers tolerate.
pub fn read_tempo(path: &Path) -> ArtifactResult<TempoGrid> {
    let content = fs::read_to_string(path)
        .map_err(|e| ArtifactError::io(format!("read {}", path.display()), e))?;
    serde_json::from_str(&content)
        .map_err(|e| ArtifactError::parse(format!("{}", path.display()), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn tempo_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tempo.json");

        let grid = TempoGrid::new(121.5, vec![0.0, 0.5, 1.0]);
        write_tempo(&path, &grid).unwrap();

        let back = read_tempo(&path).unwrap();
        assert_eq!(back, grid);
    }

    #[test]
    fn missing_keys_decode_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tempo.json");
        std::fs::write(&path, "{}").unwrap();

        let grid = read_tempo(&path).unwrap();
        assert_eq!(grid.bpm, 0.0);
        assert!(grid.beat_times.is_empty());
    }
}
