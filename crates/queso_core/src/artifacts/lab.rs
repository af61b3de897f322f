//! Interval-label codec (`.lab` files, used for chords and sections).
//!
//! One row per line: `<start> <end> <label>`, six decimal places, rows in
//! ascending start order. Labels may contain embedded spaces; everything
//! after the two numeric tokens belongs to the label.

use std::fs;
use std::path::Path;

use crate::models::IntervalLabel;

use super::{ArtifactError, ArtifactResult};

/// Encode rows into `.lab` text. Assumes rows are already normalized
/// (sorted, non-degenerate).
pub fn encode_lab(rows: &[IntervalLabel]) -> String {
    let mut out = String::new();
    for row in rows {
        out.push_str(&format!("{:.6} {:.6} {}\n", row.start, row.end, row.label));
    }
    out
}

/// Decode `.lab` text. Lines with fewer than three whitespace-delimited
/// tokens are skipped; non-numeric start/end tokens are an error.
pub fn decode_lab(content: &str) -> ArtifactResult<Vec<IntervalLabel>> {
    let mut rows = Vec::new();
    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 3 {
            continue;
        }
        let start: f64 = parts[0]
            .parse()
            .map_err(|_| ArtifactError::parse("interval start", parts[0]))?;
        let end: f64 = parts[1]
            .parse()
            .map_err(|_| ArtifactError::parse("interval end", parts[1]))?;
        rows.push(IntervalLabel::new(start, end, parts[2..].join(" ")));
    }
    Ok(rows)
}

/// Write rows to a `.lab` file.
pub fn write_lab(path: &Path, rows: &[IntervalLabel]) -> ArtifactResult<()> {
    fs::write(path, encode_lab(rows))
        .map_err(|e| ArtifactError::io(format!("write {}", path.display()), e))
}

/// Read rows from a `.lab` file.
pub fn read_lab(path: &Path) -> ArtifactResult<Vec<IntervalLabel>> {
    let content = fs::read_to_string(path)
        .map_err(|e| ArtifactError::io(format!("read {}", path.display()), e))?;
    decode_lab(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::normalize_intervals;

    #[test]
    fn lab_round_trip_preserves_values() {
        let rows = vec![
            IntervalLabel::new(0.0, 2.5, "C:maj"),
            IntervalLabel::new(2.5, 4.123456, "G:maj"),
        ];

        let decoded = decode_lab(&encode_lab(&rows)).unwrap();
        assert_eq!(decoded.len(), 2);
        for (a, b) in rows.iter().zip(&decoded) {
            assert!((a.start - b.start).abs() < 1e-6);
            assert!((a.end - b.end).abs() < 1e-6);
            assert_eq!(a.label, b.label);
        }
    }

    #[test]
    fn labels_with_spaces_survive() {
        let rows = vec![IntervalLabel::new(0.0, 10.0, "Verse 1 (quiet)")];
        let decoded = decode_lab(&encode_lab(&rows)).unwrap();
        assert_eq!(decoded[0].label, "Verse 1 (quiet)");
    }

    #[test]
    fn degenerate_rows_normalize_before_encode() {
        let rows = normalize_intervals(vec![IntervalLabel::new(1.0, 1.0, "A")]);
        let decoded = decode_lab(&encode_lab(&rows)).unwrap();
        assert!(decoded[0].end > decoded[0].start);
    }

    #[test]
    fn short_lines_are_skipped() {
        let decoded = decode_lab("0.0 Intro\n1.0 2.0 Verse\n\n").unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].label, "Verse");
    }

    #[test]
    fn bad_numbers_are_an_error() {
        assert!(decode_lab("zero one Verse").is_err());
    }
}
