//! SubRip (`.srt`) reader, used as the fallback lyric source.
//!
//! Blocks are separated by blank lines:
//! ```text
//! 1
//! 00:00:01,000 --> 00:00:02,500
//! Hello world
//! ```
//! Only the start time of each block matters here; the block's text lines
//! are joined with spaces into one cue.

use crate::models::TimedTextCue;

/// Parse SRT content into timed text cues. Malformed blocks are skipped.
pub fn parse_srt(content: &str) -> Vec<TimedTextCue> {
    let content = content.replace("\r\n", "\n").replace('\r', "\n");
    let mut cues = Vec::new();

    for block in content.split("\n\n") {
        let lines: Vec<&str> = block
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        if lines.len() < 2 {
            continue;
        }

        // The timing line may or may not be preceded by an index number.
        let Some(timing_idx) = lines.iter().position(|l| l.contains("-->")) else {
            continue;
        };
        let Some(start) = parse_block_start(lines[timing_idx]) else {
            continue;
        };

        let text = lines[timing_idx + 1..].join(" ");
        if !text.is_empty() {
            cues.push(TimedTextCue::new(start, text));
        }
    }

    cues
}

/// Parse the start half of `HH:MM:SS,mmm --> HH:MM:SS,mmm`, in seconds.
fn parse_block_start(line: &str) -> Option<f64> {
    let start_part = line.split("-->").next()?.trim();
    parse_srt_time(start_part)
}

/// Parse an SRT timestamp (`HH:MM:SS,mmm`, comma or period) to seconds.
pub(crate) fn parse_srt_time(s: &str) -> Option<f64> {
    let s = s.trim().replace(',', ".");
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 3 {
        return None;
    }

    let hours: f64 = parts[0].parse().ok()?;
    let minutes: f64 = parts[1].parse().ok()?;
    let seconds: f64 = parts[2].parse().ok()?;

    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn srt_time_parses_to_seconds() {
        assert!((parse_srt_time("00:00:01,000").unwrap() - 1.0).abs() < 1e-9);
        assert!((parse_srt_time("00:01:02,500").unwrap() - 62.5).abs() < 1e-9);
        assert!((parse_srt_time("01:00:00.250").unwrap() - 3600.25).abs() < 1e-9);
        assert!(parse_srt_time("not a time").is_none());
    }

    #[test]
    fn blocks_parse_with_joined_text() {
        let content = "1\n00:00:01,000 --> 00:00:02,500\nHello\nworld\n\n2\n00:00:05,000 --> 00:00:06,000\nSecond\n";
        let cues = parse_srt(content);

        assert_eq!(cues.len(), 2);
        assert!((cues[0].time - 1.0).abs() < 1e-9);
        assert_eq!(cues[0].text, "Hello world");
        assert_eq!(cues[1].text, "Second");
    }

    #[test]
    fn index_line_is_optional() {
        let content = "00:00:01,000 --> 00:00:02,000\nNo index here\n";
        let cues = parse_srt(content);
        assert_eq!(cues.len(), 1);
    }

    #[test]
    fn malformed_blocks_are_skipped() {
        let content = "garbage\n\n1\nnot a timing line\ntext\n\n2\n00:00:03,000 --> 00:00:04,000\nKept\n";
        let cues = parse_srt(content);
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].text, "Kept");
    }
}
