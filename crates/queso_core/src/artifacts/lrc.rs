//! Timed-text codecs: line-level LRC and the word-level LRC side artifact.
//!
//! Line format is `[MM:SS.ss] text` with zero-padded minutes and fixed
//! two-decimal seconds. The word-level variant keeps one line per lyric
//! line, prefixed by the line anchor and carrying a `<MM:SS.ss>` marker
//! before each word token. Word timing is derived opportunistically from
//! richer transcription output when the backend left any behind.

use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::models::{TimedTextCue, WordCue, WordLineCue};

use super::srt::parse_srt;
use super::{ArtifactError, ArtifactResult, LYRICS_FILE, SUBTITLES_FILE, WORD_LRC_FILE};

/// Candidate files, tried in order, for word-level timing data.
const WORD_SOURCE_CANDIDATES: [&str; 3] = ["whisper.json", "lyrics.words.json", "lyrics.json"];

/// Render a timestamp as `MM:SS.ss` (no brackets).
pub fn format_lrc_timestamp(time: f64) -> String {
    let minutes = (time / 60.0).floor() as i64;
    let seconds = time - minutes as f64 * 60.0;
    format!("{minutes:02}:{seconds:05.2}")
}

/// Encode cues into LRC text.
pub fn encode_lrc(rows: &[TimedTextCue]) -> String {
    let mut out = String::new();
    for row in rows {
        out.push_str(&format!("[{}] {}\n", format_lrc_timestamp(row.time), row.text));
    }
    out
}

/// Decode LRC text. Lines without a `]` (or with an unparsable timestamp)
/// are skipped.
pub fn decode_lrc(content: &str) -> Vec<TimedTextCue> {
    let mut rows = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        let Some((stamp, text)) = line.split_once(']') else {
            continue;
        };
        let stamp = stamp.trim_start_matches('[');
        let Some((minutes, seconds)) = stamp.split_once(':') else {
            continue;
        };
        let (Ok(minutes), Ok(seconds)) = (minutes.parse::<i64>(), seconds.parse::<f64>()) else {
            continue;
        };
        rows.push(TimedTextCue::new(
            minutes as f64 * 60.0 + seconds,
            text.trim(),
        ));
    }
    rows
}

/// Write cues to an LRC file.
pub fn write_lrc(path: &Path, rows: &[TimedTextCue]) -> ArtifactResult<()> {
    fs::write(path, encode_lrc(rows))
        .map_err(|e| ArtifactError::io(format!("write {}", path.display()), e))
}

/// Read lyric cues from the output directory: `lyrics.lrc` first, then the
/// subtitle file as the alternate source. Missing both yields an empty set.
pub fn read_lyrics(out_dir: &Path) -> ArtifactResult<Vec<TimedTextCue>> {
    let lrc = out_dir.join(LYRICS_FILE);
    if lrc.exists() {
        let content = fs::read_to_string(&lrc)
            .map_err(|e| ArtifactError::io(format!("read {}", lrc.display()), e))?;
        return Ok(decode_lrc(&content));
    }

    let srt = out_dir.join(SUBTITLES_FILE);
    if srt.exists() {
        let content = fs::read_to_string(&srt)
            .map_err(|e| ArtifactError::io(format!("read {}", srt.display()), e))?;
        return Ok(parse_srt(&content));
    }

    Ok(Vec::new())
}

/// Encode word-level lines. Lines without word timing fall back to the
/// plain `[MM:SS.ss] text` form.
pub fn encode_word_lrc(lines: &[WordLineCue]) -> String {
    let mut out = String::new();
    for line in lines {
        if line.words.is_empty() {
            out.push_str(&format!(
                "[{}] {}\n",
                format_lrc_timestamp(line.time),
                line.text
            ));
            continue;
        }

        let parts: Vec<String> = line
            .words
            .iter()
            .map(|w| format!("<{}>{}", format_lrc_timestamp(w.time), w.token))
            .collect();
        out.push_str(&format!(
            "[{}] {}\n",
            format_lrc_timestamp(line.time),
            parts.join(" ")
        ));
    }
    out
}

/// Try to derive `lyrics.word.lrc` from richer transcription output left
/// in the output directory. Returns `true` when the file was written.
///
/// Every failure along the way (no candidate file, malformed JSON, no
/// usable segments) is a silent fallback: no file is produced and the run
/// continues with line-level lyrics only.
pub fn try_write_word_lrc(out_dir: &Path) -> bool {
    for candidate in WORD_SOURCE_CANDIDATES {
        let path = out_dir.join(candidate);
        if !path.exists() {
            continue;
        }
        let Ok(content) = fs::read_to_string(&path) else {
            continue;
        };
        let Ok(data) = serde_json::from_str::<Value>(&content) else {
            tracing::debug!("skipping malformed word source {}", path.display());
            continue;
        };

        let lines = extract_word_lines(&data);
        if lines.is_empty() {
            continue;
        }

        let target = out_dir.join(WORD_LRC_FILE);
        match fs::write(&target, encode_word_lrc(&lines)) {
            Ok(()) => return true,
            Err(e) => {
                tracing::warn!("failed to write {}: {}", target.display(), e);
                return false;
            }
        }
    }
    false
}

/// Pull word-level lines out of a whisper-style JSON document:
/// `{"segments": [{"start": .., "text": .., "words": [{"start", "word"}]}]}`.
fn extract_word_lines(data: &Value) -> Vec<WordLineCue> {
    let Some(segments) = data.get("segments").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut lines = Vec::new();
    for segment in segments {
        let seg_start = segment.get("start").and_then(Value::as_f64).unwrap_or(0.0);
        let words = segment.get("words").and_then(Value::as_array);

        match words {
            Some(words) if !words.is_empty() => {
                let cues: Vec<WordCue> = words
                    .iter()
                    .filter_map(|w| {
                        let token = w.get("word")?.as_str()?.trim().to_string();
                        let time = w.get("start").and_then(Value::as_f64).unwrap_or(seg_start);
                        Some(WordCue { time, token })
                    })
                    .collect();
                if cues.is_empty() {
                    continue;
                }
                let anchor = cues[0].time;
                lines.push(WordLineCue {
                    time: anchor,
                    text: String::new(),
                    words: cues,
                });
            }
            _ => {
                let text = segment
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .trim()
                    .to_string();
                lines.push(WordLineCue {
                    time: seg_start,
                    text,
                    words: Vec::new(),
                });
            }
        }
    }
    lines
}
