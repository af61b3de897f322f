//! Chord label canonicalization.
//!
//! Backends disagree on chord spelling: `Db` vs `C#`, `m` vs `min` vs
//! `minor`, stray case. Every chord label that reaches an artifact file is
//! first rendered into one canonical form, `<root>:<quality>` (or a bare
//! root when the quality is empty), under a configurable enharmonic
//! preference.

use serde::{Deserialize, Serialize};

/// Which spelling wins for the seven enharmonically ambiguous pitch classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Enharmonic {
    /// Prefer sharps: `Db` becomes `C#`.
    #[default]
    Sharp,
    /// Prefer flats: `C#` becomes `Db`.
    Flat,
}

impl Enharmonic {
    /// Parse the `chord_enharmonic` option value, defaulting to sharp.
    pub fn from_option(value: &str) -> Self {
        if value.eq_ignore_ascii_case("flat") {
            Enharmonic::Flat
        } else {
            Enharmonic::Sharp
        }
    }
}

/// Remaps applied under sharp preference.
const SHARP_PREFERRED: [(&str, &str); 7] = [
    ("Cb", "B"),
    ("Db", "C#"),
    ("Eb", "D#"),
    ("Fb", "E"),
    ("Gb", "F#"),
    ("Ab", "G#"),
    ("Bb", "A#"),
];

/// Remaps applied under flat preference.
const FLAT_PREFERRED: [(&str, &str); 7] = [
    ("B#", "C"),
    ("C#", "Db"),
    ("D#", "Eb"),
    ("E#", "F"),
    ("F#", "Gb"),
    ("G#", "Ab"),
    ("A#", "Bb"),
];

/// Quality synonyms, longest first so `major` wins over `maj` and
/// `minor`/`min` win over bare `m`. Trailing extension text (added tones,
/// alterations) is preserved verbatim.
const QUALITY_SYNONYMS: [(&str, &str); 9] = [
    ("major", "maj"),
    ("minor", "min"),
    ("sus2", "sus2"),
    ("sus4", "sus4"),
    ("maj", "maj"),
    ("min", "min"),
    ("dim", "dim"),
    ("aug", "aug"),
    ("m", "min"),
];

/// Canonicalize a root token: uppercase, strip stray `m`/`M` garbage
/// (e.g. a backend emitting `Am` as the root), collapse the accidental to
/// a single `#`/`b`, then apply the enharmonic preference.
fn canon_root(root: &str, enharmonic: Enharmonic) -> String {
    let cleaned: String = root
        .trim()
        .chars()
        .map(|c| c.to_ascii_uppercase())
        .filter(|c| *c != 'M')
        .collect();

    let mut chars = cleaned.chars();
    let mut out = String::new();
    if let Some(first) = chars.next() {
        out.push(first);
        match chars.next() {
            Some('#') => out.push('#'),
            Some('B') => out.push('b'),
            _ => {}
        }
    }

    let table = match enharmonic {
        Enharmonic::Sharp => &SHARP_PREFERRED,
        Enharmonic::Flat => &FLAT_PREFERRED,
    };
    for &(from, to) in table {
        if out == from {
            return to.to_string();
        }
    }
    out
}

/// Map a lowercased quality token through the synonym table, keeping any
/// trailing extension text unchanged.
fn canon_quality(quality: &str) -> String {
    for (synonym, canonical) in QUALITY_SYNONYMS {
        if let Some(rest) = quality.strip_prefix(synonym) {
            return format!("{canonical}{rest}");
        }
    }
    quality.to_string()
}

/// Canonicalize a chord label into `<root>:<quality>` form.
///
/// The root/quality split uses an explicit `:` delimiter when present;
/// otherwise the root is inferred as two characters when the second
/// character is an accidental marker (`#`, `b`, `B`), else one. The result
/// is stable: canonicalizing an already-canonical label returns it
/// unchanged.
pub fn canonicalize_chord_label(label: &str, enharmonic: Enharmonic) -> String {
    let label = label.trim();
    if label.is_empty() {
        return String::new();
    }

    let (root, quality) = match label.split_once(':') {
        Some((left, right)) => (canon_root(left, enharmonic), right.trim().to_lowercase()),
        None => {
            let chars: Vec<char> = label.chars().collect();
            let root_len = if chars.len() > 1 && matches!(chars[1], '#' | 'b' | 'B') {
                2
            } else {
                1
            };
            let root: String = chars[..root_len].iter().collect();
            let rest: String = chars[root_len..].iter().collect();
            (
                canon_root(&root, enharmonic),
                rest.trim().to_lowercase(),
            )
        }
    };

    let quality = canon_quality(&quality);
    if quality.is_empty() {
        root
    } else {
        format!("{root}:{quality}")
    }
}
