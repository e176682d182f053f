use std::sync::LazyLock;

use regex::Regex;

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

// Comma, or `ft`/`ft.`/`feat`/`feat.` with whitespace on both sides.
static SEPARATORS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\s*,\s*|\s+(?:feat|ft)\.?\s+").ok());

/// Split a multi-artist tag value into individual names.
///
/// This is a best-effort heuristic: a name that itself contains a standalone
/// `ft`/`feat` word (e.g. "The Ft Collective") is split as well.
pub fn split_artists(raw: &str) -> Vec<String> {
    let parts: Vec<&str> = match SEPARATORS.as_ref() {
        Some(re) => re.split(raw).collect(),
        None => vec![raw],
    };
    parts
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Split every raw value and union the results, keeping first-seen order.
/// Falls back to [`UNKNOWN_ARTIST`] when nothing usable remains.
pub fn normalize_artists<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in raw {
        for name in split_artists(value.as_ref()) {
            if !out.contains(&name) {
                out.push(name);
            }
        }
    }
    if out.is_empty() {
        out.push(UNKNOWN_ARTIST.to_string());
    }
    out
}
