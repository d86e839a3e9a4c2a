//! Text replacement, emoji-to-reading conversion, and NG-word policy

use indexmap::IndexMap;
use regex::NoExpand;

/// Mask inserted in place of remove-mode NG words
pub const NG_MASK: &str = "***";

/// Built-in readings for common `:name:` emoji tokens
const BUILTIN_EMOJI_READINGS: &[(&str, &str)] = &[
    ("komochi", "こもち"),
    ("omoti", "おもち"),
    ("omochi", "おもち"),
    ("mochi", "もち"),
    ("heart", "ハート"),
    ("love", "ラブ"),
    ("smile", "スマイル"),
    ("happy", "ハッピー"),
    ("sad", "サッド"),
    ("angry", "アングリー"),
    ("laugh", "ラフ"),
    ("cry", "クライ"),
];

/// Case-insensitive global replacement of a literal search string.
fn replace_literal_ci(text: &str, search: &str, replacement: &str) -> String {
    let pattern = format!("(?i){}", regex::escape(search));
    match regex::Regex::new(&pattern) {
        Ok(re) => re.replace_all(text, NoExpand(replacement)).into_owned(),
        Err(_) => text.to_string(),
    }
}

/// Apply the free-text replacement table to `text`.
///
/// Each `(search, replacement)` pair is applied in insertion order as a
/// case-insensitive literal substring replacement; later pairs operate
/// on already-replaced text.
#[must_use]
pub fn apply_replacements(text: &str, replacements: &IndexMap<String, String>) -> String {
    if text.is_empty() || replacements.is_empty() {
        return text.to_string();
    }

    let mut result = text.to_string();
    for (search, replacement) in replacements {
        if search.trim().is_empty() {
            continue;
        }
        result = replace_literal_ci(&result, search, replacement);
    }
    result
}

/// Convert custom-emoji tokens in `text` to spoken readings.
///
/// The explicit map is applied first (case-insensitive literal replace,
/// whole surface forms like `:_omotiKomochi:`). Remaining `:word:`
/// tokens are resolved against a built-in dictionary after stripping
/// underscores; unknown tokens pass through underscore-stripped.
#[must_use]
pub fn convert_emoji_readings(text: &str, readings: &IndexMap<String, String>) -> String {
    if text.is_empty() {
        return text.to_string();
    }

    let mut result = text.to_string();
    for (emoji, reading) in readings {
        if emoji.trim().is_empty() || reading.trim().is_empty() {
            continue;
        }
        result = replace_literal_ci(&result, emoji.trim(), reading.trim());
    }

    let token_re = regex::Regex::new(r":([a-zA-Z0-9_]+):").expect("static pattern");
    token_re
        .replace_all(&result, |caps: &regex::Captures<'_>| {
            let word = caps[1]
                .trim_matches('_')
                .chars()
                .filter(|c| *c != '_')
                .collect::<String>();
            let key = word.to_lowercase();

            BUILTIN_EMOJI_READINGS
                .iter()
                .find(|(name, _)| *name == key)
                .map_or(word, |(_, reading)| (*reading).to_string())
        })
        .into_owned()
}

/// Outcome of NG-word processing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NgResult {
    /// The message must not be read aloud at all
    pub should_skip: bool,
    /// Message text with remove-mode words masked (empty when skipped)
    pub text: String,
}

/// Apply the two-mode NG-word policy to `text`.
///
/// Skip-list wins outright: if any skip word occurs (case-insensitive
/// substring), the whole message is suppressed regardless of the remove
/// list. Otherwise every remove-word occurrence is masked with [`NG_MASK`]
/// and the result trimmed.
#[must_use]
pub fn process_ng_words(text: &str, skip_words: &[String], remove_words: &[String]) -> NgResult {
    if text.is_empty() {
        return NgResult {
            should_skip: false,
            text: String::new(),
        };
    }

    let lower = text.to_lowercase();
    if let Some(matched) = skip_words
        .iter()
        .map(|w| w.trim())
        .find(|w| !w.is_empty() && lower.contains(&w.to_lowercase()))
    {
        tracing::debug!(word = matched, "skip-mode NG word, suppressing message");
        return NgResult {
            should_skip: true,
            text: String::new(),
        };
    }

    let mut processed = text.to_string();
    let mut masked = false;
    for word in remove_words {
        let word = word.trim();
        if word.is_empty() {
            continue;
        }
        let replaced = replace_literal_ci(&processed, word, NG_MASK);
        if replaced != processed {
            masked = true;
            processed = replaced;
        }
    }

    if masked {
        tracing::debug!(original = text, processed, "remove-mode NG words masked");
    }

    NgResult {
        should_skip: false,
        text: processed.trim().to_string(),
    }
}
