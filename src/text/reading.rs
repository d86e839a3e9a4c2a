//! Reading-text composition
//!
//! Turns a raw chat message plus per-call options into the literal
//! string handed to the speech engine. Pure; callable without the
//! pipeline for testing.

use indexmap::IndexMap;

use super::replace::{apply_replacements, convert_emoji_readings, process_ng_words};

/// Per-invocation options for composing a reading
#[derive(Debug, Clone, Default)]
pub struct ReadingOptions {
    /// Prepend the author name as an address prefix
    pub read_user_name: bool,

    /// NG words that suppress the whole message
    pub ng_words_skip: Vec<String>,

    /// NG words masked out of the message
    pub ng_words_remove: Vec<String>,

    /// Exact-match author name to pronunciation overrides
    pub name_pronunciations: IndexMap<String, String>,

    /// Free-text replacement table, applied in insertion order
    pub text_replacements: IndexMap<String, String>,

    /// Explicit emoji surface form to reading overrides
    pub emoji_readings: IndexMap<String, String>,
}

/// Compose the text to be spoken for a chat message.
///
/// Returns an empty string when the message must not be read at all
/// (skip-mode NG word, or nothing left after processing).
#[must_use]
pub fn compose_reading_text(author: &str, message: &str, options: &ReadingOptions) -> String {
    let ng = process_ng_words(message, &options.ng_words_skip, &options.ng_words_remove);
    if ng.should_skip {
        return String::new();
    }

    let mut reading = String::new();

    if options.read_user_name && !author.is_empty() {
        let spoken_name = options
            .name_pronunciations
            .get(author)
            .map_or(author, String::as_str);
        reading.push_str(spoken_name);
        reading.push_str("さん、");
    }

    if !ng.text.is_empty() {
        let replaced = apply_replacements(&ng.text, &options.text_replacements);
        reading.push_str(&convert_emoji_readings(&replaced, &options.emoji_readings));
    }

    reading.trim().to_string()
}
