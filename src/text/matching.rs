//! Trigger-word, custom-emoji, and author matching

use indexmap::IndexMap;

/// Streaming bot accounts that never get read aloud or answered
const KNOWN_BOTS: &[&str] = &[
    "nightbot",
    "streamlabs",
    "moobot",
    "fossabot",
    "wizebot",
    "pretzelrocks",
    "streamelements",
];

/// Whether the author name belongs to a chat bot.
///
/// Matches a fixed set of well-known streaming bots, any name ending in
/// "bot", and any name containing "bot" with characters on both sides.
/// Case-insensitive; the set is deliberately not configurable.
#[must_use]
pub fn is_bot_author(name: &str) -> bool {
    let name = name.trim().to_lowercase();
    if name.is_empty() {
        return false;
    }

    if KNOWN_BOTS.contains(&name.as_str()) {
        return true;
    }

    if name.ends_with("bot") {
        return true;
    }

    // "bot" as an infix with at least one character on each side
    name.match_indices("bot")
        .any(|(pos, _)| pos > 0 && pos + 3 < name.len())
}

/// Whether the message mentions any of the trigger words.
///
/// Each trigger word is matched case-insensitively as a plain substring,
/// then as the custom-emoji surface forms `:w:`, `:_w:`, `:w_:` and
/// `:_w_:`, and finally via a flexible pattern that tolerates arbitrary
/// underscores around the word inside colons (`:_w_chan:` style names).
/// Word list order does not matter; the first hit wins.
#[must_use]
pub fn matches_trigger(message: &str, trigger_words: &[String]) -> bool {
    if message.is_empty() || trigger_words.is_empty() {
        return false;
    }

    let lower = message.to_lowercase();

    trigger_words.iter().any(|word| {
        let word = word.trim().to_lowercase();
        if word.is_empty() {
            return false;
        }

        if lower.contains(&word) {
            return true;
        }

        if word.contains(':') {
            return matches_emoji_token(&lower, &word);
        }

        let surface_forms = [
            format!(":{word}:"),
            format!(":_{word}:"),
            format!(":{word}_:"),
            format!(":_{word}_:"),
        ];
        if surface_forms.iter().any(|form| lower.contains(form)) {
            return true;
        }

        matches_flexible_emoji(&lower, &word)
    })
}

/// Whether the word is a complete `:name:` emoji token
#[must_use]
pub fn is_emoji_token(word: &str) -> bool {
    word.len() > 2 && word.starts_with(':') && word.ends_with(':') && !word[1..word.len() - 1].contains(':')
}

/// Match a `:name:`-form trigger against a lowercased message
fn matches_emoji_token(lower_message: &str, token: &str) -> bool {
    if lower_message.contains(token) {
        return true;
    }

    if !is_emoji_token(token) {
        return false;
    }

    let name = &token[1..token.len() - 1];
    let surface_forms = [
        format!(":{name}:"),
        format!(":_{name}:"),
        format!(":{name}_:"),
        format!(":_{name}_:"),
    ];
    if surface_forms.iter().any(|form| lower_message.contains(form)) {
        return true;
    }

    matches_flexible_emoji(lower_message, name)
}

/// Fallback for emoji names decorated with extra segments or underscores,
/// e.g. trigger "komochi" against `:_komochi_chan:`.
fn matches_flexible_emoji(lower_message: &str, name: &str) -> bool {
    let pattern = format!(":_?[^:]*{}[^:]*_?:", regex::escape(name));
    regex::RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .is_ok_and(|re| re.is_match(lower_message))
}

/// Pick the speaker id for a message from per-word overrides.
///
/// The longest matching word (case-insensitive substring) wins; equal
/// lengths are broken by map insertion order. Entries with a zero
/// speaker id are ignored. Falls back to `default` when nothing matches.
#[must_use]
pub fn resolve_word_speaker(
    message: &str,
    word_speakers: &IndexMap<String, u32>,
    default: u32,
) -> u32 {
    if message.is_empty() || word_speakers.is_empty() {
        return default;
    }

    let lower = message.to_lowercase();

    let mut words: Vec<(&String, &u32)> = word_speakers.iter().collect();
    // Stable sort keeps insertion order among equal-length words
    words.sort_by(|a, b| b.0.chars().count().cmp(&a.0.chars().count()));

    for (word, speaker) in words {
        let word = word.trim();
        if word.is_empty() || *speaker == 0 {
            continue;
        }
        if lower.contains(&word.to_lowercase()) {
            tracing::debug!(word, speaker, "word-based speaker override");
            return *speaker;
        }
    }

    default
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn known_bots_are_bots() {
        assert!(is_bot_author("Nightbot"));
        assert!(is_bot_author("StreamElements"));
        assert!(is_bot_author("  moobot  "));
    }

    #[test]
    fn bot_suffix_is_bot() {
        assert!(is_bot_author("SuperChatBot"));
        assert!(is_bot_author("bot"));
    }

    #[test]
    fn bot_infix_needs_both_sides() {
        assert!(is_bot_author("my_bot_account"));
        assert!(!is_bot_author("botty"));
        assert!(!is_bot_author(""));
    }

    #[test]
    fn regular_names_are_not_bots() {
        assert!(!is_bot_author("alice"));
        assert!(!is_bot_author("こもち"));
    }

    #[test]
    fn plain_substring_trigger() {
        assert!(matches_trigger("こもちさん、こんにちは", &words(&["こもち"])));
        assert!(matches_trigger("KOMOCHI is here", &words(&["komochi"])));
        assert!(!matches_trigger("hello there", &words(&["komochi"])));
    }

    #[test]
    fn word_order_does_not_matter() {
        assert!(matches_trigger("say komochi", &words(&["zzz", "komochi"])));
        assert!(matches_trigger("say komochi", &words(&["komochi", "zzz"])));
    }

    #[test]
    fn emoji_surface_forms_match() {
        let trigger = words(&["komochi"]);
        assert!(matches_trigger("hi :komochi:", &trigger));
        assert!(matches_trigger("hi :_komochi:", &trigger));
        assert!(matches_trigger("hi :komochi_:", &trigger));
        assert!(matches_trigger("hi :_komochi_:", &trigger));
    }

    #[test]
    fn flexible_pattern_matches_decorated_emoji() {
        assert!(matches_trigger("I love :_komochi_chan:", &words(&["komochi"])));
        assert!(matches_trigger("I love :_komochi_chan:", &words(&[":komochi:"])));
    }

    #[test]
    fn colon_form_trigger_matches_exact_token() {
        assert!(matches_trigger("wow :_omoti:", &words(&[":omoti:"])));
        assert!(!matches_trigger("wow omoti", &words(&[":omoti:"])));
    }

    #[test]
    fn empty_inputs_never_trigger() {
        assert!(!matches_trigger("", &words(&["komochi"])));
        assert!(!matches_trigger("komochi", &[]));
        assert!(!matches_trigger("komochi", &words(&["  "])));
    }

    #[test]
    fn longest_word_speaker_wins() {
        let mut map = IndexMap::new();
        map.insert("mochi".to_string(), 2);
        map.insert("komochi".to_string(), 5);

        assert_eq!(resolve_word_speaker("hi komochi", &map, 1), 5);
        assert_eq!(resolve_word_speaker("just mochi", &map, 1), 2);
        assert_eq!(resolve_word_speaker("nothing", &map, 1), 1);
    }

    #[test]
    fn equal_length_broken_by_insertion_order() {
        let mut map = IndexMap::new();
        map.insert("abc".to_string(), 3);
        map.insert("xyz".to_string(), 4);

        assert_eq!(resolve_word_speaker("abc xyz", &map, 1), 3);
    }

    #[test]
    fn zero_speaker_entries_skipped() {
        let mut map = IndexMap::new();
        map.insert("komochi".to_string(), 0);
        map.insert("mochi".to_string(), 2);

        assert_eq!(resolve_word_speaker("komochi", &map, 1), 2);
    }
}
