//! Text normalization and matching utilities
//!
//! Pure functions shared by the admission filter and the message
//! pipeline: trigger/emoji matching, NG-word policy, replacement
//! tables, and similarity scoring.

mod matching;
mod reading;
mod replace;
mod similarity;

pub use matching::{is_bot_author, is_emoji_token, matches_trigger, resolve_word_speaker};
pub use reading::{compose_reading_text, ReadingOptions};
pub use replace::{apply_replacements, convert_emoji_readings, process_ng_words, NgResult, NG_MASK};
pub use similarity::similarity;
