//! Speech engine integration
//!
//! Client for a VOICEVOX-compatible engine: two-step synthesis
//! (`/audio_query` then `/synthesis`), speaker listing, version check,
//! and the user-dictionary side-channel.

mod dictionary;
mod engine;

pub use dictionary::{DictEntry, NewDictEntry, UserDictionary, WordType};
pub use engine::{SpeakerInfo, SpeakerStyle, SpeechEngine, DEFAULT_ENGINE_URL};
