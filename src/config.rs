//! Configuration loading and validation
//!
//! Settings come from a TOML file (platform config dir or an explicit
//! path), with every section optional and defaulted. [`Config::validate`]
//! rejects out-of-range values up front so bad settings fail at startup
//! rather than mid-stream.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use indexmap::IndexMap;
use serde::Deserialize;

use crate::spam::SpamConfig;
use crate::text::ReadingOptions;
use crate::voice::DEFAULT_ENGINE_URL;
use crate::{Error, Result};

/// Speech engine settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine base URL
    pub url: String,
    /// Style id used when no word override matches
    pub default_speaker: u32,
    /// Playback volume scale, valid range 0.0 to 1.0
    pub volume: Option<f64>,
    /// Speech speed scale, valid range 0.5 to 2.0
    pub speed: Option<f64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_ENGINE_URL.to_string(),
            default_speaker: 1,
            volume: None,
            speed: None,
        }
    }
}

/// Chat-completion settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// API key; empty disables reply generation with a visible fallback
    pub api_key: String,
    /// Model name
    pub model: String,
    /// Reply length cap
    pub max_tokens: u32,
    /// Sampling temperature, valid range 0.0 to 2.0
    pub temperature: f64,
    /// Whether generated replies are also spoken
    pub speak_replies: bool,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 150,
            temperature: 0.8,
            speak_replies: true,
        }
    }
}

/// The persona that replies in chat
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    /// Display name, also the default trigger word
    pub name: String,
    /// Free-text personality appended to the system prompt
    pub personality: String,
    /// Style id the persona's replies are spoken with
    pub speaker_id: u32,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            name: "こもち".to_string(),
            personality: String::new(),
            speaker_id: 1,
        }
    }
}

/// Reading composition settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReadingConfig {
    /// Read admitted chat messages aloud; off means reply-only mode
    pub read_all_chats: bool,
    /// Prefix readings with the author name
    pub read_user_name: bool,
    /// NG words that drop the whole message
    pub ng_words_skip: Vec<String>,
    /// NG words masked out of the reading
    pub ng_words_remove: Vec<String>,
    /// Author name to spoken pronunciation
    pub pronunciations: IndexMap<String, String>,
    /// Literal text replacements, applied in order
    pub replacements: IndexMap<String, String>,
    /// Custom emoji token readings, merged over the built-ins
    pub emoji_readings: IndexMap<String, String>,
}

impl Default for ReadingConfig {
    fn default() -> Self {
        Self {
            read_all_chats: true,
            read_user_name: true,
            ng_words_skip: Vec::new(),
            ng_words_remove: Vec::new(),
            pronunciations: IndexMap::new(),
            replacements: IndexMap::new(),
            emoji_readings: IndexMap::new(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub completion: CompletionConfig,
    pub persona: PersonaConfig,
    pub reading: ReadingConfig,
    pub spam: SpamConfig,
    /// Words that trigger a reply; defaults to the persona name
    pub trigger_words: Vec<String>,
    /// Words spoken with a specific style id instead of the default
    pub word_speakers: IndexMap<String, u32>,
}

impl Config {
    /// Platform default config path (`…/komochi/config.toml`)
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "komochi").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load configuration.
    ///
    /// An explicit `path` must exist; with no path the platform default
    /// is used if present, otherwise built-in defaults apply.
    ///
    /// # Errors
    ///
    /// Returns error when the file cannot be read or parsed, or when a
    /// value fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(default) if default.exists() => Self::from_file(&default)?,
                _ => {
                    tracing::debug!("no config file found, using defaults");
                    Self::default()
                }
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        tracing::info!(path = %path.display(), "loading config");
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// Check every value is in range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first offending field
    pub fn validate(&self) -> Result<()> {
        if self.persona.name.trim().is_empty() {
            return Err(Error::Config("persona.name must not be empty".to_string()));
        }
        if let Some(volume) = self.engine.volume {
            if !(0.0..=1.0).contains(&volume) {
                return Err(Error::Config(format!(
                    "engine.volume must be within 0.0 and 1.0, got {volume}"
                )));
            }
        }
        if let Some(speed) = self.engine.speed {
            if !(0.5..=2.0).contains(&speed) {
                return Err(Error::Config(format!(
                    "engine.speed must be within 0.5 and 2.0, got {speed}"
                )));
            }
        }
        if self.completion.max_tokens == 0 {
            return Err(Error::Config(
                "completion.max_tokens must be positive".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.completion.temperature) {
            return Err(Error::Config(format!(
                "completion.temperature must be within 0.0 and 2.0, got {}",
                self.completion.temperature
            )));
        }
        if !(0.0..=1.0).contains(&self.spam.duplicate_threshold) {
            return Err(Error::Config(format!(
                "spam.duplicate_threshold must be within 0.0 and 1.0, got {}",
                self.spam.duplicate_threshold
            )));
        }
        if self.spam.max_messages_per_minute == 0 || self.spam.max_messages_per_five_minutes == 0 {
            return Err(Error::Config(
                "spam message limits must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Trigger words, falling back to the persona name when unset
    #[must_use]
    pub fn trigger_words(&self) -> Vec<String> {
        if self.trigger_words.is_empty() {
            vec![self.persona.name.clone()]
        } else {
            self.trigger_words.clone()
        }
    }

    /// Reading composition options derived from this config
    #[must_use]
    pub fn reading_options(&self) -> ReadingOptions {
        ReadingOptions {
            read_user_name: self.reading.read_user_name,
            ng_words_skip: self.reading.ng_words_skip.clone(),
            ng_words_remove: self.reading.ng_words_remove.clone(),
            name_pronunciations: self.reading.pronunciations.clone(),
            text_replacements: self.reading.replacements.clone(),
            emoji_readings: self.reading.emoji_readings.clone(),
        }
    }
}
