//! Engine user-dictionary side-channel
//!
//! Thin pass-through to the engine's pronunciation lexicon: add, list,
//! and delete word entries so the persona reads stream-specific names
//! correctly.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use uuid::Uuid;

use super::engine::{call_error, check_status};
use crate::audio::SynthesisError;
use crate::retry::{with_retry, RetryPolicy};
use crate::{Error, Result};

const DICT_TIMEOUT: Duration = Duration::from_secs(10);

/// Part of speech accepted by the engine lexicon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WordType {
    ProperNoun,
    CommonNoun,
    Verb,
    Adjective,
    Suffix,
}

impl WordType {
    /// Engine API identifier
    #[must_use]
    pub fn as_api_str(self) -> &'static str {
        match self {
            Self::ProperNoun => "PROPER_NOUN",
            Self::CommonNoun => "COMMON_NOUN",
            Self::Verb => "VERB",
            Self::Adjective => "ADJECTIVE",
            Self::Suffix => "SUFFIX",
        }
    }

    /// Resolve a UI label (Japanese or API form) to a word type.
    ///
    /// Unknown labels fall back to a common noun, matching the engine's
    /// own default.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label {
            "固有名詞" | "PROPER_NOUN" => Self::ProperNoun,
            "動詞" | "VERB" => Self::Verb,
            "形容詞" | "ADJECTIVE" => Self::Adjective,
            "語尾" | "SUFFIX" => Self::Suffix,
            _ => Self::CommonNoun,
        }
    }
}

/// A word to register in the lexicon
#[derive(Debug, Clone)]
pub struct NewDictEntry {
    /// Written surface form
    pub surface: String,
    /// Reading (katakana expected by the engine)
    pub reading: String,
    /// Part of speech
    pub word_type: WordType,
}

/// A registered lexicon entry
#[derive(Debug, Clone)]
pub struct DictEntry {
    /// Entry id assigned by the engine
    pub uuid: Uuid,
    /// Written surface form
    pub surface: String,
    /// Reading
    pub reading: String,
    /// Part of speech as reported by the engine
    pub part_of_speech: String,
}

#[derive(Debug, Deserialize)]
struct RawDictEntry {
    surface: String,
    pronunciation: String,
    #[serde(default)]
    part_of_speech: String,
}

/// Client for the engine's user dictionary
#[derive(Debug, Clone)]
pub struct UserDictionary {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl UserDictionary {
    /// Create a dictionary client for the engine at `base_url`
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            retry: RetryPolicy::default(),
        }
    }

    /// Register a word, returning the entry id assigned by the engine.
    ///
    /// # Errors
    ///
    /// Returns error when the surface form or reading is empty, or when
    /// the engine rejects the entry after retries.
    pub async fn add_word(&self, entry: &NewDictEntry) -> Result<Uuid> {
        let surface = entry.surface.trim();
        let reading = entry.reading.trim();
        if surface.is_empty() || reading.is_empty() {
            return Err(Error::Dictionary(
                "surface form and reading must not be empty".to_string(),
            ));
        }

        if !is_katakana(reading) {
            tracing::warn!(reading, "dictionary reading is not katakana");
        }

        tracing::info!(
            surface,
            reading,
            word_type = entry.word_type.as_api_str(),
            "adding dictionary entry"
        );

        let url = format!(
            "{}/user_dict_word?surface={}&pronunciation={}&accent_type=1&word_type={}&priority=5",
            self.base_url,
            urlencoding::encode(surface),
            urlencoding::encode(reading),
            entry.word_type.as_api_str()
        );

        let uuid: String = with_retry(&self.retry, SynthesisError::is_transient, || async {
            let response = self
                .client
                .post(&url)
                .timeout(DICT_TIMEOUT)
                .send()
                .await
                .map_err(call_error)?;

            let response = check_status(response)?;
            response
                .json()
                .await
                .map_err(|e| SynthesisError::Other(e.to_string()))
        })
        .await
        .map_err(|e| Error::Dictionary(format!("failed to add entry: {e}")))?;

        Uuid::parse_str(&uuid)
            .map_err(|e| Error::Dictionary(format!("engine returned malformed uuid: {e}")))
    }

    /// List all registered entries.
    ///
    /// # Errors
    ///
    /// Returns error if the engine cannot be reached after retries
    pub async fn list_words(&self) -> Result<Vec<DictEntry>> {
        let raw: HashMap<Uuid, RawDictEntry> =
            with_retry(&self.retry, SynthesisError::is_transient, || async {
                let response = self
                    .client
                    .get(format!("{}/user_dict", self.base_url))
                    .timeout(DICT_TIMEOUT)
                    .send()
                    .await
                    .map_err(call_error)?;

                let response = check_status(response)?;
                response
                    .json()
                    .await
                    .map_err(|e| SynthesisError::Other(e.to_string()))
            })
            .await
            .map_err(|e| Error::Dictionary(format!("failed to list entries: {e}")))?;

        Ok(raw
            .into_iter()
            .map(|(uuid, entry)| DictEntry {
                uuid,
                surface: entry.surface,
                reading: entry.pronunciation,
                part_of_speech: entry.part_of_speech,
            })
            .collect())
    }

    /// Delete an entry by id.
    ///
    /// # Errors
    ///
    /// Returns error if the engine rejects the deletion after retries
    pub async fn delete_word(&self, uuid: Uuid) -> Result<()> {
        tracing::info!(%uuid, "deleting dictionary entry");

        with_retry(&self.retry, SynthesisError::is_transient, || async {
            let response = self
                .client
                .delete(format!(
                    "{}/user_dict_word?word_uuid={uuid}",
                    self.base_url
                ))
                .timeout(DICT_TIMEOUT)
                .send()
                .await
                .map_err(call_error)?;

            check_status(response).map(|_| ())
        })
        .await
        .map_err(|e| Error::Dictionary(format!("failed to delete entry: {e}")))
    }
}

/// Whether the reading consists only of katakana (and the long vowel mark)
fn is_katakana(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| ('ァ'..='ヶ').contains(&c) || c == 'ー')
}
