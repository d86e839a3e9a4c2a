//! VOICEVOX-compatible speech engine client

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::audio::{SpeechRequest, SynthesisError, Synthesizer};
use crate::retry::{with_retry, RetryPolicy};
use crate::{Error, Result};

/// Default local engine endpoint
pub const DEFAULT_ENGINE_URL: &str = "http://localhost:50021";

/// Time budget for building the audio query
const QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Time budget for synthesizing audio from a query
const SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(30);

/// Time budget for the version health check
const VERSION_TIMEOUT: Duration = Duration::from_secs(5);

/// One selectable voice style of a speaker
#[derive(Debug, Clone, Deserialize)]
pub struct SpeakerStyle {
    /// Style display name
    pub name: String,
    /// Engine style id (what [`SpeechRequest::speaker`] refers to)
    pub id: u32,
}

/// A speaker exposed by the engine
#[derive(Debug, Clone, Deserialize)]
pub struct SpeakerInfo {
    /// Speaker display name
    pub name: String,
    /// Available styles
    pub styles: Vec<SpeakerStyle>,
}

/// Client for a VOICEVOX-compatible engine
#[derive(Debug, Clone)]
pub struct SpeechEngine {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl SpeechEngine {
    /// Create a client for the engine at `base_url`
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            retry: RetryPolicy::default(),
        }
    }

    /// Engine base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check the engine is reachable and return its version string.
    ///
    /// Retried once after a 2 second wait when the engine answers 503
    /// (it reports unavailable while still loading models).
    ///
    /// # Errors
    ///
    /// Returns error if the engine cannot be reached
    pub async fn version(&self) -> Result<String> {
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(2),
        };

        with_retry(&policy, SynthesisError::is_transient, || async {
            let response = self
                .client
                .get(format!("{}/version", self.base_url))
                .timeout(VERSION_TIMEOUT)
                .send()
                .await
                .map_err(call_error)?;

            let response = check_status(response)?;
            response
                .text()
                .await
                .map_err(|e| SynthesisError::Other(e.to_string()))
        })
        .await
        .map_err(|e| Error::Synthesis(format!("engine version check failed: {e}")))
    }

    /// List available speakers and their styles.
    ///
    /// # Errors
    ///
    /// Returns error if the engine cannot be reached after retries
    pub async fn speakers(&self) -> Result<Vec<SpeakerInfo>> {
        with_retry(&self.retry, SynthesisError::is_transient, || async {
            let response = self
                .client
                .get(format!("{}/speakers", self.base_url))
                .timeout(QUERY_TIMEOUT)
                .send()
                .await
                .map_err(call_error)?;

            let response = check_status(response)?;
            response
                .json::<Vec<SpeakerInfo>>()
                .await
                .map_err(|e| SynthesisError::Other(e.to_string()))
        })
        .await
        .map_err(|e| Error::Synthesis(format!("speaker listing failed: {e}")))
    }

    /// Single synthesis attempt: build the audio query, apply in-range
    /// tuning, then render it. Retrying is the caller's concern.
    async fn synthesize_once(&self, request: &SpeechRequest) -> std::result::Result<Vec<u8>, SynthesisError> {
        tracing::debug!(
            text = %request.text,
            speaker = request.speaker,
            "building audio query"
        );

        let query_response = self
            .client
            .post(format!(
                "{}/audio_query?text={}&speaker={}",
                self.base_url,
                urlencoding::encode(&request.text),
                request.speaker
            ))
            .timeout(QUERY_TIMEOUT)
            .send()
            .await
            .map_err(call_error)?;

        let query_response = check_status(query_response)?;
        let mut query: serde_json::Value = query_response
            .json()
            .await
            .map_err(|e| SynthesisError::Other(e.to_string()))?;

        apply_tuning(&mut query, request.tuning.volume, request.tuning.speed);

        let synthesis_response = self
            .client
            .post(format!(
                "{}/synthesis?speaker={}",
                self.base_url, request.speaker
            ))
            .json(&query)
            .timeout(SYNTHESIS_TIMEOUT)
            .send()
            .await
            .map_err(call_error)?;

        let synthesis_response = check_status(synthesis_response)?;
        let audio = synthesis_response
            .bytes()
            .await
            .map_err(|e| SynthesisError::Other(e.to_string()))?;

        tracing::debug!(bytes = audio.len(), "synthesis complete");
        Ok(audio.to_vec())
    }
}

#[async_trait]
impl Synthesizer for SpeechEngine {
    async fn synthesize(&self, request: &SpeechRequest) -> std::result::Result<Vec<u8>, SynthesisError> {
        self.synthesize_once(request).await
    }
}

/// Apply volume/speed to the audio query, ignoring out-of-range values
/// so the engine default stays in effect.
fn apply_tuning(query: &mut serde_json::Value, volume: Option<f64>, speed: Option<f64>) {
    if let Some(volume) = volume {
        if (0.0..=1.0).contains(&volume) {
            query["volumeScale"] = serde_json::json!(volume);
        }
    }
    if let Some(speed) = speed {
        if (0.5..=2.0).contains(&speed) {
            query["speedScale"] = serde_json::json!(speed);
        }
    }
}

/// Map a transport failure to the synthesis error taxonomy
pub(crate) fn call_error(e: reqwest::Error) -> SynthesisError {
    if e.is_timeout() {
        SynthesisError::Timeout
    } else if e.is_connect() {
        SynthesisError::Network(e.to_string())
    } else {
        SynthesisError::Other(e.to_string())
    }
}

/// Reject non-success responses with their status code
pub(crate) fn check_status(
    response: reqwest::Response,
) -> std::result::Result<reqwest::Response, SynthesisError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(SynthesisError::Status(status.as_u16()))
    }
}
