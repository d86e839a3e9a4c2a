//! Ordered audio output
//!
//! The queue serializes everything the gateway speaks. Synthesis and
//! device playback are capability traits so tests run without an engine
//! or audio hardware.

mod playback;
mod queue;

use async_trait::async_trait;
use thiserror::Error;

pub use playback::DevicePlayback;
pub use queue::{AudioQueue, QueueOptions, QueueStatus};

/// Per-item tuning forwarded to the speech engine.
///
/// Values outside the engine's accepted range (volume 0–1, speed
/// 0.5–2.0) are ignored there and the engine default applies.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VoiceTuning {
    /// Output volume scale
    pub volume: Option<f64>,
    /// Speaking speed scale
    pub speed: Option<f64>,
}

/// A single utterance to synthesize and play
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    /// Text to speak
    pub text: String,
    /// Engine speaker id
    pub speaker: u32,
    /// Per-item tuning
    pub tuning: VoiceTuning,
}

impl SpeechRequest {
    /// Build a request with default tuning
    #[must_use]
    pub fn new(text: impl Into<String>, speaker: u32) -> Self {
        Self {
            text: text.into(),
            speaker,
            tuning: VoiceTuning::default(),
        }
    }
}

/// Speech synthesis failure taxonomy
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// Engine responded with a non-success HTTP status
    #[error("engine returned status {0}")]
    Status(u16),

    /// Query construction or synthesis exceeded its time budget
    #[error("synthesis timed out")]
    Timeout,

    /// Engine unreachable
    #[error("network error: {0}")]
    Network(String),

    /// Anything else
    #[error("{0}")]
    Other(String),
}

impl SynthesisError {
    /// Whether a retry may help (rate limit or temporary unavailability)
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Status(429 | 503))
    }
}

/// Synthesizes speech from text (external engine boundary)
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize the request into audio bytes (WAV)
    async fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>, SynthesisError>;
}

/// Plays audio bytes to completion (device boundary)
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Play the audio, returning once playback finished
    async fn play(&self, audio: &[u8]) -> crate::Result<()>;
}
