//! Shared test doubles for the integration suite
#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use komochi_gateway::agent::{Completion, CompletionError};
use komochi_gateway::audio::{
    AudioQueue, AudioSink, QueueOptions, SpeechRequest, SynthesisError, Synthesizer,
};
use komochi_gateway::retry::RetryPolicy;

/// Synthesizer that echoes the request text back as bytes, so the sink
/// can record what was "spoken" in which order.
pub struct EchoSynth {
    pub calls: Mutex<Vec<String>>,
}

impl EchoSynth {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Synthesizer for EchoSynth {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>, SynthesisError> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(request.text.clone());
        Ok(request.text.clone().into_bytes())
    }
}

/// Sink that records every played utterance, optionally taking a while
/// per item to model real playback time.
pub struct RecordingSink {
    pub played: Arc<Mutex<Vec<String>>>,
    pub per_item: Duration,
}

impl RecordingSink {
    pub fn new(per_item: Duration) -> Self {
        Self {
            played: Arc::new(Mutex::new(Vec::new())),
            per_item,
        }
    }

    pub fn played(&self) -> Vec<String> {
        self.played
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl AudioSink for RecordingSink {
    async fn play(&self, audio: &[u8]) -> komochi_gateway::Result<()> {
        if !self.per_item.is_zero() {
            tokio::time::sleep(self.per_item).await;
        }
        self.played
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(String::from_utf8_lossy(audio).into_owned());
        Ok(())
    }
}

/// Completion returning a fixed reply after an optional delay
pub struct ScriptedCompletion {
    pub reply: String,
    pub delay: Duration,
    pub calls: AtomicU32,
    pub fail_with: Option<fn() -> CompletionError>,
}

impl ScriptedCompletion {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
            fail_with: None,
        }
    }

    pub fn slow(reply: &str, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::replying(reply)
        }
    }

    pub fn failing(factory: fn() -> CompletionError) -> Self {
        Self {
            fail_with: Some(factory),
            ..Self::replying("")
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Completion whose reply and delay differ per call, consumed in call
/// order. Panics when called more often than scripted.
pub struct SequencedCompletion {
    script: Mutex<Vec<(Duration, String)>>,
}

impl SequencedCompletion {
    pub fn new(script: &[(Duration, &str)]) -> Self {
        Self {
            script: Mutex::new(
                script
                    .iter()
                    .map(|(delay, reply)| (*delay, (*reply).to_string()))
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl Completion for SequencedCompletion {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String, CompletionError> {
        let (delay, reply) = {
            let mut script = self
                .script
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            assert!(!script.is_empty(), "completion called more often than scripted");
            script.remove(0)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(reply)
    }
}

#[async_trait]
impl Completion for ScriptedCompletion {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.fail_with {
            Some(factory) => Err(factory()),
            None => Ok(self.reply.clone()),
        }
    }
}

/// Queue with fast timings suitable for tests
pub fn fast_queue(synth: Arc<dyn Synthesizer>, sink: Arc<dyn AudioSink>) -> AudioQueue {
    AudioQueue::with_options(
        synth,
        sink,
        QueueOptions {
            inter_item_gap: Duration::from_millis(5),
            play_timeout: Duration::from_secs(5),
            retry: RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(10),
            },
        },
    )
}

/// Wait until the queue has drained completely
pub async fn drain(queue: &AudioQueue) {
    for _ in 0..500 {
        let status = queue.status();
        if !status.is_playing && status.queue_length == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("queue did not drain");
}
