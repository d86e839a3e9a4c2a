//! Message orchestrator
//!
//! Turns one admitted chat event into its spoken reading and, when a
//! trigger word matches, a spoken persona reply. The reading and the
//! reply share a base sequence reserved before the completion call, so
//! a slow reply never lets a later message's audio jump ahead of it.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::agent::{
    build_system_prompt, build_user_prompt, fallback_reply, Completion, CompletionError,
};
use crate::audio::{AudioQueue, SpeechRequest, VoiceTuning};
use crate::config::Config;
use crate::events::{ChatEvent, OutboundMessage};
use crate::retry::{with_retry, RetryPolicy};
use crate::text::{
    compose_reading_text, is_bot_author, matches_trigger, resolve_word_speaker, ReadingOptions,
};

/// Everything the pipeline needs from configuration
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Whether admitted messages are read aloud at all
    pub read_all_chats: bool,
    /// Reading composition settings
    pub reading: ReadingOptions,
    /// Words that trigger a persona reply
    pub trigger_words: Vec<String>,
    /// Words spoken with a specific style id
    pub word_speakers: IndexMap<String, u32>,
    /// Style id for readings with no word override
    pub default_speaker: u32,
    /// Persona display name
    pub persona_name: String,
    /// Free-text personality for the system prompt
    pub personality: String,
    /// Style id for persona replies with no word override
    pub persona_speaker: u32,
    /// Volume and speed forwarded to every utterance
    pub tuning: VoiceTuning,
    /// Whether replies are spoken in addition to being emitted
    pub speak_replies: bool,
    /// Retry policy for the completion call
    pub completion_retry: RetryPolicy,
}

impl PipelineOptions {
    /// Derive pipeline options from loaded configuration
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            read_all_chats: config.reading.read_all_chats,
            reading: config.reading_options(),
            trigger_words: config.trigger_words(),
            word_speakers: config.word_speakers.clone(),
            default_speaker: config.engine.default_speaker,
            persona_name: config.persona.name.clone(),
            personality: config.persona.personality.clone(),
            persona_speaker: config.persona.speaker_id,
            tuning: VoiceTuning {
                volume: config.engine.volume,
                speed: config.engine.speed,
            },
            speak_replies: config.completion.speak_replies,
            completion_retry: RetryPolicy::default(),
        }
    }
}

/// Orchestrates reading and reply for each admitted chat event
pub struct MessagePipeline {
    queue: AudioQueue,
    completion: Arc<dyn Completion>,
    options: PipelineOptions,
}

impl MessagePipeline {
    /// Create a pipeline over the given queue and completion client
    #[must_use]
    pub fn new(
        queue: AudioQueue,
        completion: Arc<dyn Completion>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            queue,
            completion,
            options,
        }
    }

    /// The audio queue this pipeline enqueues into
    #[must_use]
    pub fn queue(&self) -> &AudioQueue {
        &self.queue
    }

    /// Process one admitted event: speak its reading, and when a
    /// trigger word matches, generate and emit the persona reply.
    ///
    /// Failures inside the pipeline never propagate; they are logged
    /// and surfaced as an error-kind message so the stream keeps going.
    pub async fn process(&self, event: &ChatEvent, on_response: &(dyn Fn(OutboundMessage) + Send + Sync)) {
        if let Err(e) = self.process_inner(event, on_response).await {
            tracing::error!(author = %event.author, error = %e, "pipeline failure");
            on_response(OutboundMessage::error(format!(
                "メッセージ処理中にエラーが発生しました: {e}"
            )));
        }
    }

    async fn process_inner(
        &self,
        event: &ChatEvent,
        on_response: &(dyn Fn(OutboundMessage) + Send + Sync),
    ) -> crate::Result<()> {
        if is_bot_author(&event.author) {
            tracing::debug!(author = %event.author, "ignoring bot message");
            return Ok(());
        }

        // Reserve the base sequence before any await so the reply slot
        // (base, 1) is pinned even if the completion call is slow.
        let base = self.queue.reserve_sequence();

        if self.options.read_all_chats {
            let reading =
                compose_reading_text(&event.author, &event.message, &self.options.reading);
            if !reading.is_empty() {
                let speaker = resolve_word_speaker(
                    &event.message,
                    &self.options.word_speakers,
                    self.options.default_speaker,
                );
                self.enqueue(reading, speaker, base, 0);
            }
        }

        if !matches_trigger(&event.message, &self.options.trigger_words) {
            return Ok(());
        }

        tracing::info!(author = %event.author, "trigger matched, generating reply");
        let reply = self.generate_reply(&event.author, &event.message).await;

        on_response(OutboundMessage::new(
            self.options.persona_name.clone(),
            reply.clone(),
            crate::events::MessageKind::AiResponse,
        ));

        if self.options.speak_replies {
            let speaker = resolve_word_speaker(
                &reply,
                &self.options.word_speakers,
                self.options.persona_speaker,
            );
            self.enqueue(reply, speaker, base, 1);
        }

        Ok(())
    }

    /// Call the completion with retry; exhaustion or a permanent error
    /// yields the deterministic persona fallback.
    async fn generate_reply(&self, author: &str, message: &str) -> String {
        let system = build_system_prompt(&self.options.persona_name, &self.options.personality);
        let user = build_user_prompt(&self.options.persona_name, author, message);

        let result = with_retry(
            &self.options.completion_retry,
            CompletionError::is_transient,
            || self.completion.complete(&system, &user),
        )
        .await;

        match result {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "reply generation failed, using fallback");
                fallback_reply(&self.options.persona_name, author, &e)
            }
        }
    }

    fn enqueue(&self, text: String, speaker: u32, sequence: u64, sub: u8) {
        let mut request = SpeechRequest::new(text, speaker);
        request.tuning = self.options.tuning;
        self.queue.enqueue_at(request, sequence, sub);
    }
}
