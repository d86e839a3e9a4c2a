//! End-to-end pipeline behavior over mock capabilities

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{drain, fast_queue, EchoSynth, RecordingSink, ScriptedCompletion, SequencedCompletion};
use indexmap::IndexMap;
use komochi_gateway::agent::{Completion, CompletionError};
use komochi_gateway::audio::VoiceTuning;
use komochi_gateway::events::{ChatEvent, MessageKind, OutboundMessage};
use komochi_gateway::pipeline::{MessagePipeline, PipelineOptions};
use komochi_gateway::retry::RetryPolicy;
use komochi_gateway::text::ReadingOptions;

fn options() -> PipelineOptions {
    PipelineOptions {
        read_all_chats: true,
        reading: ReadingOptions {
            read_user_name: true,
            ..ReadingOptions::default()
        },
        trigger_words: vec!["こもち".to_string()],
        word_speakers: IndexMap::new(),
        default_speaker: 1,
        persona_name: "こもち".to_string(),
        personality: String::new(),
        persona_speaker: 8,
        tuning: VoiceTuning::default(),
        speak_replies: true,
        completion_retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(10),
        },
    }
}

struct Harness {
    pipeline: Arc<MessagePipeline>,
    sink: Arc<RecordingSink>,
    synth: Arc<EchoSynth>,
    responses: Arc<Mutex<Vec<OutboundMessage>>>,
}

impl Harness {
    fn new(completion: Arc<dyn Completion>, playback_time: Duration) -> Self {
        let synth = Arc::new(EchoSynth::new());
        let sink = Arc::new(RecordingSink::new(playback_time));
        let queue = fast_queue(synth.clone(), sink.clone());

        Self {
            pipeline: Arc::new(MessagePipeline::new(queue, completion, options())),
            sink,
            synth,
            responses: Arc::new(Mutex::new(Vec::new())),
        }
    }

    async fn process(&self, event: &ChatEvent) {
        let responses = Arc::clone(&self.responses);
        self.pipeline
            .process(event, &move |message| {
                responses
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .push(message);
            })
            .await;
    }

    fn responses(&self) -> Vec<OutboundMessage> {
        self.responses
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[tokio::test]
async fn trigger_produces_reading_then_reply() {
    let completion = Arc::new(ScriptedCompletion::replying("こんにちは！こもちだよ😊"));
    let h = Harness::new(completion.clone(), Duration::ZERO);

    h.process(&ChatEvent::new("alice", "こもちこんにちは")).await;
    drain(h.pipeline.queue()).await;

    assert_eq!(
        h.sink.played(),
        vec![
            "aliceさん、こもちこんにちは".to_string(),
            "こんにちは！こもちだよ😊".to_string(),
        ]
    );

    let responses = h.responses();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].kind, MessageKind::AiResponse);
    assert_eq!(responses[0].author, "こもち");
    assert_eq!(responses[0].message, "こんにちは！こもちだよ😊");
    assert_eq!(completion.call_count(), 1);
}

#[tokio::test]
async fn slow_reply_never_falls_behind_later_messages() {
    // The first message's reply takes 60ms while the second's is ready
    // after 10ms, so the later reply exists first; the reserved slots
    // still play everything in message order.
    let completion = Arc::new(SequencedCompletion::new(&[
        (Duration::from_millis(60), "はいはい、元気だよ"),
        (Duration::from_millis(10), "えへへ、ありがとう"),
    ]));
    let h = Harness::new(completion, Duration::from_millis(100));

    let e1 = ChatEvent::new("alice", "こもち、元気？");
    let e2 = ChatEvent::new("bob", "こもちすごい");

    let h1 = {
        let pipeline = Arc::clone(&h.pipeline);
        let responses = Arc::clone(&h.responses);
        let event = e1.clone();
        tokio::spawn(async move {
            pipeline
                .process(&event, &move |m| {
                    responses
                        .lock()
                        .unwrap_or_else(std::sync::PoisonError::into_inner)
                        .push(m);
                })
                .await;
        })
    };
    // Current-thread runtime: the spawned task reserves its sequence at
    // its first poll, before this sleep returns.
    tokio::time::sleep(Duration::from_millis(1)).await;
    let h2 = {
        let pipeline = Arc::clone(&h.pipeline);
        let responses = Arc::clone(&h.responses);
        let event = e2.clone();
        tokio::spawn(async move {
            pipeline
                .process(&event, &move |m| {
                    responses
                        .lock()
                        .unwrap_or_else(std::sync::PoisonError::into_inner)
                        .push(m);
                })
                .await;
        })
    };

    h1.await.unwrap();
    h2.await.unwrap();
    drain(h.pipeline.queue()).await;

    assert_eq!(
        h.sink.played(),
        vec![
            "aliceさん、こもち、元気？".to_string(),
            "はいはい、元気だよ".to_string(),
            "bobさん、こもちすごい".to_string(),
            "えへへ、ありがとう".to_string(),
        ]
    );
}

#[tokio::test]
async fn bot_authors_are_ignored_entirely() {
    let completion = Arc::new(ScriptedCompletion::replying("unused"));
    let h = Harness::new(completion.clone(), Duration::ZERO);

    h.process(&ChatEvent::new("Nightbot", "こもち check this out")).await;
    h.process(&ChatEvent::new("my-chat-bot-v2", "こもち hello")).await;

    assert!(h.sink.played().is_empty());
    assert!(h.responses().is_empty());
    assert_eq!(completion.call_count(), 0);
    assert!(h
        .synth
        .calls
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .is_empty());
}

#[tokio::test]
async fn permanent_failure_yields_fallback_without_retry() {
    let completion = Arc::new(ScriptedCompletion::failing(|| CompletionError::Unauthorized));
    let h = Harness::new(completion.clone(), Duration::ZERO);

    h.process(&ChatEvent::new("alice", "こもち教えて")).await;
    drain(h.pipeline.queue()).await;

    assert_eq!(completion.call_count(), 1);

    let responses = h.responses();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].kind, MessageKind::AiResponse);
    assert!(responses[0].message.contains("API Keyが無効"));

    // The fallback is spoken too, after the reading
    let played = h.sink.played();
    assert_eq!(played.len(), 2);
    assert!(played[1].contains("aliceさん、こもちです！"));
}

#[tokio::test]
async fn transient_failure_exhausts_retries_then_falls_back() {
    let completion = Arc::new(ScriptedCompletion::failing(|| CompletionError::RateLimited));
    let h = Harness::new(completion.clone(), Duration::ZERO);

    h.process(&ChatEvent::new("alice", "こもち？")).await;
    drain(h.pipeline.queue()).await;

    assert_eq!(completion.call_count(), 3);

    let responses = h.responses();
    assert_eq!(responses.len(), 1);
    assert!(responses[0].message.contains("ちょっと忙しくて"));
}

#[tokio::test]
async fn non_trigger_message_is_read_but_not_answered() {
    let completion = Arc::new(ScriptedCompletion::replying("unused"));
    let h = Harness::new(completion.clone(), Duration::ZERO);

    h.process(&ChatEvent::new("alice", "今日の配信たのしい")).await;
    drain(h.pipeline.queue()).await;

    assert_eq!(h.sink.played(), vec!["aliceさん、今日の配信たのしい".to_string()]);
    assert!(h.responses().is_empty());
    assert_eq!(completion.call_count(), 0);
}

#[tokio::test]
async fn disabled_chat_reading_produces_no_queue_item() {
    let completion = Arc::new(ScriptedCompletion::replying("unused"));
    let synth = Arc::new(EchoSynth::new());
    let sink = Arc::new(RecordingSink::new(Duration::ZERO));
    let queue = fast_queue(synth, sink.clone());

    let mut opts = options();
    opts.read_all_chats = false;
    let pipeline = MessagePipeline::new(queue, completion.clone(), opts);

    pipeline
        .process(&ChatEvent::new("alice", "今日の配信たのしい"), &|_| {})
        .await;
    drain(pipeline.queue()).await;

    assert!(sink.played().is_empty());
    assert_eq!(completion.call_count(), 0);
}

#[tokio::test]
async fn reply_only_mode_still_speaks_the_reply() {
    let completion = Arc::new(ScriptedCompletion::replying("呼んだ？"));
    let synth = Arc::new(EchoSynth::new());
    let sink = Arc::new(RecordingSink::new(Duration::ZERO));
    let queue = fast_queue(synth, sink.clone());

    let mut opts = options();
    opts.read_all_chats = false;
    let pipeline = MessagePipeline::new(queue, completion, opts);

    let responses = Arc::new(Mutex::new(Vec::new()));
    let sink_responses = Arc::clone(&responses);
    pipeline
        .process(&ChatEvent::new("alice", "こもち、いる？"), &move |m| {
            sink_responses
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(m);
        })
        .await;
    drain(pipeline.queue()).await;

    // Only the reply is spoken; the reading slot stays empty
    assert_eq!(sink.played(), vec!["呼んだ？".to_string()]);
    let responses = responses
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].kind, MessageKind::AiResponse);
}

#[tokio::test]
async fn skip_word_suppresses_the_reading() {
    let completion = Arc::new(ScriptedCompletion::replying("unused"));
    let synth = Arc::new(EchoSynth::new());
    let sink = Arc::new(RecordingSink::new(Duration::ZERO));
    let queue = fast_queue(synth, sink.clone());

    let mut opts = options();
    opts.reading.ng_words_skip = vec!["badword".to_string()];
    let pipeline = MessagePipeline::new(queue, completion, opts);

    pipeline
        .process(&ChatEvent::new("alice", "this contains badword here"), &|_| {})
        .await;
    drain(pipeline.queue()).await;

    assert!(sink.played().is_empty());
}
