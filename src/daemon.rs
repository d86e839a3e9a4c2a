//! Gateway daemon
//!
//! Wires a chat source, the spam filter, and the message pipeline
//! together. Each incoming event is forwarded to the outbound sink,
//! checked for admission, and (if admitted) handed to the pipeline.
//! Repeat offenders are escalated to a timed cooldown automatically.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::sync::Mutex;

use crate::chat::ChatSource;
use crate::events::{ChatEvent, MessageKind, OutboundMessage};
use crate::pipeline::MessagePipeline;
use crate::spam::{SpamFilter, SpamStatistics};
use crate::Result;

/// Cooldown applied when an author keeps violating the limits
const ESCALATION_COOLDOWN: std::time::Duration = std::time::Duration::from_secs(60);

/// Lifetime violations at which the escalation kicks in
const ESCALATION_THRESHOLD: u32 = 2;

/// Buffered channel size between the chat source and the daemon
const EVENT_BUFFER: usize = 64;

/// Runs the chat-to-speech loop for one stream
pub struct Daemon {
    pipeline: MessagePipeline,
    filter: Arc<Mutex<SpamFilter>>,
    outbound: mpsc::Sender<OutboundMessage>,
}

impl Daemon {
    /// Create a daemon emitting responses to `outbound`
    #[must_use]
    pub fn new(
        pipeline: MessagePipeline,
        filter: SpamFilter,
        outbound: mpsc::Sender<OutboundMessage>,
    ) -> Self {
        Self {
            pipeline,
            filter: Arc::new(Mutex::new(filter)),
            outbound,
        }
    }

    /// Shared handle to the spam filter (for stats and resets)
    #[must_use]
    pub fn filter(&self) -> Arc<Mutex<SpamFilter>> {
        Arc::clone(&self.filter)
    }

    /// Snapshot of spam statistics
    pub async fn spam_statistics(&self) -> SpamStatistics {
        self.filter.lock().await.statistics()
    }

    /// Run the daemon over `source` until the source ends or fails.
    ///
    /// Events timestamped before this call are dropped so a reconnect
    /// does not replay chat backlog through the speakers.
    ///
    /// # Errors
    ///
    /// Returns error if the source fails to connect or breaks
    pub async fn run(&self, source: &dyn ChatSource) -> Result<()> {
        let started_at = Utc::now();
        let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);

        // The receive loop ends when the source drops its sender, so
        // both sides of the join finish together.
        let source_task = source.run(tx);
        let process_task = async {
            while let Some(event) = rx.recv().await {
                self.handle_event(event, started_at).await;
            }
        };

        let (result, ()) = tokio::join!(source_task, process_task);
        result
    }

    /// Process one event: forward, admit, pipeline
    pub async fn handle_event(&self, event: ChatEvent, started_at: DateTime<Utc>) {
        if event.timestamp < started_at {
            tracing::debug!(author = %event.author, "dropping pre-connection backlog message");
            return;
        }

        tracing::debug!(author = %event.author, message = %event.message, "chat message");
        self.emit(OutboundMessage::new(
            event.author.clone(),
            event.message.clone(),
            MessageKind::User,
        ))
        .await;

        let verdict = {
            let mut filter = self.filter.lock().await;
            let verdict = filter.check(&event.author, &event.message);

            if verdict.is_spam {
                let now = Utc::now();
                let repeat_offender = filter.history(&event.author).is_some_and(|h| {
                    h.spam_count() >= ESCALATION_THRESHOLD && !h.in_cooldown_at(now)
                });
                if repeat_offender {
                    filter.set_cooldown(&event.author, ESCALATION_COOLDOWN);
                    self.emit(OutboundMessage::system(format!(
                        "{} を{}秒間のクールダウンに設定しました",
                        event.author,
                        ESCALATION_COOLDOWN.as_secs()
                    )))
                    .await;
                }
            }
            verdict
        };

        if verdict.is_spam {
            let reason = verdict.reason.unwrap_or_default();
            tracing::info!(author = %event.author, reason = %reason, "message rejected as spam");
            self.emit(OutboundMessage::new(
                event.author.clone(),
                format!("[スパム判定: {reason}] {}", event.message),
                MessageKind::Spam,
            ))
            .await;
            return;
        }

        let outbound = self.outbound.clone();
        self.pipeline
            .process(&event, &move |message| {
                // The sink may lag; losing a UI message must not stall speech
                if let Err(e) = outbound.try_send(message) {
                    tracing::warn!(error = %e, "outbound sink full, response dropped");
                }
            })
            .await;
    }

    async fn emit(&self, message: OutboundMessage) {
        if self.outbound.send(message).await.is_err() {
            tracing::warn!("outbound receiver dropped");
        }
    }
}
