//! Priority-ordered, single-consumer playback queue
//!
//! Items are played in `(sequence, sub, arrival)` order. A chat reading
//! takes `(n, 0)` and its AI reply `(n, 1)`, so the reply always follows
//! the reading that triggered it but precedes any later chat event,
//! whose sequence is strictly greater. Enqueuing never blocks; a single
//! consumer task is started when the queue goes non-empty and exits
//! when it drains.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{AudioSink, SpeechRequest, Synthesizer};
use crate::retry::{with_retry, RetryPolicy};

/// Queue timing and retry knobs
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Pause between consecutive items
    pub inter_item_gap: Duration,
    /// Hard cap on a single playback
    pub play_timeout: Duration,
    /// Retry policy for synthesis calls
    pub retry: RetryPolicy,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            inter_item_gap: Duration::from_millis(300),
            play_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// Snapshot of queue state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStatus {
    /// Items waiting (excludes the one mid-playback)
    pub queue_length: usize,
    /// Consumer task is running
    pub is_playing: bool,
}

#[derive(Debug)]
struct QueueItem {
    request: SpeechRequest,
    sequence: u64,
    sub: u8,
    arrival: u64,
}

#[derive(Debug, Default)]
struct QueueState {
    items: Vec<QueueItem>,
    next_sequence: u64,
    next_arrival: u64,
    playing: bool,
}

struct Inner {
    state: Mutex<QueueState>,
    synthesizer: Arc<dyn Synthesizer>,
    sink: Arc<dyn AudioSink>,
    options: QueueOptions,
}

/// Ordered audio queue with a self-starting consumer task
#[derive(Clone)]
pub struct AudioQueue {
    inner: Arc<Inner>,
}

impl AudioQueue {
    /// Create a queue with default timing
    #[must_use]
    pub fn new(synthesizer: Arc<dyn Synthesizer>, sink: Arc<dyn AudioSink>) -> Self {
        Self::with_options(synthesizer, sink, QueueOptions::default())
    }

    /// Create a queue with explicit timing and retry knobs
    #[must_use]
    pub fn with_options(
        synthesizer: Arc<dyn Synthesizer>,
        sink: Arc<dyn AudioSink>,
        options: QueueOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::default()),
                synthesizer,
                sink,
                options,
            }),
        }
    }

    /// Reserve the next sequence number.
    ///
    /// The pipeline calls this before any await so a slow upstream call
    /// for one message cannot let a later message claim an earlier slot.
    pub fn reserve_sequence(&self) -> u64 {
        let mut state = self.lock();
        state.next_sequence += 1;
        state.next_sequence
    }

    /// Enqueue with an auto-assigned sequence (sub-order 0)
    pub fn enqueue(&self, request: SpeechRequest) {
        let sequence = self.reserve_sequence();
        self.enqueue_at(request, sequence, 0);
    }

    /// Enqueue at an explicit `(sequence, sub)` slot.
    ///
    /// Starts the consumer task if it is idle. Never blocks on playback.
    pub fn enqueue_at(&self, request: SpeechRequest, sequence: u64, sub: u8) {
        let start_consumer = {
            let mut state = self.lock();
            let arrival = state.next_arrival;
            state.next_arrival += 1;

            let item = QueueItem {
                request,
                sequence,
                sub,
                arrival,
            };
            let pos = state
                .items
                .partition_point(|other| key_of(other) <= (sequence, sub, arrival));
            state.items.insert(pos, item);

            tracing::debug!(
                sequence,
                sub,
                queued = state.items.len(),
                "audio item enqueued"
            );

            if state.playing {
                false
            } else {
                state.playing = true;
                true
            }
        };

        if start_consumer {
            let queue = self.clone();
            tokio::spawn(async move { queue.run_consumer().await });
        }
    }

    /// Drop all pending items and reset the sequence counter.
    ///
    /// An item already mid-playback is not interrupted.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.items.clear();
        state.next_sequence = 0;
        tracing::info!("audio queue cleared");
    }

    /// Current queue length and consumer state
    #[must_use]
    pub fn status(&self) -> QueueStatus {
        let state = self.lock();
        QueueStatus {
            queue_length: state.items.len(),
            is_playing: state.playing,
        }
    }

    /// Consumer loop: pop lowest-ordered item, synthesize, play, pause.
    ///
    /// One item's failure never halts the loop; the busy flag is cleared
    /// in the same critical section that observes the queue empty, so a
    /// concurrent enqueue either sees the running consumer or restarts it.
    async fn run_consumer(self) {
        loop {
            let item = {
                let mut state = self.lock();
                if state.items.is_empty() {
                    state.playing = false;
                    break;
                }
                state.items.remove(0)
            };

            let remaining = self.status().queue_length;
            tracing::debug!(
                text = %item.request.text,
                sequence = item.sequence,
                sub = item.sub,
                remaining,
                "playing audio item"
            );

            match self.speak(&item.request).await {
                Ok(()) => {
                    tokio::time::sleep(self.inner.options.inter_item_gap).await;
                }
                Err(err) => {
                    tracing::error!(
                        text = %item.request.text,
                        error = %err,
                        "audio item failed, continuing with next"
                    );
                }
            }
        }

        tracing::debug!("audio queue drained");
    }

    /// Synthesize (with retry on transient engine failures) and play one item
    async fn speak(&self, request: &SpeechRequest) -> crate::Result<()> {
        let audio = with_retry(
            &self.inner.options.retry,
            super::SynthesisError::is_transient,
            || self.inner.synthesizer.synthesize(request),
        )
        .await
        .map_err(|e| crate::Error::Synthesis(e.to_string()))?;

        match tokio::time::timeout(self.inner.options.play_timeout, self.inner.sink.play(&audio))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(crate::Error::Audio("playback timed out".to_string())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.inner.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn key_of(item: &QueueItem) -> (u64, u8, u64) {
    (item.sequence, item.sub, item.arrival)
}
