//! Live chat ingestion
//!
//! A [`ChatSource`] feeds [`ChatEvent`]s into the daemon over an mpsc
//! channel. The only shipped source is YouTube live chat; the trait
//! keeps the daemon testable without a network.

mod youtube;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::events::ChatEvent;
use crate::Result;

pub use youtube::{extract_channel_id, extract_video_id, live_url, YouTubeChatSource};

/// A stream of live chat events
#[async_trait]
pub trait ChatSource: Send + Sync {
    /// Run the source until it ends or [`ChatSource::stop`] is called,
    /// sending each event to `tx`.
    ///
    /// # Errors
    ///
    /// Returns error if the source cannot connect or the stream breaks
    /// irrecoverably.
    async fn run(&self, tx: mpsc::Sender<ChatEvent>) -> Result<()>;

    /// Request the running source to stop after its current poll
    fn stop(&self);
}
