//! YouTube live chat polling source
//!
//! Resolves a video id or channel URL to a live chat continuation via
//! the watch page, then polls the InnerTube `get_live_chat` endpoint at
//! the cadence the endpoint itself suggests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use tokio::sync::mpsc;

use super::ChatSource;
use crate::events::ChatEvent;
use crate::{Error, Result};

const WATCH_TIMEOUT: Duration = Duration::from_secs(15);
const POLL_TIMEOUT: Duration = Duration::from_secs(10);

/// Fallback poll cadence when the endpoint suggests none
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Live redirect URL for a channel
#[must_use]
pub fn live_url(channel_url: &str) -> String {
    format!("{}/live", channel_url.trim_end_matches('/'))
}

fn video_id_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"[?&]v=([A-Za-z0-9_-]{11})",
            r"youtu\.be/([A-Za-z0-9_-]{11})",
            r"/live/([A-Za-z0-9_-]{11})",
            r"/embed/([A-Za-z0-9_-]{11})",
            r"^([A-Za-z0-9_-]{11})$",
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap_or_else(|e| unreachable!("static pattern: {e}")))
        .collect()
    })
}

/// Extract an 11-character video id from a URL or bare id.
///
/// Patterns are tried in order: watch URL, short URL, live URL, embed
/// URL, then a bare id.
#[must_use]
pub fn extract_video_id(text: &str) -> Option<String> {
    let text = text.trim();
    video_id_patterns()
        .iter()
        .find_map(|p| p.captures(text))
        .map(|c| c[1].to_string())
}

/// Extract a canonical channel id from a `/channel/UC…` URL.
///
/// Handle (`@name`) and vanity (`/c/name`) forms have no id in the URL
/// and return `None`.
#[must_use]
pub fn extract_channel_id(url: &str) -> Option<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"/channel/(UC[A-Za-z0-9_-]{22})")
            .unwrap_or_else(|e| unreachable!("static pattern: {e}"))
    });
    pattern.captures(url).map(|c| c[1].to_string())
}

/// Session state scraped from the watch page
struct ChatSession {
    api_key: String,
    client_version: String,
    continuation: String,
}

/// One batch of polled messages plus the next continuation
struct PollResult {
    events: Vec<ChatEvent>,
    continuation: Option<String>,
    next_poll: Duration,
}

/// Polls YouTube live chat for a single video
pub struct YouTubeChatSource {
    client: reqwest::Client,
    video_id: String,
    stopped: AtomicBool,
}

impl YouTubeChatSource {
    /// Create a source for the given video id
    #[must_use]
    pub fn new(video_id: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            video_id: video_id.into(),
            stopped: AtomicBool::new(false),
        }
    }

    /// The video this source follows
    #[must_use]
    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    /// Scrape API key, client version, and the initial live chat
    /// continuation from the watch page.
    async fn open_session(&self) -> Result<ChatSession> {
        let url = format!("https://www.youtube.com/watch?v={}", self.video_id);
        tracing::info!(video_id = %self.video_id, "connecting to live chat");

        let page = self
            .client
            .get(&url)
            .timeout(WATCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::Chat(format!("failed to load watch page: {e}")))?
            .text()
            .await
            .map_err(|e| Error::Chat(format!("failed to read watch page: {e}")))?;

        let api_key = scrape_field(&page, r#""INNERTUBE_API_KEY":"([^"]+)""#)
            .ok_or_else(|| Error::Chat("watch page has no API key".to_string()))?;
        let client_version = scrape_field(&page, r#""INNERTUBE_CONTEXT_CLIENT_VERSION":"([^"]+)""#)
            .ok_or_else(|| Error::Chat("watch page has no client version".to_string()))?;
        let continuation = scrape_field(&page, r#""continuation":"([^"]+)""#).ok_or_else(|| {
            Error::Chat(format!(
                "no live chat found for video {} (stream may not be live)",
                self.video_id
            ))
        })?;

        Ok(ChatSession {
            api_key,
            client_version,
            continuation,
        })
    }

    /// Fetch one chat batch for the current continuation
    async fn poll_once(&self, session: &ChatSession) -> Result<PollResult> {
        let url = format!(
            "https://www.youtube.com/youtubei/v1/live_chat/get_live_chat?key={}",
            session.api_key
        );
        let body = serde_json::json!({
            "context": {
                "client": {
                    "clientName": "WEB",
                    "clientVersion": session.client_version,
                }
            },
            "continuation": session.continuation,
        });

        let response: serde_json::Value = self
            .client
            .post(&url)
            .json(&body)
            .timeout(POLL_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::Chat(format!("chat poll failed: {e}")))?
            .json()
            .await
            .map_err(|e| Error::Chat(format!("chat poll returned malformed JSON: {e}")))?;

        Ok(parse_chat_batch(&response))
    }
}

#[async_trait]
impl ChatSource for YouTubeChatSource {
    async fn run(&self, tx: mpsc::Sender<ChatEvent>) -> Result<()> {
        let mut session = self.open_session().await?;
        tracing::info!(video_id = %self.video_id, "live chat connected");

        while !self.stopped.load(Ordering::Relaxed) {
            let batch = self.poll_once(&session).await?;

            for event in batch.events {
                if tx.send(event).await.is_err() {
                    tracing::debug!("event receiver dropped, stopping chat source");
                    return Ok(());
                }
            }

            match batch.continuation {
                Some(next) => session.continuation = next,
                None => {
                    tracing::info!(video_id = %self.video_id, "live chat ended");
                    return Ok(());
                }
            }

            tokio::time::sleep(batch.next_poll).await;
        }

        tracing::info!(video_id = %self.video_id, "chat source stopped");
        Ok(())
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }
}

fn scrape_field(page: &str, pattern: &str) -> Option<String> {
    Regex::new(pattern)
        .ok()?
        .captures(page)
        .map(|c| c[1].to_string())
}

/// Parse a `get_live_chat` response into events and the next
/// continuation token.
fn parse_chat_batch(response: &serde_json::Value) -> PollResult {
    let chat = &response["continuationContents"]["liveChatContinuation"];

    let continuation_data = chat["continuations"]
        .as_array()
        .and_then(|c| c.first())
        .map(|c| {
            c.get("invalidationContinuationData")
                .or_else(|| c.get("timedContinuationData"))
                .or_else(|| c.get("reloadContinuationData"))
                .unwrap_or(&serde_json::Value::Null)
        });

    let continuation = continuation_data
        .and_then(|d| d["continuation"].as_str())
        .map(String::from);
    let next_poll = continuation_data
        .and_then(|d| d["timeoutMs"].as_u64())
        .map_or(DEFAULT_POLL_INTERVAL, Duration::from_millis);

    let events = chat["actions"]
        .as_array()
        .map(|actions| {
            actions
                .iter()
                .filter_map(|a| parse_chat_item(&a["addChatItemAction"]["item"]))
                .collect()
        })
        .unwrap_or_default();

    PollResult {
        events,
        continuation,
        next_poll,
    }
}

/// Parse a single chat item; non-text items (memberships, stickers)
/// yield `None`.
fn parse_chat_item(item: &serde_json::Value) -> Option<ChatEvent> {
    let renderer = item.get("liveChatTextMessageRenderer")?;
    let author = renderer["authorName"]["simpleText"].as_str()?.to_string();

    let message: String = renderer["message"]["runs"]
        .as_array()?
        .iter()
        .filter_map(render_run)
        .collect();
    if message.is_empty() {
        return None;
    }

    let timestamp = renderer["timestampUsec"]
        .as_str()
        .and_then(|s| s.parse::<i64>().ok())
        .and_then(DateTime::<Utc>::from_timestamp_micros)
        .unwrap_or_else(Utc::now);

    Some(ChatEvent {
        author,
        message,
        timestamp,
    })
}

/// Render one message run: plain text as-is, emoji as their shortcut
/// token (`:name:`) so downstream reading conversion can voice them.
fn render_run(run: &serde_json::Value) -> Option<String> {
    if let Some(text) = run["text"].as_str() {
        return Some(text.to_string());
    }

    let emoji = run.get("emoji")?;
    emoji["shortcuts"]
        .as_array()
        .and_then(|s| s.first())
        .and_then(|s| s.as_str())
        .or_else(|| emoji["emojiId"].as_str())
        .map(String::from)
}
