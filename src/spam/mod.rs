//! Spam admission filter
//!
//! Per-author sliding-window rate limiting, duplicate detection by edit
//! distance, and a timed cooldown state. The filter owns all per-user
//! history; callers interact only through its methods. Admission checks
//! never fail — a rejected message is a normal [`Verdict`], not an error.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use indexmap::IndexMap;
use serde::Deserialize;

use crate::text::similarity;

/// Tunable thresholds for spam detection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpamConfig {
    /// Maximum messages per author in any 60 second window
    pub max_messages_per_minute: u32,

    /// Maximum messages per author within the retention window
    pub max_messages_per_five_minutes: u32,

    /// Similarity score at or above which a message counts as a duplicate
    pub duplicate_threshold: f64,

    /// Default cooldown length
    #[serde(with = "duration_ms")]
    pub cooldown_duration: Duration,

    /// How long per-author message history is retained
    #[serde(with = "duration_ms")]
    pub history_retention: Duration,
}

impl Default for SpamConfig {
    fn default() -> Self {
        Self {
            max_messages_per_minute: 5,
            max_messages_per_five_minutes: 15,
            duplicate_threshold: 0.8,
            cooldown_duration: Duration::from_secs(30),
            history_retention: Duration::from_secs(300),
        }
    }
}

/// Partial runtime update for [`SpamConfig`]; unset fields keep their value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpamConfigUpdate {
    pub max_messages_per_minute: Option<u32>,
    pub max_messages_per_five_minutes: Option<u32>,
    pub duplicate_threshold: Option<f64>,
    #[serde(default, with = "opt_duration_ms")]
    pub cooldown_duration: Option<Duration>,
    #[serde(default, with = "opt_duration_ms")]
    pub history_retention: Option<Duration>,
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

mod opt_duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let ms = Option::<u64>::deserialize(d)?;
        Ok(ms.map(Duration::from_millis))
    }
}

/// Outcome of an admission check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// The message was rejected
    pub is_spam: bool,
    /// Human-readable rejection reason
    pub reason: Option<String>,
}

impl Verdict {
    fn admit() -> Self {
        Self {
            is_spam: false,
            reason: None,
        }
    }

    fn reject(reason: String) -> Self {
        Self {
            is_spam: true,
            reason: Some(reason),
        }
    }
}

#[derive(Debug, Clone)]
struct TimedMessage {
    content: String,
    timestamp: DateTime<Utc>,
}

/// Per-author message history and cooldown state
#[derive(Debug, Clone)]
pub struct UserHistory {
    messages: Vec<TimedMessage>,
    last_message_time: Option<DateTime<Utc>>,
    in_cooldown: bool,
    cooldown_until: Option<DateTime<Utc>>,
    spam_count: u32,
}

impl UserHistory {
    fn new() -> Self {
        Self {
            messages: Vec::new(),
            last_message_time: None,
            in_cooldown: false,
            cooldown_until: None,
            spam_count: 0,
        }
    }

    /// Lifetime count of spam violations for this author
    #[must_use]
    pub fn spam_count(&self) -> u32 {
        self.spam_count
    }

    /// Whether the author is in an active cooldown at `now`
    #[must_use]
    pub fn in_cooldown_at(&self, now: DateTime<Utc>) -> bool {
        self.in_cooldown && self.cooldown_until.is_some_and(|until| now < until)
    }
}

/// One line of the top-spammers report
#[derive(Debug, Clone)]
pub struct SpammerEntry {
    pub author: String,
    pub spam_count: u32,
    pub last_message: Option<DateTime<Utc>>,
    pub in_cooldown: bool,
}

/// Aggregate view over all tracked authors
#[derive(Debug, Clone)]
pub struct SpamStatistics {
    /// Authors with any recorded history
    pub total_users: u32,
    /// Authors in an active cooldown
    pub users_in_cooldown: u32,
    /// Authors who posted within the last five minutes
    pub active_users: u32,
    /// Messages retained across all authors within the last five minutes
    pub recent_activity: u32,
    /// Up to five worst offenders by lifetime violation count
    pub top_spammers: Vec<SpammerEntry>,
}

/// Spam admission filter with exclusive ownership of per-user history
#[derive(Debug)]
pub struct SpamFilter {
    users: IndexMap<String, UserHistory>,
    config: SpamConfig,
}

impl SpamFilter {
    /// Create a filter with the given thresholds
    #[must_use]
    pub fn new(config: SpamConfig) -> Self {
        Self {
            users: IndexMap::new(),
            config,
        }
    }

    /// Current thresholds
    #[must_use]
    pub fn config(&self) -> &SpamConfig {
        &self.config
    }

    /// Apply a partial threshold update
    pub fn update_config(&mut self, update: SpamConfigUpdate) {
        if let Some(v) = update.max_messages_per_minute {
            self.config.max_messages_per_minute = v;
        }
        if let Some(v) = update.max_messages_per_five_minutes {
            self.config.max_messages_per_five_minutes = v;
        }
        if let Some(v) = update.duplicate_threshold {
            self.config.duplicate_threshold = v;
        }
        if let Some(v) = update.cooldown_duration {
            self.config.cooldown_duration = v;
        }
        if let Some(v) = update.history_retention {
            self.config.history_retention = v;
        }
        tracing::info!(config = ?self.config, "spam thresholds updated");
    }

    /// Check whether a message from `author` should be admitted now.
    pub fn check(&mut self, author: &str, message: &str) -> Verdict {
        self.check_at(author, message, Utc::now())
    }

    /// Check admission at an explicit point in time.
    ///
    /// Admitted messages are recorded in the author's history; rejected
    /// ones are not. Each detection (rate limit or duplicate, not an
    /// active cooldown) counts one lifetime violation. Cooldowns expire
    /// lazily on the first check after their deadline.
    pub fn check_at(&mut self, author: &str, message: &str, now: DateTime<Utc>) -> Verdict {
        let retention = delta(self.config.history_retention);
        let history = self
            .users
            .entry(author.to_string())
            .or_insert_with(UserHistory::new);

        if history.in_cooldown {
            if let Some(until) = history.cooldown_until {
                if now < until {
                    let remaining = (until - now).num_milliseconds();
                    let remaining_secs = (remaining + 999) / 1000;
                    return Verdict::reject(format!("クールダウン中（残り{remaining_secs}秒）"));
                }
            }
            history.in_cooldown = false;
            history.cooldown_until = None;
            tracing::info!(author, "cooldown expired");
        }

        let cutoff = now - retention;
        history.messages.retain(|m| m.timestamp > cutoff);

        let one_minute_ago = now - TimeDelta::seconds(60);
        let recent = history
            .messages
            .iter()
            .filter(|m| m.timestamp > one_minute_ago)
            .count() as u32;
        if recent >= self.config.max_messages_per_minute {
            history.spam_count += 1;
            return Verdict::reject(format!(
                "1分間のメッセージ制限超過（{recent}/{}）",
                self.config.max_messages_per_minute
            ));
        }

        let retained = history.messages.len() as u32;
        if retained >= self.config.max_messages_per_five_minutes {
            history.spam_count += 1;
            return Verdict::reject(format!(
                "5分間のメッセージ制限超過（{retained}/{}）",
                self.config.max_messages_per_five_minutes
            ));
        }

        let normalized = message.to_lowercase().trim().to_string();
        for past in &history.messages {
            let score = similarity(&normalized, past.content.to_lowercase().trim());
            if score >= self.config.duplicate_threshold {
                history.spam_count += 1;
                let percent = (score * 100.0).round() as u32;
                return Verdict::reject(format!("類似メッセージ検出（類似度: {percent}%）"));
            }
        }

        history.messages.push(TimedMessage {
            content: message.to_string(),
            timestamp: now,
        });
        history.last_message_time = Some(now);

        Verdict::admit()
    }

    /// Put `author` into cooldown for `duration`, starting now.
    pub fn set_cooldown(&mut self, author: &str, duration: Duration) {
        self.set_cooldown_at(author, duration, Utc::now());
    }

    /// Put `author` into cooldown at an explicit point in time.
    ///
    /// Re-arms the timer if the author is already cooling down. Each
    /// call counts as one more lifetime violation.
    pub fn set_cooldown_at(&mut self, author: &str, duration: Duration, now: DateTime<Utc>) {
        let history = self
            .users
            .entry(author.to_string())
            .or_insert_with(UserHistory::new);

        history.in_cooldown = true;
        history.cooldown_until = Some(now + delta(duration));
        history.spam_count += 1;

        tracing::info!(
            author,
            seconds = duration.as_secs(),
            violations = history.spam_count,
            "author placed in cooldown"
        );
    }

    /// Per-author history view (read-only)
    #[must_use]
    pub fn history(&self, author: &str) -> Option<&UserHistory> {
        self.users.get(author)
    }

    /// Delete one author's history, or all history when `author` is `None`.
    ///
    /// Returns a human-readable confirmation.
    pub fn reset(&mut self, author: Option<&str>) -> String {
        match author {
            Some(name) => {
                if self.users.shift_remove(name).is_some() {
                    tracing::info!(author = name, "spam history reset");
                    format!("{name} のスパム履歴をリセットしました")
                } else {
                    format!("{name} の履歴が見つかりません")
                }
            }
            None => {
                let count = self.users.len();
                self.users.clear();
                tracing::info!(count, "all spam history reset");
                format!("全ユーザー（{count}人）のスパム履歴をリセットしました")
            }
        }
    }

    /// Aggregate statistics over tracked authors.
    #[must_use]
    pub fn statistics(&self) -> SpamStatistics {
        self.statistics_at(Utc::now())
    }

    /// Aggregate statistics at an explicit point in time.
    #[must_use]
    pub fn statistics_at(&self, now: DateTime<Utc>) -> SpamStatistics {
        let five_minutes_ago = now - TimeDelta::seconds(300);
        let mut stats = SpamStatistics {
            total_users: self.users.len() as u32,
            users_in_cooldown: 0,
            active_users: 0,
            recent_activity: 0,
            top_spammers: Vec::new(),
        };

        let mut offenders: Vec<SpammerEntry> = Vec::new();
        for (author, history) in &self.users {
            if history.in_cooldown_at(now) {
                stats.users_in_cooldown += 1;
            }
            if history
                .last_message_time
                .is_some_and(|t| t > five_minutes_ago)
            {
                stats.active_users += 1;
            }
            stats.recent_activity += history
                .messages
                .iter()
                .filter(|m| m.timestamp > five_minutes_ago)
                .count() as u32;

            if history.spam_count > 0 {
                offenders.push(SpammerEntry {
                    author: author.clone(),
                    spam_count: history.spam_count,
                    last_message: history.last_message_time,
                    in_cooldown: history.in_cooldown_at(now),
                });
            }
        }

        // Stable sort keeps insertion order among equal counts
        offenders.sort_by(|a, b| b.spam_count.cmp(&a.spam_count));
        offenders.truncate(5);
        stats.top_spammers = offenders;

        stats
    }
}

fn delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> SpamFilter {
        SpamFilter::new(SpamConfig::default())
    }

    fn at(base: DateTime<Utc>, offset_ms: i64) -> DateTime<Utc> {
        base + TimeDelta::milliseconds(offset_ms)
    }

    #[test]
    fn distinct_messages_admitted_up_to_minute_limit() {
        let mut f = filter();
        let base = Utc::now();

        let messages = [
            "good evening everyone",
            "the weather is nice today",
            "what game is this",
            "first time watching this stream",
            "そのボス強すぎる",
        ];
        for (i, msg) in messages.iter().enumerate() {
            let verdict = f.check_at("alice", msg, at(base, i as i64 * 1000));
            assert!(!verdict.is_spam, "message {i} rejected: {:?}", verdict.reason);
        }

        let sixth = f.check_at("alice", "another different text", at(base, 5000));
        assert!(sixth.is_spam);
        assert!(sixth.reason.unwrap().contains("5"));
    }

    #[test]
    fn duplicate_message_rejected() {
        let mut f = filter();
        let base = Utc::now();

        assert!(!f.check_at("bob", "hello everyone", base).is_spam);
        let second = f.check_at("bob", "hello everyone", at(base, 1000));
        assert!(second.is_spam);
        assert!(second.reason.unwrap().contains("類似"));
    }

    #[test]
    fn near_duplicate_rejected_at_threshold() {
        let mut f = filter();
        let base = Utc::now();

        assert!(!f.check_at("bob", "hello everyone!!", base).is_spam);
        // Case and surrounding whitespace are normalized away
        assert!(f.check_at("bob", "  HELLO everyone!! ", at(base, 1000)).is_spam);
    }

    #[test]
    fn history_pruned_after_retention_window() {
        let mut f = filter();
        let base = Utc::now();

        assert!(!f.check_at("carol", "first message here", base).is_spam);
        // Same text well past the retention window is admitted again
        let later = at(base, 301_000);
        assert!(!f.check_at("carol", "first message here", later).is_spam);
    }

    #[test]
    fn cooldown_rejects_until_deadline() {
        let mut f = filter();
        let base = Utc::now();

        f.set_cooldown_at("dave", Duration::from_millis(1000), base);

        let during = f.check_at("dave", "am i back yet", at(base, 500));
        assert!(during.is_spam);
        assert!(during.reason.unwrap().contains("クールダウン"));

        let after = f.check_at("dave", "am i back yet", at(base, 1001));
        assert!(!after.is_spam);
        assert!(!f.history("dave").unwrap().in_cooldown_at(at(base, 1001)));
    }

    #[test]
    fn set_cooldown_rearms_and_counts_violations() {
        let mut f = filter();
        let base = Utc::now();

        f.set_cooldown_at("eve", Duration::from_secs(30), base);
        f.set_cooldown_at("eve", Duration::from_secs(60), at(base, 1000));

        let history = f.history("eve").unwrap();
        assert_eq!(history.spam_count(), 2);
        assert!(history.in_cooldown_at(at(base, 45_000)));
    }

    #[test]
    fn empty_message_still_rate_checked() {
        let mut f = filter();
        let base = Utc::now();

        assert!(!f.check_at("frank", "", base).is_spam);
        // Identical empty message is a perfect duplicate
        assert!(f.check_at("frank", "", at(base, 1000)).is_spam);
    }

    #[test]
    fn reset_single_author() {
        let mut f = filter();
        f.check("alice", "hello there friends");

        let msg = f.reset(Some("alice"));
        assert!(msg.contains("alice"));
        assert!(f.history("alice").is_none());

        let missing = f.reset(Some("nobody"));
        assert!(missing.contains("見つかりません"));
    }

    #[test]
    fn reset_all_reports_count() {
        let mut f = filter();
        f.check("alice", "first unique message");
        f.check("bob", "second unique message");

        let msg = f.reset(None);
        assert!(msg.contains('2'));
        assert_eq!(f.statistics().total_users, 0);
    }

    #[test]
    fn statistics_counts_and_top_spammers() {
        let mut f = filter();
        let base = Utc::now();

        f.check_at("alice", "totally normal message", base);
        f.set_cooldown_at("bob", Duration::from_secs(60), base);
        f.set_cooldown_at("bob", Duration::from_secs(60), base);
        f.set_cooldown_at("carol", Duration::from_secs(60), base);

        let stats = f.statistics_at(at(base, 1000));
        assert_eq!(stats.total_users, 3);
        assert_eq!(stats.users_in_cooldown, 2);
        assert_eq!(stats.active_users, 1);
        assert_eq!(stats.recent_activity, 1);

        assert_eq!(stats.top_spammers.len(), 2);
        assert_eq!(stats.top_spammers[0].author, "bob");
        assert_eq!(stats.top_spammers[0].spam_count, 2);
        assert!(stats.top_spammers[0].in_cooldown);
    }

    #[test]
    fn top_spammer_ties_keep_insertion_order() {
        let mut f = filter();
        let base = Utc::now();

        for name in ["first", "second", "third"] {
            f.set_cooldown_at(name, Duration::from_secs(1), base);
        }

        let stats = f.statistics_at(base);
        let names: Vec<&str> = stats.top_spammers.iter().map(|e| e.author.as_str()).collect();
        assert_eq!(names, ["first", "second", "third"]);
    }

    #[test]
    fn rejections_count_lifetime_violations() {
        let mut f = filter();
        let base = Utc::now();

        assert!(!f.check_at("hank", "same text", base).is_spam);
        assert!(f.check_at("hank", "same text", at(base, 1000)).is_spam);
        assert!(f.check_at("hank", "same text", at(base, 2000)).is_spam);

        assert_eq!(f.history("hank").unwrap().spam_count(), 2);
    }

    #[test]
    fn update_config_is_partial() {
        let mut f = filter();
        f.update_config(SpamConfigUpdate {
            max_messages_per_minute: Some(2),
            ..SpamConfigUpdate::default()
        });

        assert_eq!(f.config().max_messages_per_minute, 2);
        assert_eq!(f.config().max_messages_per_five_minutes, 15);

        let base = Utc::now();
        assert!(!f.check_at("gail", "message one here", base).is_spam);
        assert!(!f.check_at("gail", "entirely other text", at(base, 1000)).is_spam);
        assert!(f.check_at("gail", "yet another thing said", at(base, 2000)).is_spam);
    }
}
