//! AI persona reply generation
//!
//! The [`Completion`] trait is the boundary to the chat-completion API;
//! [`ChatCompletionClient`] is the OpenAI-compatible implementation.
//! When the upstream call fails past retries the pipeline falls back to
//! a deterministic persona-flavored apology chosen by failure category.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Chat-completion failure taxonomy
#[derive(Debug, Error)]
pub enum CompletionError {
    /// No API key configured; never retried
    #[error("API key is not configured")]
    MissingKey,

    /// Credential rejected (401); never retried
    #[error("unauthorized")]
    Unauthorized,

    /// Rate limited (429); retryable
    #[error("rate limited")]
    RateLimited,

    /// Service temporarily unavailable (503); retryable
    #[error("service unavailable")]
    Unavailable,

    /// Requested model does not exist
    #[error("model not found")]
    ModelNotFound,

    /// Could not reach the service at all
    #[error("network unreachable: {0}")]
    Network(String),

    /// Anything else
    #[error("{0}")]
    Other(String),
}

impl CompletionError {
    /// Whether a retry may help
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Unavailable)
    }
}

/// Generates a persona reply from prompts (external LLM boundary)
#[async_trait]
pub trait Completion: Send + Sync {
    /// Produce the reply text for the given prompts
    async fn complete(&self, system: &str, user: &str)
        -> Result<String, CompletionError>;
}

/// Base persona description; the free-text personality is appended
fn base_system_prompt(persona: &str) -> String {
    format!(
        "あなたは「{persona}」という名前の可愛いVTuberアシスタントです。以下の特徴を持ってください：\n\
         - 親しみやすく、明るい口調で話す\n\
         - 日本語で返答する\n\
         - 簡潔で自然な会話を心がける\n\
         - ライブチャットでの返答なので、短めに（50文字以内）\n\
         - 絵文字を適度に使う\n\
         - 「{persona}」と呼ばれたら嬉しそうに反応する"
    )
}

/// Build the system prompt from the persona name and optional free-text
/// personality additions.
#[must_use]
pub fn build_system_prompt(persona: &str, personality: &str) -> String {
    let mut prompt = base_system_prompt(persona);
    let extra = personality.trim();
    if !extra.is_empty() {
        prompt.push_str("\n\n追加の性格設定：\n");
        prompt.push_str(extra);
    }
    prompt
}

/// Build the user prompt quoting the chat message
#[must_use]
pub fn build_user_prompt(persona: &str, author: &str, message: &str) -> String {
    format!("{author}さんが「{message}」と言いました。{persona}として返答してください。")
}

/// Deterministic apology used when reply generation fails for good.
///
/// The wording depends on the failure category so streamers can tell an
/// expired key from a flaky network at a glance.
#[must_use]
pub fn fallback_reply(persona: &str, author: &str, error: &CompletionError) -> String {
    let suffix = match error {
        CompletionError::MissingKey => {
            " API Keyが設定されていないので、AI応答機能を使用できません。設定で API Key を入力してください。"
        }
        CompletionError::Unauthorized => " API Keyが無効かも...",
        CompletionError::RateLimited => " ちょっと忙しくて...",
        CompletionError::Unavailable => " サーバーが混雑してるみたい...",
        CompletionError::ModelNotFound => " モデルが見つからないみたい...",
        CompletionError::Network(_) => " インターネット接続を確認してね...",
        CompletionError::Other(_) => " 今ちょっと調子が悪いみたい...",
    };
    format!("{author}さん、{persona}です！😊{suffix}")
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// OpenAI-compatible chat-completion client
#[derive(Debug, Clone)]
pub struct ChatCompletionClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
}

impl ChatCompletionClient {
    /// Default API endpoint
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";

    /// Create a client; the key may be empty, in which case every call
    /// fails fast with [`CompletionError::MissingKey`].
    #[must_use]
    pub fn new(api_key: String, model: String, max_tokens: u32, temperature: f64) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            model,
            max_tokens,
            temperature,
        }
    }

    /// Override the API base URL (for compatible gateways)
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Completion for ChatCompletionClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, CompletionError> {
        if self.api_key.is_empty() {
            return Err(CompletionError::MissingKey);
        }

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    CompletionError::Network(e.to_string())
                } else {
                    CompletionError::Other(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status.as_u16(), &body));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::Other(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| CompletionError::Other("response contained no choices".to_string()))
    }
}

/// Map an HTTP failure to the completion error taxonomy
fn classify_failure(status: u16, body: &str) -> CompletionError {
    let code = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .and_then(|e| e.code.or(e.message));

    if code.as_deref().is_some_and(|c| c.contains("model_not_found")) {
        return CompletionError::ModelNotFound;
    }

    match status {
        401 => CompletionError::Unauthorized,
        429 => CompletionError::RateLimited,
        503 => CompletionError::Unavailable,
        _ => CompletionError::Other(format!("upstream returned status {status}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(CompletionError::RateLimited.is_transient());
        assert!(CompletionError::Unavailable.is_transient());
        assert!(!CompletionError::Unauthorized.is_transient());
        assert!(!CompletionError::MissingKey.is_transient());
        assert!(!CompletionError::Network("x".to_string()).is_transient());
    }

    #[test]
    fn status_codes_classified() {
        assert!(matches!(classify_failure(401, ""), CompletionError::Unauthorized));
        assert!(matches!(classify_failure(429, ""), CompletionError::RateLimited));
        assert!(matches!(classify_failure(503, ""), CompletionError::Unavailable));
        assert!(matches!(classify_failure(500, ""), CompletionError::Other(_)));
    }

    #[test]
    fn model_not_found_from_body() {
        let body = r#"{"error":{"code":"model_not_found","message":"no such model"}}"#;
        assert!(matches!(
            classify_failure(404, body),
            CompletionError::ModelNotFound
        ));
    }

    #[test]
    fn fallback_wording_varies_by_category() {
        let auth = fallback_reply("こもち", "alice", &CompletionError::Unauthorized);
        let busy = fallback_reply("こもち", "alice", &CompletionError::RateLimited);
        let net = fallback_reply("こもち", "alice", &CompletionError::Network("down".into()));

        assert!(auth.starts_with("aliceさん、こもちです！"));
        assert_ne!(auth, busy);
        assert_ne!(busy, net);
        assert!(net.contains("インターネット"));
    }

    #[test]
    fn system_prompt_includes_personality() {
        let plain = build_system_prompt("こもち", "");
        let custom = build_system_prompt("こもち", "ゲームが大好き");

        assert!(plain.contains("こもち"));
        assert!(!plain.contains("追加の性格設定"));
        assert!(custom.contains("追加の性格設定"));
        assert!(custom.contains("ゲームが大好き"));
    }

    #[test]
    fn user_prompt_quotes_message() {
        let prompt = build_user_prompt("こもち", "alice", "こんにちは");
        assert!(prompt.contains("alice"));
        assert!(prompt.contains("「こんにちは」"));
        assert!(prompt.ends_with("こもちとして返答してください。"));
    }

    #[tokio::test]
    async fn missing_key_fails_without_network() {
        let client = ChatCompletionClient::new(String::new(), "gpt-4.1-nano".to_string(), 100, 0.8);
        let result = client.complete("system", "user").await;
        assert!(matches!(result, Err(CompletionError::MissingKey)));
    }
}
