//! AI backend capability
//!
//! The pipeline sees the generative backend as an injected trait with
//! explicit success/failure results, so tests run against a fake. The
//! real implementation is a thin `OpenAI` chat-completions client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::reward::RewardTone;
use crate::{Error, Result};

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Chat role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One prompt turn
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    /// Speaker role
    pub role: Role,
    /// Turn text
    pub content: String,
}

impl ChatMessage {
    /// Build a message from role and text
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A text-generation request assembled by the pipeline
#[derive(Debug, Clone)]
pub struct TextRequest {
    /// User message text
    pub user_text: String,
    /// Resolved calling-name hint, if any
    pub name_hint: Option<String>,
    /// Metric hint line for the system prompt
    pub metric_hint: String,
    /// Planned reward tone
    pub tone: RewardTone,
    /// Prior turns, oldest-to-newest
    pub history: Vec<ChatMessage>,
}

/// A vision request for an inbound image
#[derive(Debug, Clone)]
pub struct VisionRequest {
    /// Image payload as a `data:` URL
    pub data_url: String,
    /// Resolved calling-name hint, if any
    pub name_hint: Option<String>,
    /// Planned reward tone
    pub tone: RewardTone,
    /// Prior turns, oldest-to-newest
    pub history: Vec<ChatMessage>,
}

/// Generative backend operations.
///
/// `chat_text` and `chat_vision` fail loudly (including status-carrying
/// errors for rate-limit handling); `guess_given_name` swallows every
/// failure into `None` because it only feeds a cached hint.
#[async_trait]
pub trait AiCapability: Send + Sync {
    /// Generate a reply to a text message.
    ///
    /// # Errors
    ///
    /// Returns error if the backend call fails; rate limiting carries
    /// the status so the caller can apologize distinctly.
    async fn chat_text(&self, request: TextRequest) -> Result<String>;

    /// Generate a reply to an image message.
    ///
    /// # Errors
    ///
    /// Returns error if the backend call fails.
    async fn chat_vision(&self, request: VisionRequest) -> Result<String>;

    /// Extract a likely calling name from a platform display name
    async fn guess_given_name(&self, display_name: &str) -> Option<String>;
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

/// Real `OpenAI` chat-completions client
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    /// Create a client for the given API key and model
    #[must_use]
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            model,
        }
    }

    /// POST a chat-completion body and extract the first choice's text.
    ///
    /// Non-success statuses become `Error::AiStatus` so the caller can
    /// distinguish rate limiting; a malformed body is a loud error,
    /// never a silent empty reply.
    async fn complete(&self, body: serde_json::Value) -> Result<String> {
        let response = self
            .http
            .post(OPENAI_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Ai(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::AiStatus {
                status: status.as_u16(),
                message: body.chars().take(180).collect(),
            });
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Ai(format!("malformed completion body: {e}")))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::Ai("completion carried no content".to_string()))?;
        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl AiCapability for OpenAiClient {
    async fn chat_text(&self, request: TextRequest) -> Result<String> {
        let days = crate::metrics::days_until_race(chrono::Utc::now());
        let system =
            crate::prompt::build_system_prompt(request.name_hint.as_deref(), request.tone, days);

        let mut messages = vec![
            serde_json::json!({ "role": "system", "content": system }),
            serde_json::json!({ "role": "system", "content": request.metric_hint }),
        ];
        for msg in &request.history {
            messages.push(serde_json::to_value(msg)?);
        }
        messages.push(serde_json::json!({ "role": "user", "content": request.user_text }));

        self.complete(serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": 160,
            "temperature": 0.7,
        }))
        .await
    }

    async fn chat_vision(&self, request: VisionRequest) -> Result<String> {
        let days = crate::metrics::days_until_race(chrono::Utc::now());
        let system =
            crate::prompt::build_system_prompt(request.name_hint.as_deref(), request.tone, days);

        let mut messages = vec![serde_json::json!({ "role": "system", "content": system })];
        for msg in &request.history {
            messages.push(serde_json::to_value(msg)?);
        }
        messages.push(serde_json::json!({
            "role": "user",
            "content": [
                { "type": "text", "text": crate::prompt::VISION_INSTRUCTION },
                { "type": "image_url", "image_url": { "url": request.data_url } },
            ],
        }));

        self.complete(serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": 160,
            "temperature": 0.7,
        }))
        .await
    }

    async fn guess_given_name(&self, display_name: &str) -> Option<String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": 0,
            "max_tokens": 16,
            "messages": [
                { "role": "system", "content": crate::prompt::NAME_GUESS_INSTRUCTION },
                { "role": "user", "content": display_name },
            ],
        });

        let raw = match self.complete(body).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!(error = %e, "name guess request failed");
                return None;
            }
        };

        parse_given_name(&raw)
    }
}

/// Parse the strict-JSON name-guess reply; any deviation is `None`
#[must_use]
pub fn parse_given_name(raw: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct Guess {
        given_name: Option<String>,
    }

    let guess: Guess = serde_json::from_str(raw.trim()).ok()?;
    guess
        .given_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_strict_name_guess() {
        assert_eq!(
            parse_given_name(r#"{"given_name":"太郎"}"#),
            Some("太郎".to_string())
        );
        assert_eq!(parse_given_name(r#"{"given_name":null}"#), None);
        assert_eq!(parse_given_name(r#"{"given_name":"  "}"#), None);
    }

    #[test]
    fn malformed_name_guess_is_none() {
        assert_eq!(parse_given_name("太郎"), None);
        assert_eq!(parse_given_name("```json\n{\"given_name\":\"a\"}\n```"), None);
        assert_eq!(parse_given_name(""), None);
    }

    #[test]
    fn chat_messages_serialize_with_lowercase_roles() {
        let msg = ChatMessage::new(Role::Assistant, "おつかれ！");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"], "おつかれ！");
    }
}
