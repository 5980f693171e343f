//! LINE Messaging API client
//!
//! The pipeline talks to the platform through the [`LinePlatform`]
//! trait so tests can substitute a fake; [`LineClient`] is the real
//! reqwest-backed implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::Source;
use crate::{Error, Result};

const API_URL: &str = "https://api.line.me/v2/bot";
const DATA_API_URL: &str = "https://api-data.line.me/v2/bot";

/// An outbound reply part
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutgoingMessage {
    /// Plain text
    #[serde(rename = "text")]
    Text {
        /// Message text
        text: String,
    },
    /// Image by URL pair
    #[serde(rename = "image", rename_all = "camelCase")]
    Image {
        /// Full-size asset URL
        original_content_url: String,
        /// Preview asset URL
        preview_image_url: String,
    },
}

impl OutgoingMessage {
    /// Convenience constructor for a text part
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Messaging platform operations the pipeline depends on.
///
/// Profile and bot-info lookups fail open (`None`) since addressing
/// and name hints degrade gracefully without them; reply and content
/// download surface errors for the pipeline's error taxonomy.
#[async_trait]
pub trait LinePlatform: Send + Sync {
    /// Send one or two message parts via a reply token.
    ///
    /// Reply tokens are short-lived; a failure here is terminal for
    /// the event and is never retried.
    ///
    /// # Errors
    ///
    /// Returns error if the platform rejects the reply (including an
    /// expired token).
    async fn reply(&self, reply_token: &str, messages: &[OutgoingMessage]) -> Result<()>;

    /// Display name of the event sender, per source type
    async fn display_name(&self, source: &Source) -> Option<String>;

    /// The bot's own user ID, cached after first successful lookup
    async fn bot_user_id(&self) -> Option<String>;

    /// Download raw message content (image bytes).
    ///
    /// # Errors
    ///
    /// Returns error if the content cannot be fetched.
    async fn message_content(&self, message_id: &str) -> Result<Vec<u8>>;
}

/// Profile payload common to user/member lookups
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Profile {
    display_name: Option<String>,
}

/// Bot info payload
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BotInfo {
    user_id: String,
}

/// Reply request body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    reply_token: &'a str,
    messages: &'a [OutgoingMessage],
}

/// Real LINE Messaging API client
pub struct LineClient {
    http: reqwest::Client,
    access_token: String,
    bot_user_id: RwLock<Option<String>>,
}

impl LineClient {
    /// Create a client from a channel access token
    #[must_use]
    pub fn new(access_token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            access_token,
            bot_user_id: RwLock::new(None),
        }
    }

    async fn fetch_profile(&self, path: &str) -> Option<String> {
        let response = self
            .http
            .get(format!("{API_URL}/{path}"))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            tracing::debug!(path, status = %response.status(), "profile lookup failed");
            return None;
        }

        response.json::<Profile>().await.ok()?.display_name
    }
}

#[async_trait]
impl LinePlatform for LineClient {
    async fn reply(&self, reply_token: &str, messages: &[OutgoingMessage]) -> Result<()> {
        let request = ReplyRequest {
            reply_token,
            messages,
        };

        let response = self
            .http
            .post(format!("{API_URL}/message/reply"))
            .bearer_auth(&self.access_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Platform(format!("reply request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Platform(format!(
                "reply rejected ({status}): {}",
                truncate(&body, 180)
            )));
        }

        tracing::debug!(parts = messages.len(), "reply sent");
        Ok(())
    }

    async fn display_name(&self, source: &Source) -> Option<String> {
        match source {
            Source::User {
                user_id: Some(uid), ..
            } => self.fetch_profile(&format!("profile/{uid}")).await,
            Source::Group {
                group_id: Some(gid),
                user_id: Some(uid),
            } => {
                self.fetch_profile(&format!("group/{gid}/member/{uid}"))
                    .await
            }
            Source::Room {
                room_id: Some(rid),
                user_id: Some(uid),
            } => self.fetch_profile(&format!("room/{rid}/member/{uid}")).await,
            _ => None,
        }
    }

    async fn bot_user_id(&self) -> Option<String> {
        if let Some(id) = self.bot_user_id.read().await.clone() {
            return Some(id);
        }

        let response = self
            .http
            .get(format!("{API_URL}/info"))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            tracing::debug!(status = %response.status(), "bot info lookup failed");
            return None;
        }

        let info: BotInfo = response.json().await.ok()?;
        *self.bot_user_id.write().await = Some(info.user_id.clone());
        Some(info.user_id)
    }

    async fn message_content(&self, message_id: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(format!("{DATA_API_URL}/message/{message_id}/content"))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| Error::Content(format!("content request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Content(format!(
                "content fetch rejected ({})",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Content(format!("content body read failed: {e}")))?;
        Ok(bytes.to_vec())
    }
}

/// Truncate to a character boundary for log/error hygiene
fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
