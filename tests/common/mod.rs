//! Shared test utilities

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use pacebot::ai::AiCapability;
use pacebot::line::{LinePlatform, OutgoingMessage, Source, signature};
use pacebot::memory::{self, ConversationRepo};
use pacebot::mention::MentionGrace;
use pacebot::name::NameHintResolver;
use pacebot::reward::RewardPool;
use pacebot::{ApiState, Config, Error, Result};

pub const TEST_SECRET: &str = "test-channel-secret";

/// Platform fake that records replies instead of calling out
#[derive(Default)]
pub struct FakePlatform {
    /// `(reply_token, messages)` pairs, in reply order
    pub replies: Mutex<Vec<(String, Vec<OutgoingMessage>)>>,
    /// Display name returned for any profile lookup
    pub display_name: Option<String>,
    /// Bytes returned for message content fetches; `None` fails the fetch
    pub content: Option<Vec<u8>>,
}

#[async_trait]
impl LinePlatform for FakePlatform {
    async fn reply(&self, reply_token: &str, messages: &[OutgoingMessage]) -> Result<()> {
        self.replies
            .lock()
            .unwrap()
            .push((reply_token.to_string(), messages.to_vec()));
        Ok(())
    }

    async fn display_name(&self, _source: &Source) -> Option<String> {
        self.display_name.clone()
    }

    async fn bot_user_id(&self) -> Option<String> {
        Some("bot-user-id".to_string())
    }

    async fn message_content(&self, _message_id: &str) -> Result<Vec<u8>> {
        self.content
            .clone()
            .ok_or_else(|| Error::Platform("no content scripted".to_string()))
    }
}

impl FakePlatform {
    /// Replies recorded so far
    pub fn recorded(&self) -> Vec<(String, Vec<OutgoingMessage>)> {
        self.replies.lock().unwrap().clone()
    }
}

/// AI fake returning a scripted reply or a scripted failure
pub struct FakeAi {
    /// Reply text for chat calls
    pub reply: String,
    /// When true, chat calls fail with a 429 status error
    pub rate_limited: bool,
}

impl FakeAi {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            rate_limited: false,
        }
    }
}

#[async_trait]
impl AiCapability for FakeAi {
    async fn chat_text(&self, _request: pacebot::ai::TextRequest) -> Result<String> {
        if self.rate_limited {
            return Err(Error::AiStatus {
                status: 429,
                message: "rate limited".to_string(),
            });
        }
        Ok(self.reply.clone())
    }

    async fn chat_vision(&self, _request: pacebot::ai::VisionRequest) -> Result<String> {
        if self.rate_limited {
            return Err(Error::AiStatus {
                status: 429,
                message: "rate limited".to_string(),
            });
        }
        Ok(self.reply.clone())
    }

    async fn guess_given_name(&self, _display_name: &str) -> Option<String> {
        None
    }
}

/// Configuration for tests: mention-only, no ambient rewards, pool
/// pointed at `rewards_dir`
#[must_use]
pub fn test_config(rewards_dir: PathBuf) -> Config {
    Config {
        channel_secret: TEST_SECRET.to_string(),
        channel_access_token: "test-token".to_string(),
        openai_api_key: "test-key".to_string(),
        openai_model: "test-model".to_string(),
        base_url: "https://pacebot.test".to_string(),
        rewards_dir,
        db_path: PathBuf::from(":memory:"),
        mention_only: true,
        mention_keywords: vec!["ひとみ".to_string()],
        reward_random_rate: 0.0,
        reward_on_request_rate: 0.0,
        mention_grace: Duration::from_secs(60),
        history_max_turns: 10,
        history_ttl: Duration::from_secs(604_800),
        history_compact_chars: None,
        name_cache_ttl: Duration::from_secs(86_400),
    }
}

/// Build a router over fakes, returning handles for assertions
#[must_use]
pub fn build_test_app(
    config: Config,
    platform: Arc<FakePlatform>,
    ai: Arc<FakeAi>,
) -> (axum::Router, ConversationRepo) {
    let pool = memory::init_memory().expect("failed to init test db");
    let conversations =
        ConversationRepo::new(pool, config.history_max_turns, config.history_ttl);
    let rewards = RewardPool::new(config.rewards_dir.clone(), config.base_url.clone());
    let names = NameHintResolver::new(config.name_cache_ttl);
    let grace = Mutex::new(MentionGrace::new(config.mention_grace));

    let state = Arc::new(ApiState {
        config,
        platform,
        ai,
        conversations: conversations.clone(),
        names,
        grace,
        rewards,
    });

    (pacebot::api::router(state), conversations)
}

/// A signed `POST /webhook` request over `body`
#[must_use]
pub fn signed_webhook(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json")
        .header(
            signature::SIGNATURE_HEADER,
            signature::sign(TEST_SECRET, body.as_bytes()),
        )
        .body(Body::from(body.to_string()))
        .expect("valid request")
}

/// A minimal text-message event batch from a 1:1 chat
#[must_use]
pub fn dm_text_batch(user_id: &str, reply_token: &str, text: &str) -> String {
    serde_json::json!({
        "destination": "bot-user-id",
        "events": [{
            "type": "message",
            "replyToken": reply_token,
            "source": { "type": "user", "userId": user_id },
            "message": { "type": "text", "id": "m-1", "text": text },
            "deliveryContext": { "isRedelivery": false },
            "timestamp": 1_700_000_000_000_i64,
        }]
    })
    .to_string()
}

/// A text-message event batch from a group chat
#[must_use]
pub fn group_text_batch(group_id: &str, user_id: &str, reply_token: &str, text: &str) -> String {
    serde_json::json!({
        "destination": "bot-user-id",
        "events": [{
            "type": "message",
            "replyToken": reply_token,
            "source": { "type": "group", "groupId": group_id, "userId": user_id },
            "message": { "type": "text", "id": "m-1", "text": text },
            "deliveryContext": { "isRedelivery": false },
            "timestamp": 1_700_000_000_000_i64,
        }]
    })
    .to_string()
}

/// An image-message event batch from a group chat
#[must_use]
pub fn group_image_batch(group_id: &str, user_id: &str, reply_token: &str) -> String {
    serde_json::json!({
        "destination": "bot-user-id",
        "events": [{
            "type": "message",
            "replyToken": reply_token,
            "source": { "type": "group", "groupId": group_id, "userId": user_id },
            "message": { "type": "image", "id": "img-1" },
            "deliveryContext": { "isRedelivery": false },
            "timestamp": 1_700_000_000_000_i64,
        }]
    })
    .to_string()
}
