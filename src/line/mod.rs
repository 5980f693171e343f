//! LINE Messaging API integration
//!
//! Webhook event model, conversation key derivation, signature
//! verification, and the reqwest-backed platform client.

pub mod client;
pub mod signature;

pub use client::{LineClient, LinePlatform, OutgoingMessage};

use serde::{Deserialize, Serialize};

/// A webhook request body: a batch of events
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookBatch {
    /// Bot user ID the batch was delivered to
    #[serde(default)]
    pub destination: Option<String>,
    /// Events in this delivery
    #[serde(default)]
    pub events: Vec<WebhookEvent>,
}

/// A single webhook event
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WebhookEvent {
    /// An inbound message
    #[serde(rename = "message")]
    Message(MessageEvent),
    /// Event kinds we don't handle (follow, join, postback, ...)
    #[serde(other)]
    Other,
}

/// An inbound message event
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    /// Short-lived handle for replying to this event
    pub reply_token: Option<String>,
    /// Where the message came from
    pub source: Source,
    /// The message payload
    pub message: MessageContent,
    /// Platform redelivery marker
    #[serde(default)]
    pub delivery_context: Option<DeliveryContext>,
    /// Event timestamp (milliseconds)
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl MessageEvent {
    /// Whether the platform flagged this event as a redelivery
    #[must_use]
    pub fn is_redelivery(&self) -> bool {
        self.delivery_context
            .as_ref()
            .is_some_and(|dc| dc.is_redelivery)
    }
}

/// Delivery context carrying the redelivery flag
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryContext {
    /// True when the platform is re-sending a previously delivered event
    #[serde(default)]
    pub is_redelivery: bool,
}

/// Event source descriptor
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Source {
    /// 1:1 chat with a user
    #[serde(rename = "user", rename_all = "camelCase")]
    User {
        /// Stable user identifier
        user_id: Option<String>,
    },
    /// Group chat
    #[serde(rename = "group", rename_all = "camelCase")]
    Group {
        /// Stable group identifier
        group_id: Option<String>,
        /// Sender within the group
        user_id: Option<String>,
    },
    /// Multi-person room
    #[serde(rename = "room", rename_all = "camelCase")]
    Room {
        /// Stable room identifier
        room_id: Option<String>,
        /// Sender within the room
        user_id: Option<String>,
    },
}

impl Source {
    /// Whether this is a 1:1 chat (always addressed)
    #[must_use]
    pub const fn is_direct(&self) -> bool {
        matches!(self, Self::User { .. })
    }

    /// Sender user ID, when the platform provided one
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::User { user_id }
            | Self::Group { user_id, .. }
            | Self::Room { user_id, .. } => user_id.as_deref(),
        }
    }

    /// Conversation history key, scoped so one user's group turns are
    /// never visible when resolving another user's turns in the same
    /// group.
    ///
    /// `dm:<user>` / `grp:<group>:u:<user>` / `room:<room>:u:<user>`;
    /// `"unknown"` when identifiers are missing.
    #[must_use]
    pub fn conversation_key(&self) -> String {
        match self {
            Self::User {
                user_id: Some(uid), ..
            } => format!("dm:{uid}"),
            Self::Group {
                group_id: Some(gid),
                user_id: Some(uid),
            } => format!("grp:{gid}:u:{uid}"),
            Self::Room {
                room_id: Some(rid),
                user_id: Some(uid),
            } => format!("room:{rid}:u:{uid}"),
            _ => "unknown".to_string(),
        }
    }

    /// Mention-grace scope key; `None` when identifiers are missing so
    /// the grace map never matches such events.
    #[must_use]
    pub fn scope_key(&self) -> Option<String> {
        match self {
            Self::User {
                user_id: Some(uid), ..
            } => Some(format!("user:{uid}")),
            Self::Group {
                group_id: Some(gid),
                user_id: Some(uid),
            } => Some(format!("group:{gid}:u:{uid}")),
            Self::Room {
                room_id: Some(rid),
                user_id: Some(uid),
            } => Some(format!("room:{rid}:u:{uid}")),
            _ => None,
        }
    }
}

/// Message payload
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MessageContent {
    /// Text payload, possibly with structured mentions
    #[serde(rename = "text", rename_all = "camelCase")]
    Text {
        /// Message ID
        #[serde(default)]
        id: Option<String>,
        /// Message text
        text: String,
        /// Structured mention metadata
        #[serde(default)]
        mention: Option<Mention>,
    },
    /// Image payload; bytes are fetched separately via the content API
    #[serde(rename = "image", rename_all = "camelCase")]
    Image {
        /// Message ID for content download
        id: String,
    },
    /// Payload kinds we silently ignore
    #[serde(other)]
    Other,
}

/// Structured mention metadata on a text message
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Mention {
    /// Mentioned entities
    #[serde(default)]
    pub mentionees: Vec<Mentionee>,
}

/// A single mentioned entity
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Mentionee {
    /// `"user"` or `"all"`
    #[serde(rename = "type")]
    pub kind: String,
    /// Mentioned user ID (present for `"user"` mentions)
    #[serde(default)]
    pub user_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group_source(gid: &str, uid: &str) -> Source {
        Source::Group {
            group_id: Some(gid.to_string()),
            user_id: Some(uid.to_string()),
        }
    }

    #[test]
    fn conversation_keys_are_privacy_scoped() {
        let dm = Source::User {
            user_id: Some("U1".to_string()),
        };
        assert_eq!(dm.conversation_key(), "dm:U1");

        let a = group_source("G1", "U1");
        let b = group_source("G1", "U2");
        assert_eq!(a.conversation_key(), "grp:G1:u:U1");
        assert_ne!(a.conversation_key(), b.conversation_key());

        // DM and group keys for the same user are always distinct
        assert_ne!(dm.conversation_key(), a.conversation_key());
    }

    #[test]
    fn missing_identifiers_fall_back() {
        let partial = Source::Group {
            group_id: Some("G1".to_string()),
            user_id: None,
        };
        assert_eq!(partial.conversation_key(), "unknown");
        assert_eq!(partial.scope_key(), None);
    }

    #[test]
    fn parses_text_event_with_mention() {
        let json = serde_json::json!({
            "type": "message",
            "replyToken": "rt-1",
            "timestamp": 1_700_000_000_000_i64,
            "source": { "type": "group", "groupId": "G1", "userId": "U1" },
            "message": {
                "type": "text",
                "id": "m-1",
                "text": "@bot おはよう",
                "mention": { "mentionees": [
                    { "type": "user", "index": 0, "length": 4, "userId": "BOT" }
                ]}
            },
            "deliveryContext": { "isRedelivery": false }
        });

        let event: WebhookEvent = serde_json::from_value(json).unwrap();
        let WebhookEvent::Message(msg) = event else {
            panic!("expected message event");
        };
        assert!(!msg.is_redelivery());
        assert_eq!(msg.reply_token.as_deref(), Some("rt-1"));
        let MessageContent::Text { mention, .. } = &msg.message else {
            panic!("expected text message");
        };
        let mentionees = &mention.as_ref().unwrap().mentionees;
        assert_eq!(mentionees[0].user_id.as_deref(), Some("BOT"));
    }

    #[test]
    fn unknown_message_kinds_deserialize_to_other() {
        let json = serde_json::json!({
            "type": "message",
            "source": { "type": "user", "userId": "U1" },
            "message": { "type": "sticker", "id": "m-2", "stickerId": "1" }
        });
        let event: WebhookEvent = serde_json::from_value(json).unwrap();
        let WebhookEvent::Message(msg) = event else {
            panic!("expected message event");
        };
        assert!(matches!(msg.message, MessageContent::Other));
    }

    #[test]
    fn unknown_event_kinds_deserialize_to_other() {
        let json = serde_json::json!({ "type": "follow", "replyToken": "rt" });
        let event: WebhookEvent = serde_json::from_value(json).unwrap();
        assert!(matches!(event, WebhookEvent::Other));
    }
}
