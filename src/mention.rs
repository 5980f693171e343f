//! Addressing resolution: mentions, keywords, and the grace window
//!
//! Decides whether the bot is being spoken to. Direct messages always
//! are. Group/room text needs a structured mention of the bot or a
//! configured keyword; images carry no mention metadata, so a short
//! grace window after a recognized mention lets an immediately
//! following image through.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::line::{LinePlatform, Mention, MessageEvent};

/// Hard cap on tracked grace entries
const GRACE_MAX_ENTRIES: usize = 2000;

/// Last-mention timestamps per group/room+user scope.
///
/// Process-local and reset on restart; the only effect of losing it is
/// a missed usability grace, never a correctness issue. Expired
/// entries are evicted lazily on read, with a hard entry cap as
/// backstop.
#[derive(Debug)]
pub struct MentionGrace {
    entries: HashMap<String, Instant>,
    window: Duration,
}

impl MentionGrace {
    /// Create a grace map with the given window
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            window,
        }
    }

    /// Record a recognized mention for a scope
    pub fn note(&mut self, scope: &str) {
        let now = Instant::now();

        if self.entries.len() >= GRACE_MAX_ENTRIES {
            self.entries
                .retain(|_, ts| now.duration_since(*ts) <= self.window);
        }
        if self.entries.len() >= GRACE_MAX_ENTRIES {
            if let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, ts)| *ts)
                .map(|(k, _)| k.clone())
            {
                self.entries.remove(&oldest);
            }
        }

        self.entries.insert(scope.to_string(), now);
    }

    /// Whether a mention was recorded for this scope within the
    /// window. Expired entries are removed on read.
    pub fn within(&mut self, scope: &str) -> bool {
        let Some(ts) = self.entries.get(scope) else {
            return false;
        };
        if ts.elapsed() <= self.window {
            true
        } else {
            self.entries.remove(scope);
            false
        }
    }

    /// Test hook: backdate an entry so expiry paths can be exercised
    /// without sleeping.
    #[doc(hidden)]
    pub fn backdate(&mut self, scope: &str, age: Duration) {
        if let Some(ts) = self.entries.get_mut(scope) {
            *ts = Instant::now() - age;
        }
    }
}

/// Shared grace map handle
pub type SharedGrace = Mutex<MentionGrace>;

/// Case-insensitive substring match against the configured keywords
#[must_use]
pub fn contains_keyword(text: &str, keywords: &[String]) -> bool {
    let lower = text.to_lowercase();
    keywords
        .iter()
        .any(|k| !k.is_empty() && lower.contains(&k.to_lowercase()))
}

/// Whether the structured mention list names the bot itself.
///
/// Fails open to `false` when the bot's own ID cannot be resolved.
pub async fn is_mentioned_bot(mention: Option<&Mention>, platform: &dyn LinePlatform) -> bool {
    let Some(mentionees) = mention.map(|m| &m.mentionees).filter(|m| !m.is_empty()) else {
        return false;
    };
    let Some(bot_id) = platform.bot_user_id().await else {
        return false;
    };
    mentionees
        .iter()
        .any(|m| m.kind == "user" && m.user_id.as_deref() == Some(bot_id.as_str()))
}

/// Addressing decision for a text message.
///
/// Direct messages are always addressed. Group/room text is addressed
/// when the bot is mentioned or a keyword appears; a positive group/
/// room decision records a grace entry so a follow-up image in the
/// same scope still counts as addressed.
pub async fn is_addressed_text(
    event: &MessageEvent,
    text: &str,
    mention: Option<&Mention>,
    platform: &dyn LinePlatform,
    keywords: &[String],
    grace: &SharedGrace,
) -> bool {
    if event.source.is_direct() {
        return true;
    }

    let addressed =
        is_mentioned_bot(mention, platform).await || contains_keyword(text, keywords);

    if addressed {
        if let Some(scope) = event.source.scope_key() {
            grace
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .note(&scope);
        }
    }

    addressed
}

/// Addressing decision for an image message.
///
/// Images carry no mention metadata; outside a DM they are addressed
/// only within the grace window of a prior recognized mention in the
/// exact same scope.
#[must_use]
pub fn is_addressed_image(event: &MessageEvent, grace: &SharedGrace) -> bool {
    if event.source.is_direct() {
        return true;
    }
    event.source.scope_key().is_some_and(|scope| {
        grace
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .within(&scope)
    })
}
