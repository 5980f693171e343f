//! Calling-name hint resolution
//!
//! Resolves a short name to address the user by, cached per identity
//! with a TTL. Negative results are cached too so unresolvable names
//! don't trigger repeated external calls.

use std::sync::LazyLock;
use std::time::Duration;

use mini_moka::sync::Cache;
use regex::Regex;

use crate::ai::AiCapability;
use crate::line::{LinePlatform, Source};

static BRACKET_NICK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[（(]([^）)]+)[）)]").expect("valid regex"));

/// TTL cache of resolved name hints, keyed by user ID or, failing
/// that, by raw display name
pub struct NameHintResolver {
    cache: Cache<String, Option<String>>,
}

impl NameHintResolver {
    /// Create a resolver whose entries expire after `ttl`
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Cache::builder().time_to_live(ttl).max_capacity(10_000).build(),
        }
    }

    /// Resolve a calling-name hint for the event sender.
    ///
    /// Order: cache (including cached misses) → platform display name
    /// → strict-JSON AI guess → local heuristic. Whatever comes out is
    /// cached, `None` included.
    pub async fn resolve(
        &self,
        source: &Source,
        platform: &dyn LinePlatform,
        ai: &dyn AiCapability,
    ) -> Option<String> {
        // User-keyed entries can short-circuit before any external call
        if let Some(uid) = source.user_id() {
            let key = format!("uid:{uid}");
            if let Some(cached) = self.cache.get(&key) {
                return cached;
            }
        }

        let display_name = platform.display_name(source).await;
        let key = source.user_id().map_or_else(
            || format!("name:{}", display_name.as_deref().unwrap_or_default()),
            |uid| format!("uid:{uid}"),
        );
        if let Some(cached) = self.cache.get(&key) {
            return cached;
        }

        let mut name = None;
        if let Some(display) = display_name.as_deref() {
            name = ai.guess_given_name(display).await;
            if name.is_none() {
                name = heuristic_given_name(display);
            }
        }

        self.cache.insert(key, name.clone());
        name
    }
}

/// Local fallback when the AI guess comes back empty.
///
/// Prefers a bracketed nickname, then the leading token of a spaced
/// name (last token for Japanese surname-first order), then the
/// trailing two characters of a short unspaced Japanese name.
#[must_use]
pub fn heuristic_given_name(display_name: &str) -> Option<String> {
    let cleaned: String = display_name
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_string();
    if cleaned.is_empty() {
        return None;
    }

    if let Some(cap) = BRACKET_NICK.captures(&cleaned) {
        let nick = cap[1].trim().to_string();
        if !nick.is_empty() {
            return Some(nick);
        }
    }

    let tokens: Vec<&str> = cleaned
        .split([' ', '　', '・'])
        .filter(|t| !t.is_empty())
        .collect();
    match tokens.as_slice() {
        [] => None,
        [only] => {
            let chars: Vec<char> = only.chars().collect();
            if only.is_ascii() {
                // bare latin handle: usable only when it is short
                (chars.len() <= 6).then(|| (*only).to_string())
            } else if chars.len() <= 2 {
                Some((*only).to_string())
            } else if chars.len() <= 6 {
                Some(chars[chars.len() - 2..].iter().collect())
            } else {
                None
            }
        }
        // English order: first token; surname-first Japanese: last
        [first, ..] if first.is_ascii() => Some((*first).to_string()),
        [.., last] => Some((*last).to_string()),
    }
}
