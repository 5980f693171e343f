//! Configuration for pacebot
//!
//! All tunables come from the environment. Numeric knobs are clamped
//! to safe bounds at load time so the rest of the crate never
//! re-validates.

use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result};

/// Default mention keywords when `LINE_MENTION_KEYWORDS` is unset
const DEFAULT_KEYWORDS: &str = "ひとみ,@ひとみ";

/// Pacebot configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// LINE channel secret (webhook signature key)
    pub channel_secret: String,

    /// LINE channel access token (Messaging API auth)
    pub channel_access_token: String,

    /// `OpenAI` API key
    pub openai_api_key: String,

    /// Chat model identifier (text and vision)
    pub openai_model: String,

    /// Public base URL this service is reachable at (for reward asset URLs)
    pub base_url: String,

    /// Directory holding reward images
    pub rewards_dir: PathBuf,

    /// Path to the conversation database
    pub db_path: PathBuf,

    /// Only respond in groups/rooms when mentioned (DMs always respond)
    pub mention_only: bool,

    /// Keywords that count as a mention in group/room text
    pub mention_keywords: Vec<String>,

    /// Probability of attaching a reward without being asked
    pub reward_random_rate: f64,

    /// Probability of attaching a reward when explicitly asked
    pub reward_on_request_rate: f64,

    /// How long after a recognized mention an image still counts as addressed
    pub mention_grace: Duration,

    /// Maximum stored turns per conversation (clamped to 1..=50)
    pub history_max_turns: usize,

    /// Idle conversation expiry (minimum 60s)
    pub history_ttl: Duration,

    /// Character budget for compact history rendering (for models with
    /// small context windows); `None` sends full alternating turns
    pub history_compact_chars: Option<usize>,

    /// Name hint cache expiry
    pub name_cache_ttl: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the LINE credentials or the `OpenAI` API key
    /// are missing.
    pub fn from_env() -> Result<Self> {
        let channel_secret = require_env("LINE_CHANNEL_SECRET")?;
        let channel_access_token = require_env("LINE_CHANNEL_ACCESS_TOKEN")?;
        let openai_api_key = require_env("OPENAI_API_KEY")?;

        let mention_keywords = std::env::var("LINE_MENTION_KEYWORDS")
            .unwrap_or_else(|_| DEFAULT_KEYWORDS.to_string())
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        let data_dir = std::env::var("PACEBOT_DATA_DIR").map_or_else(
            |_| {
                directories::ProjectDirs::from("dev", "pacebot", "pacebot").map_or_else(
                    || PathBuf::from("."),
                    |dirs| dirs.data_dir().to_path_buf(),
                )
            },
            PathBuf::from,
        );

        Ok(Self {
            channel_secret,
            channel_access_token,
            openai_api_key,
            openai_model: env_or("OPENAI_MODEL", "gpt-4o-mini"),
            base_url: env_or("PACEBOT_BASE_URL", "http://localhost:8080")
                .trim_end_matches('/')
                .to_string(),
            rewards_dir: std::env::var("PACEBOT_REWARDS_DIR")
                .map_or_else(|_| PathBuf::from("public/rewards"), PathBuf::from),
            db_path: data_dir.join("pacebot.db"),
            mention_only: env_or("LINE_MENTION_ONLY", "false").to_lowercase() == "true",
            mention_keywords,
            reward_random_rate: env_rate("REWARD_RANDOM_RATE", 0.25),
            reward_on_request_rate: env_rate("REWARD_ON_REQUEST_RATE", 0.8),
            mention_grace: Duration::from_millis(env_num("MENTION_GRACE_MS", 60_000)),
            history_max_turns: usize::try_from(env_num("HISTORY_MAX_TURNS", 10).clamp(1, 50))
                .unwrap_or(10),
            history_ttl: Duration::from_secs(env_num("HISTORY_TTL_SECONDS", 604_800).max(60)),
            history_compact_chars: match env_num("HISTORY_COMPACT_CHARS", 0) {
                0 => None,
                n => Some(usize::try_from(n).unwrap_or(usize::MAX)),
            },
            name_cache_ttl: Duration::from_millis(env_num("NAME_CACHE_TTL_MS", 86_400_000)),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::Config(format!("missing required environment variable {key}")))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse a numeric env var, falling back to `default` on absence or garbage
fn env_num(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parse a probability env var, clamped to `[0, 1]`
fn env_rate(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|n| n.is_finite())
        .unwrap_or(default)
        .clamp(0.0, 1.0)
}
