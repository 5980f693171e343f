//! Conversation memory store
//!
//! A bounded, TTL'd, ordered log of prior exchanges per privacy-scoped
//! conversation key, persisted in `SQLite`. A save is one transaction:
//! append the turn, trim to the newest N, refresh the key's expiry.
//! Loads return oldest-to-newest for direct inclusion in a prompt.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

use crate::ai::{ChatMessage, Role};
use crate::{Error, Result};

/// Connection pool type alias
pub type DbPool = r2d2::Pool<SqliteConnectionManager>;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS turns (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    conv_key TEXT NOT NULL,
    user_text TEXT NOT NULL,
    bot_text TEXT NOT NULL,
    ts_ms INTEGER NOT NULL,
    source TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_turns_conv ON turns(conv_key, id);
CREATE TABLE IF NOT EXISTS conversations (
    conv_key TEXT PRIMARY KEY,
    expires_at_ms INTEGER NOT NULL
);
";

/// Open (or create) the conversation database at `path`
///
/// # Errors
///
/// Returns error if the database cannot be opened or the schema
/// cannot be applied.
pub fn init(path: &Path) -> Result<DbPool> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let manager = SqliteConnectionManager::file(path);
    build_pool(manager)
}

/// In-memory database for tests
///
/// # Errors
///
/// Returns error if the schema cannot be applied.
pub fn init_memory() -> Result<DbPool> {
    // A unique shared-cache URI per call: every connection in this
    // pool sees the same db, separate pools stay isolated
    static NEXT_DB: AtomicU64 = AtomicU64::new(0);
    let n = NEXT_DB.fetch_add(1, Ordering::Relaxed);
    let uri = format!("file:memdb{n}?mode=memory&cache=shared");
    let manager = SqliteConnectionManager::file(uri)
        .with_flags(
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        );
    build_pool(manager)
}

/// How long a connection waits on the database write lock before
/// giving up. Saves from concurrent events contend for it briefly.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

fn build_pool(manager: SqliteConnectionManager) -> Result<DbPool> {
    let manager = manager.with_init(|conn| conn.busy_timeout(BUSY_TIMEOUT));
    let pool = r2d2::Pool::builder()
        .max_size(4)
        .build(manager)
        .map_err(|e| Error::Database(e.to_string()))?;
    let conn = pool.get().map_err(|e| Error::Database(e.to_string()))?;
    conn.execute_batch(SCHEMA)?;
    Ok(pool)
}

/// Payload source of a stored turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnSource {
    Text,
    Image,
    Other,
}

impl TurnSource {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Other => "other",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "text" => Self::Text,
            "image" => Self::Image,
            _ => Self::Other,
        }
    }
}

/// One user/bot exchange, immutable once written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    /// What the user said (or `"[画像]"` for image turns)
    pub user_text: String,
    /// What the bot replied
    pub bot_text: String,
    /// Timestamp in milliseconds
    pub ts_ms: i64,
    /// Payload kind that produced this turn
    pub source: TurnSource,
}

/// Conversation repository
#[derive(Clone)]
pub struct ConversationRepo {
    pool: DbPool,
    max_turns: usize,
    ttl: Duration,
}

impl ConversationRepo {
    /// Create a repository bounded to `max_turns` per key with idle
    /// expiry `ttl`
    #[must_use]
    pub const fn new(pool: DbPool, max_turns: usize, ttl: Duration) -> Self {
        Self {
            pool,
            max_turns,
            ttl,
        }
    }

    /// Load up to `max_turns` most recent turns, oldest-to-newest.
    ///
    /// An expired conversation is dropped entirely and loads as empty.
    ///
    /// # Errors
    ///
    /// Returns error if the database operation fails.
    pub fn load(&self, key: &str) -> Result<Vec<Turn>> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;
        let now_ms = Utc::now().timestamp_millis();

        let expires: Option<i64> = conn
            .query_row(
                "SELECT expires_at_ms FROM conversations WHERE conv_key = ?1",
                [key],
                |row| row.get(0),
            )
            .ok();

        match expires {
            None => return Ok(Vec::new()),
            Some(at) if at <= now_ms => {
                conn.execute("DELETE FROM turns WHERE conv_key = ?1", [key])?;
                conn.execute("DELETE FROM conversations WHERE conv_key = ?1", [key])?;
                return Ok(Vec::new());
            }
            Some(_) => {}
        }

        let mut stmt = conn.prepare(
            "SELECT user_text, bot_text, ts_ms, source FROM turns
             WHERE conv_key = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let mut turns: Vec<Turn> = stmt
            .query_map(params![key, i64::try_from(self.max_turns).unwrap_or(i64::MAX)], |row| {
                Ok(Turn {
                    user_text: row.get(0)?,
                    bot_text: row.get(1)?,
                    ts_ms: row.get(2)?,
                    source: TurnSource::from_str(&row.get::<_, String>(3)?),
                })
            })?
            .collect::<std::result::Result<_, _>>()?;

        // Stored newest-first; prompts want oldest-first
        turns.reverse();
        Ok(turns)
    }

    /// Append a turn, trim to the newest `max_turns`, refresh the TTL.
    ///
    /// Runs as a single immediate transaction so concurrent saves
    /// serialize on the write lock rather than failing each other,
    /// and the log can never exceed `max_turns`.
    ///
    /// # Errors
    ///
    /// Returns error if the database operation fails.
    pub fn save(&self, key: &str, turn: &Turn) -> Result<()> {
        let mut conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        tx.execute(
            "INSERT INTO turns (conv_key, user_text, bot_text, ts_ms, source)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                key,
                turn.user_text,
                turn.bot_text,
                turn.ts_ms,
                turn.source.as_str()
            ],
        )?;

        tx.execute(
            "DELETE FROM turns WHERE conv_key = ?1 AND id NOT IN (
                 SELECT id FROM turns WHERE conv_key = ?1 ORDER BY id DESC LIMIT ?2
             )",
            params![key, i64::try_from(self.max_turns).unwrap_or(i64::MAX)],
        )?;

        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = Utc::now().timestamp_millis().saturating_add(ttl_ms);
        tx.execute(
            "INSERT INTO conversations (conv_key, expires_at_ms) VALUES (?1, ?2)
             ON CONFLICT(conv_key) DO UPDATE SET expires_at_ms = excluded.expires_at_ms",
            params![key, expires_at],
        )?;

        tx.commit()?;
        Ok(())
    }
}

/// Render a loaded log as alternating user/assistant prompt turns,
/// preserving order
#[must_use]
pub fn turns_to_messages(turns: &[Turn]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(turns.len() * 2);
    for turn in turns {
        messages.push(ChatMessage::new(Role::User, &turn.user_text));
        messages.push(ChatMessage::new(Role::Assistant, &turn.bot_text));
    }
    messages
}

/// Per-utterance truncation length used by [`summarize`]
const SUMMARY_UTTERANCE_CHARS: usize = 80;

/// Compact textual rendering of a log for backends with small context
/// windows.
///
/// Each utterance is truncated, turns are emitted oldest-to-newest,
/// and emission stops once the character budget is exceeded.
#[must_use]
pub fn summarize(turns: &[Turn], char_budget: usize) -> String {
    let mut out = String::new();
    for turn in turns {
        let user: String = turn.user_text.chars().take(SUMMARY_UTTERANCE_CHARS).collect();
        let bot: String = turn.bot_text.chars().take(SUMMARY_UTTERANCE_CHARS).collect();
        out.push_str(&format!("U: {user}\nA: {bot}\n"));
        if out.chars().count() > char_budget {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(max_turns: usize, ttl: Duration) -> ConversationRepo {
        let pool = init_memory().expect("failed to init test db");
        ConversationRepo::new(pool, max_turns, ttl)
    }

    fn turn(n: u32) -> Turn {
        Turn {
            user_text: format!("user {n}"),
            bot_text: format!("bot {n}"),
            ts_ms: i64::from(n),
            source: TurnSource::Text,
        }
    }

    #[test]
    fn load_of_unknown_key_is_empty() {
        let repo = repo(10, Duration::from_secs(600));
        assert!(repo.load("dm:U1").unwrap().is_empty());
    }

    #[test]
    fn save_then_load_preserves_order() {
        let repo = repo(10, Duration::from_secs(600));
        for n in 0..3 {
            repo.save("dm:U1", &turn(n)).unwrap();
        }
        let turns = repo.load("dm:U1").unwrap();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].user_text, "user 0");
        assert_eq!(turns[2].user_text, "user 2");
    }

    #[test]
    fn log_never_exceeds_max_turns() {
        let repo = repo(3, Duration::from_secs(600));
        for n in 0..20 {
            repo.save("dm:U1", &turn(n)).unwrap();
        }
        let turns = repo.load("dm:U1").unwrap();
        assert_eq!(turns.len(), 3);
        // oldest were trimmed first
        assert_eq!(turns[0].user_text, "user 17");
        assert_eq!(turns[2].user_text, "user 19");
    }

    #[test]
    fn concurrent_same_key_saves_serialize_and_respect_bound() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init(&dir.path().join("conv.db")).unwrap();
        let repo = ConversationRepo::new(pool, 5, Duration::from_secs(600));

        let mut handles = Vec::new();
        for t in 0..8u32 {
            let repo = repo.clone();
            handles.push(std::thread::spawn(move || {
                for n in 0..25 {
                    // No save may fail with a busy error
                    repo.save("dm:U1", &turn(t * 100 + n)).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(repo.load("dm:U1").unwrap().len(), 5);
    }

    #[test]
    fn keys_are_independent() {
        let repo = repo(10, Duration::from_secs(600));
        repo.save("grp:G1:u:U1", &turn(1)).unwrap();
        repo.save("grp:G1:u:U2", &turn(2)).unwrap();

        let a = repo.load("grp:G1:u:U1").unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].user_text, "user 1");
        let b = repo.load("grp:G1:u:U2").unwrap();
        assert_eq!(b.len(), 1);
        assert_eq!(b[0].user_text, "user 2");
    }

    #[test]
    fn expired_conversation_loads_empty() {
        let repo = repo(10, Duration::from_millis(0));
        repo.save("dm:U1", &turn(1)).unwrap();
        // TTL of zero expires immediately
        assert!(repo.load("dm:U1").unwrap().is_empty());
    }

    #[test]
    fn renders_alternating_prompt_turns() {
        let turns = vec![turn(1), turn(2)];
        let messages = turns_to_messages(&turns);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "user 1");
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[3].content, "bot 2");
    }

    #[test]
    fn summary_respects_budget() {
        let turns: Vec<Turn> = (0..50).map(turn).collect();
        let summary = summarize(&turns, 100);
        assert!(summary.chars().count() < 140);
        assert!(summary.starts_with("U: user 0\n"));

        let long = Turn {
            user_text: "あ".repeat(500),
            bot_text: "b".repeat(500),
            ts_ms: 0,
            source: TurnSource::Text,
        };
        let summary = summarize(std::slice::from_ref(&long), 1000);
        assert!(summary.chars().count() <= 2 * SUMMARY_UTTERANCE_CHARS + 8);
    }
}
