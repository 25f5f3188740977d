mod schema;

use crate::config::Config;
use crate::model::IndexedMessage;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

const MESSAGE_COLUMNS: &str =
    "m.message_id, m.guild_id, m.channel_id, m.author_id, m.author_name, m.content, m.created_at, m.updated_at";

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        if let Some(parent) = std::path::Path::new(&config.database_url).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::open(&config.database_url)
    }

    pub fn open(path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn execute_init(&self) -> anyhow::Result<()> {
        info!("Database: Initializing schema...");
        let conn = self.conn()?;
        conn.execute_batch(schema::SCHEMA)?;
        debug!("Database: Schema initialized successfully");
        Ok(())
    }

    /// Runs a synchronous query on the blocking pool so async callers never hold the lock.
    pub async fn run_blocking<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }

    fn conn(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("database connection mutex poisoned"))
    }

    // --- Messages ---

    /// Inserts the message unless its id is already archived. Returns true when a row was written.
    pub fn upsert_message(&self, msg: &IndexedMessage) -> anyhow::Result<bool> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT INTO messages (message_id, guild_id, channel_id, author_id, author_name, content, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(message_id) DO NOTHING",
            (
                msg.message_id,
                msg.guild_id,
                msg.channel_id,
                msg.author_id,
                &msg.author_name,
                &msg.content,
                msg.created_at,
                msg.updated_at,
            ),
        )?;
        debug!(
            "Database: upsert message {} in channel {} (inserted: {})",
            msg.message_id,
            msg.channel_id,
            inserted > 0
        );
        Ok(inserted > 0)
    }

    /// Overwrites the body of a known message. Unknown ids are left alone.
    pub fn apply_edit(
        &self,
        message_id: u64,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE messages
             SET content = ?2,
                 updated_at = CASE WHEN ?3 > created_at THEN ?3 ELSE created_at END
             WHERE message_id = ?1",
            (message_id, content, edited_at),
        )?;
        Ok(updated > 0)
    }

    pub fn get_message(&self, message_id: u64) -> anyhow::Result<Option<IndexedMessage>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages m WHERE m.message_id = ?1");
        let msg = conn
            .query_row(&sql, [message_id], message_from_row)
            .optional()?;
        Ok(msg)
    }

    pub fn count_messages(&self, channel_id: u64) -> anyhow::Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE channel_id = ?1",
            [channel_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Keyword search over archived message bodies in one guild, newest first.
    pub fn search_messages(
        &self,
        guild_id: u64,
        query: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<IndexedMessage>> {
        let Some(fts_query) = build_fts_query(query) else {
            return Ok(Vec::new());
        };
        if limit == 0 {
            return Ok(Vec::new());
        }

        let conn = self.conn()?;
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM messages_fts
             JOIN messages m ON m.id = messages_fts.rowid
             WHERE messages_fts MATCH ?1 AND m.guild_id = ?2
             ORDER BY m.created_at DESC, m.message_id DESC
             LIMIT ?3"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map((&fts_query, guild_id, limit as i64), message_from_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }

        debug!("Database: Search returned {} results", results.len());
        Ok(results)
    }

    // --- Tracking ---

    /// Records the guild (refreshing its name) and the channel. Returns true when the channel was not tracked before.
    pub fn track_channel(
        &self,
        guild_id: u64,
        channel_id: u64,
        guild_name: &str,
    ) -> anyhow::Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO communities (guild_id, guild_name) VALUES (?1, ?2)
             ON CONFLICT(guild_id) DO UPDATE SET guild_name = ?2, updated_at = CURRENT_TIMESTAMP",
            (guild_id, guild_name),
        )?;
        let inserted = tx.execute(
            "INSERT INTO tracked_channels (guild_id, channel_id) VALUES (?1, ?2)
             ON CONFLICT(guild_id, channel_id) DO NOTHING",
            (guild_id, channel_id),
        )?;
        tx.commit()?;
        Ok(inserted > 0)
    }

    pub fn untrack_channel(&self, guild_id: u64, channel_id: u64) -> anyhow::Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM tracked_channels WHERE guild_id = ?1 AND channel_id = ?2",
            (guild_id, channel_id),
        )?;
        Ok(deleted > 0)
    }

    pub fn is_tracked(&self, guild_id: u64, channel_id: u64) -> anyhow::Result<bool> {
        let conn = self.conn()?;
        let exists = conn
            .prepare_cached("SELECT 1 FROM tracked_channels WHERE guild_id = ?1 AND channel_id = ?2")?
            .exists((guild_id, channel_id))?;
        Ok(exists)
    }

    pub fn list_tracked_channels(&self, guild_id: u64) -> anyhow::Result<Vec<u64>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT channel_id FROM tracked_channels WHERE guild_id = ?1 ORDER BY created_at, channel_id",
        )?;
        let rows = stmt.query_map([guild_id], |row| row.get(0))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    pub fn list_all_tracked_channels(&self) -> anyhow::Result<Vec<(u64, u64)>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT guild_id, channel_id FROM tracked_channels ORDER BY guild_id, channel_id")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    // --- Communities ---

    pub fn set_guild_name(&self, guild_id: u64, guild_name: &str) -> anyhow::Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE communities SET guild_name = ?2, updated_at = CURRENT_TIMESTAMP
             WHERE guild_id = ?1 AND guild_name != ?2",
            (guild_id, guild_name),
        )?;
        Ok(())
    }

    pub fn get_guild_name(&self, guild_id: u64) -> anyhow::Result<Option<String>> {
        let conn = self.conn()?;
        let name = conn
            .query_row(
                "SELECT guild_name FROM communities WHERE guild_id = ?1",
                [guild_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name)
    }
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<IndexedMessage> {
    Ok(IndexedMessage {
        message_id: row.get(0)?,
        guild_id: row.get(1)?,
        channel_id: row.get(2)?,
        author_id: row.get(3)?,
        author_name: row.get(4)?,
        content: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Turns free text into an FTS5 expression requiring every word. Each word is quoted so
/// operators and punctuation in user input are never parsed as query syntax.
fn build_fts_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .filter(|word| word.chars().any(char::is_alphanumeric))
        .map(|word| format!("\"{}\"", word.replace('"', "\"\"")))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::snowflake_time;
    use chrono::Duration;

    fn test_db() -> Database {
        let db = Database::open(":memory:").unwrap();
        db.execute_init().unwrap();
        db
    }

    fn message(id: u64, channel_id: u64, content: &str, created_at: DateTime<Utc>) -> IndexedMessage {
        IndexedMessage {
            message_id: id,
            guild_id: 1,
            channel_id,
            author_id: 42,
            author_name: "ferris".to_string(),
            content: content.to_string(),
            created_at,
            updated_at: created_at,
        }
    }

    fn base_time() -> DateTime<Utc> {
        snowflake_time(175928847299117063)
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let db = test_db();
        let original = message(100, 10, "first body", base_time());

        assert!(db.upsert_message(&original).unwrap());

        let mut changed = original.clone();
        changed.content = "second body".to_string();
        changed.author_name = "someone else".to_string();
        assert!(!db.upsert_message(&changed).unwrap());
        assert!(!db.upsert_message(&original).unwrap());

        assert_eq!(db.count_messages(10).unwrap(), 1);
        assert_eq!(db.get_message(100).unwrap().unwrap(), original);
    }

    #[test]
    fn test_apply_edit_updates_body_only() {
        let db = test_db();
        let original = message(100, 10, "typo here", base_time());
        db.upsert_message(&original).unwrap();

        let edited_at = base_time() + Duration::minutes(3);
        assert!(db.apply_edit(100, "fixed here", edited_at).unwrap());

        let stored = db.get_message(100).unwrap().unwrap();
        assert_eq!(stored.content, "fixed here");
        assert_eq!(stored.created_at, original.created_at);
        assert_eq!(stored.author_id, original.author_id);
        assert_eq!(stored.updated_at, edited_at);
    }

    #[test]
    fn test_apply_edit_never_creates() {
        let db = test_db();
        assert!(!db.apply_edit(555, "ghost", base_time()).unwrap());
        assert!(db.get_message(555).unwrap().is_none());
        assert_eq!(db.count_messages(10).unwrap(), 0);
    }

    #[test]
    fn test_apply_edit_keeps_updated_at_after_created_at() {
        let db = test_db();
        db.upsert_message(&message(100, 10, "body", base_time())).unwrap();
        db.apply_edit(100, "new body", base_time() - Duration::hours(1)).unwrap();

        let stored = db.get_message(100).unwrap().unwrap();
        assert_eq!(stored.updated_at, stored.created_at);
    }

    #[test]
    fn test_track_untrack() {
        let db = test_db();

        assert!(!db.is_tracked(1, 10).unwrap());
        assert!(db.track_channel(1, 10, "Rustaceans").unwrap());
        assert!(!db.track_channel(1, 10, "Rustaceans").unwrap());
        assert!(db.track_channel(1, 11, "Rustaceans").unwrap());
        assert!(db.track_channel(2, 20, "Other").unwrap());

        assert!(db.is_tracked(1, 10).unwrap());
        assert!(!db.is_tracked(2, 10).unwrap());
        assert_eq!(db.list_tracked_channels(1).unwrap(), vec![10, 11]);
        assert_eq!(
            db.list_all_tracked_channels().unwrap(),
            vec![(1, 10), (1, 11), (2, 20)]
        );

        assert!(db.untrack_channel(1, 10).unwrap());
        assert!(!db.untrack_channel(1, 10).unwrap());
        assert!(!db.is_tracked(1, 10).unwrap());
        assert_eq!(db.list_tracked_channels(1).unwrap(), vec![11]);

        // Untracking keeps the guild record.
        db.untrack_channel(1, 11).unwrap();
        assert_eq!(db.get_guild_name(1).unwrap().as_deref(), Some("Rustaceans"));
    }

    #[test]
    fn test_guild_name_refresh() {
        let db = test_db();
        db.track_channel(1, 10, "Old Name").unwrap();
        db.set_guild_name(1, "New Name").unwrap();
        assert_eq!(db.get_guild_name(1).unwrap().as_deref(), Some("New Name"));

        db.track_channel(1, 11, "Newest Name").unwrap();
        assert_eq!(db.get_guild_name(1).unwrap().as_deref(), Some("Newest Name"));

        // Unknown guilds are not created by a name refresh.
        db.set_guild_name(9, "Nobody").unwrap();
        assert_eq!(db.get_guild_name(9).unwrap(), None);
    }

    #[test]
    fn test_search_orders_newest_first_and_limits() {
        let db = test_db();
        for i in 0..8u64 {
            let at = base_time() + Duration::seconds(i as i64);
            db.upsert_message(&message(100 + i, 10, &format!("deploy number {i}"), at))
                .unwrap();
        }
        db.upsert_message(&message(200, 10, "unrelated chatter", base_time()))
            .unwrap();

        let results = db.search_messages(1, "deploy", 5).unwrap();
        let ids: Vec<u64> = results.iter().map(|m| m.message_id).collect();
        assert_eq!(ids, vec![107, 106, 105, 104, 103]);
        for pair in results.windows(2) {
            assert!(pair[0].created_at > pair[1].created_at);
        }
    }

    #[test]
    fn test_search_requires_all_terms_and_scopes_guild() {
        let db = test_db();
        db.upsert_message(&message(1, 10, "the release train left", base_time()))
            .unwrap();
        db.upsert_message(&message(2, 10, "the release is blocked", base_time()))
            .unwrap();
        let mut other_guild = message(3, 30, "release train elsewhere", base_time());
        other_guild.guild_id = 2;
        db.upsert_message(&other_guild).unwrap();

        let results = db.search_messages(1, "release train", 5).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message_id, 1);

        // Porter stemming matches inflected forms.
        let results = db.search_messages(1, "releases", 5).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_search_sees_edits() {
        let db = test_db();
        db.upsert_message(&message(1, 10, "colour palette", base_time()))
            .unwrap();
        db.apply_edit(1, "color palette", base_time() + Duration::seconds(5))
            .unwrap();

        assert!(db.search_messages(1, "colour", 5).unwrap().is_empty());
        assert_eq!(db.search_messages(1, "color", 5).unwrap().len(), 1);
    }

    #[test]
    fn test_search_no_match_is_empty() {
        let db = test_db();
        db.upsert_message(&message(1, 10, "hello world", base_time()))
            .unwrap();
        assert!(db.search_messages(1, "no-such-term", 5).unwrap().is_empty());
        assert!(db.search_messages(1, "   ", 5).unwrap().is_empty());
        assert!(db.search_messages(1, "hello", 0).unwrap().is_empty());
    }

    #[test]
    fn test_search_with_special_chars() {
        let db = test_db();
        db.upsert_message(&message(1, 10, "normal message", base_time()))
            .unwrap();

        for query in ["'; DROP TABLE messages; --", "\"unbalanced", "a OR b NOT", "col:umn*", "--"] {
            assert!(db.search_messages(1, query, 5).is_ok(), "query {query:?} failed");
        }

        let conn = db.conn().unwrap();
        assert!(conn.prepare("SELECT 1 FROM messages").is_ok());
    }

    #[test]
    fn test_build_fts_query() {
        assert_eq!(build_fts_query("hello world").as_deref(), Some("\"hello\" \"world\""));
        assert_eq!(build_fts_query("say \"hi\"").as_deref(), Some("\"say\" \"\"\"hi\"\"\""));
        assert_eq!(build_fts_query("-- ;;"), None);
        assert_eq!(build_fts_query(""), None);
    }
}
