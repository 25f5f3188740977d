//! Repository interface shared by backfill, live ingestion, tracking and search.
//!
//! Both write paths go through [`ArchiveStore::upsert_message`] and
//! [`ArchiveStore::apply_edit`]. Creation is insert-or-ignore and edits are a keyed
//! overwrite, so the two paths can interleave freely without application locks.

use crate::db::Database;
use crate::model::IndexedMessage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Inserts unless the message id is already archived; returns true on insert.
    async fn upsert_message(&self, msg: IndexedMessage) -> anyhow::Result<bool>;

    /// Updates body and `updated_at` of a known message; returns false for unknown ids.
    async fn apply_edit(
        &self,
        message_id: u64,
        content: String,
        edited_at: DateTime<Utc>,
    ) -> anyhow::Result<bool>;

    /// Returns true when the channel was newly tracked.
    async fn track_channel(
        &self,
        guild_id: u64,
        channel_id: u64,
        guild_name: String,
    ) -> anyhow::Result<bool>;

    /// Returns true when a tracking row was removed.
    async fn untrack_channel(&self, guild_id: u64, channel_id: u64) -> anyhow::Result<bool>;

    async fn is_tracked(&self, guild_id: u64, channel_id: u64) -> anyhow::Result<bool>;

    async fn list_tracked_channels(&self, guild_id: u64) -> anyhow::Result<Vec<u64>>;

    async fn list_all_tracked_channels(&self) -> anyhow::Result<Vec<(u64, u64)>>;

    async fn set_guild_name(&self, guild_id: u64, guild_name: String) -> anyhow::Result<()>;

    async fn search_messages(
        &self,
        guild_id: u64,
        query: String,
        limit: usize,
    ) -> anyhow::Result<Vec<IndexedMessage>>;
}

#[async_trait]
impl ArchiveStore for Database {
    async fn upsert_message(&self, msg: IndexedMessage) -> anyhow::Result<bool> {
        self.run_blocking(move |db| db.upsert_message(&msg)).await
    }

    async fn apply_edit(
        &self,
        message_id: u64,
        content: String,
        edited_at: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        self.run_blocking(move |db| db.apply_edit(message_id, &content, edited_at))
            .await
    }

    async fn track_channel(
        &self,
        guild_id: u64,
        channel_id: u64,
        guild_name: String,
    ) -> anyhow::Result<bool> {
        self.run_blocking(move |db| db.track_channel(guild_id, channel_id, &guild_name))
            .await
    }

    async fn untrack_channel(&self, guild_id: u64, channel_id: u64) -> anyhow::Result<bool> {
        self.run_blocking(move |db| db.untrack_channel(guild_id, channel_id))
            .await
    }

    async fn is_tracked(&self, guild_id: u64, channel_id: u64) -> anyhow::Result<bool> {
        self.run_blocking(move |db| db.is_tracked(guild_id, channel_id))
            .await
    }

    async fn list_tracked_channels(&self, guild_id: u64) -> anyhow::Result<Vec<u64>> {
        self.run_blocking(move |db| db.list_tracked_channels(guild_id))
            .await
    }

    async fn list_all_tracked_channels(&self) -> anyhow::Result<Vec<(u64, u64)>> {
        self.run_blocking(|db| db.list_all_tracked_channels()).await
    }

    async fn set_guild_name(&self, guild_id: u64, guild_name: String) -> anyhow::Result<()> {
        self.run_blocking(move |db| db.set_guild_name(guild_id, &guild_name))
            .await
    }

    async fn search_messages(
        &self,
        guild_id: u64,
        query: String,
        limit: usize,
    ) -> anyhow::Result<Vec<IndexedMessage>> {
        self.run_blocking(move |db| db.search_messages(guild_id, &query, limit))
            .await
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::snowflake_time;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_concurrent_upserts_keep_one_row() {
        let db = Database::open(":memory:").unwrap();
        db.execute_init().unwrap();
        let store: Arc<dyn ArchiveStore> = Arc::new(db.clone());

        let created_at = snowflake_time(175928847299117063);
        let msg = IndexedMessage {
            message_id: 175928847299117063,
            guild_id: 1,
            channel_id: 10,
            author_id: 2,
            author_name: "ferris".to_string(),
            content: "same message from two paths".to_string(),
            created_at,
            updated_at: created_at,
        };

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let msg = msg.clone();
            handles.push(tokio::spawn(async move { store.upsert_message(msg).await }));
        }

        let mut inserted = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() {
                inserted += 1;
            }
        }

        assert_eq!(inserted, 1);
        assert_eq!(db.count_messages(10).unwrap(), 1);
        assert_eq!(db.get_message(msg.message_id).unwrap().unwrap(), msg);
    }
}
