use crate::archive::ArchiveStore;
use crate::model::{MessageEdit, RawMessage};
use crate::tasks::spawn_supervised;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

/// What happened to a single live event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Indexed,
    AlreadyIndexed,
    Edited,
    UnknownMessage,
    Untracked,
    Ignored,
}

/// Applies create/edit events from the gateway to the archive, for tracked channels only.
#[derive(Clone)]
pub struct LiveIngestor {
    store: Arc<dyn ArchiveStore>,
}

impl LiveIngestor {
    pub fn new(store: Arc<dyn ArchiveStore>) -> Self {
        Self { store }
    }

    pub async fn on_message_created(&self, msg: RawMessage) -> anyhow::Result<IngestOutcome> {
        if msg.author_is_bot {
            return Ok(IngestOutcome::Ignored);
        }
        let Some(guild_id) = msg.guild_id else {
            return Ok(IngestOutcome::Ignored);
        };
        if !self.store.is_tracked(guild_id, msg.channel_id).await? {
            return Ok(IngestOutcome::Untracked);
        }

        let message_id = msg.id;
        let inserted = self.store.upsert_message(msg.into_indexed(guild_id)).await?;
        debug!("Live: message {} indexed (new: {})", message_id, inserted);
        Ok(if inserted {
            IngestOutcome::Indexed
        } else {
            IngestOutcome::AlreadyIndexed
        })
    }

    /// Edits only touch messages already in the archive; they never create one.
    pub async fn on_message_edited(&self, edit: MessageEdit) -> anyhow::Result<IngestOutcome> {
        if edit.author_is_bot {
            return Ok(IngestOutcome::Ignored);
        }
        let Some(guild_id) = edit.guild_id else {
            return Ok(IngestOutcome::Ignored);
        };
        if !self.store.is_tracked(guild_id, edit.channel_id).await? {
            return Ok(IngestOutcome::Untracked);
        }

        let updated = self
            .store
            .apply_edit(edit.message_id, edit.content, edit.edited_at)
            .await?;
        if updated {
            debug!("Live: message {} edited", edit.message_id);
            Ok(IngestOutcome::Edited)
        } else {
            debug!("Live: edit for unarchived message {} dropped", edit.message_id);
            Ok(IngestOutcome::UnknownMessage)
        }
    }

    /// Fire-and-forget variant for the gateway event handler.
    pub fn spawn_created(&self, msg: RawMessage) -> JoinHandle<()> {
        let ingestor = self.clone();
        let name = format!("index message {}", msg.id);
        spawn_supervised(name, async move {
            ingestor.on_message_created(msg).await?;
            Ok(())
        })
    }

    pub fn spawn_edited(&self, edit: MessageEdit) -> JoinHandle<()> {
        let ingestor = self.clone();
        let name = format!("edit message {}", edit.message_id);
        spawn_supervised(name, async move {
            ingestor.on_message_edited(edit).await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::history::testing::raw_at;
    use chrono::Duration;

    fn setup() -> (Database, LiveIngestor) {
        let db = Database::open(":memory:").unwrap();
        db.execute_init().unwrap();
        let ingestor = LiveIngestor::new(Arc::new(db.clone()));
        (db, ingestor)
    }

    fn live(channel_id: u64, ms: u64, content: &str) -> RawMessage {
        let mut msg = raw_at(channel_id, ms, 0, content);
        msg.guild_id = Some(1);
        msg
    }

    fn edit_of(msg: &RawMessage, content: &str) -> MessageEdit {
        MessageEdit {
            message_id: msg.id,
            guild_id: msg.guild_id,
            channel_id: msg.channel_id,
            author_is_bot: false,
            content: content.to_string(),
            edited_at: msg.created_at + Duration::minutes(2),
        }
    }

    #[tokio::test]
    async fn test_untracked_channel_is_ignored() {
        let (db, ingestor) = setup();
        let msg = live(10, 1_000, "hello");

        let outcome = ingestor.on_message_created(msg.clone()).await.unwrap();
        assert_eq!(outcome, IngestOutcome::Untracked);
        assert_eq!(db.count_messages(10).unwrap(), 0);

        let outcome = ingestor.on_message_edited(edit_of(&msg, "edited")).await.unwrap();
        assert_eq!(outcome, IngestOutcome::Untracked);
        assert_eq!(db.count_messages(10).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_tracked_channel_create_and_edit() {
        let (db, ingestor) = setup();
        db.track_channel(1, 10, "Rustaceans").unwrap();
        let msg = live(10, 1_000, "helo");

        assert_eq!(
            ingestor.on_message_created(msg.clone()).await.unwrap(),
            IngestOutcome::Indexed
        );
        // Duplicate delivery.
        assert_eq!(
            ingestor.on_message_created(msg.clone()).await.unwrap(),
            IngestOutcome::AlreadyIndexed
        );

        let edit = edit_of(&msg, "hello");
        assert_eq!(
            ingestor.on_message_edited(edit.clone()).await.unwrap(),
            IngestOutcome::Edited
        );

        let stored = db.get_message(msg.id).unwrap().unwrap();
        assert_eq!(stored.content, "hello");
        assert_eq!(stored.created_at, msg.created_at);
        assert_eq!(stored.updated_at, edit.edited_at);
        assert_eq!(db.count_messages(10).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_edit_of_unseen_message_does_not_insert() {
        let (db, ingestor) = setup();
        db.track_channel(1, 10, "Rustaceans").unwrap();
        let msg = live(10, 1_000, "never archived");

        let outcome = ingestor.on_message_edited(edit_of(&msg, "edited")).await.unwrap();
        assert_eq!(outcome, IngestOutcome::UnknownMessage);
        assert!(db.get_message(msg.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bots_and_direct_messages_ignored() {
        let (db, ingestor) = setup();
        db.track_channel(1, 10, "Rustaceans").unwrap();

        let mut bot = live(10, 1_000, "beep");
        bot.author_is_bot = true;
        assert_eq!(
            ingestor.on_message_created(bot).await.unwrap(),
            IngestOutcome::Ignored
        );

        let mut dm = live(10, 2_000, "psst");
        dm.guild_id = None;
        assert_eq!(
            ingestor.on_message_created(dm).await.unwrap(),
            IngestOutcome::Ignored
        );
        assert_eq!(db.count_messages(10).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_spawned_handlers_write_through() {
        let (db, ingestor) = setup();
        db.track_channel(1, 10, "Rustaceans").unwrap();
        let msg = live(10, 1_000, "fire and forget");

        ingestor.spawn_created(msg.clone()).await.unwrap();
        ingestor
            .spawn_edited(edit_of(&msg, "fired and forgotten"))
            .await
            .unwrap();

        let stored = db.get_message(msg.id).unwrap().unwrap();
        assert_eq!(stored.content, "fired and forgotten");
    }
}
