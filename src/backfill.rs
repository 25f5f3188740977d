use crate::archive::ArchiveStore;
use crate::history::{HistoryEnumerator, HistorySource};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of one channel backfill. Partial failures are reported, never raised.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BackfillResult {
    /// Messages successfully written (or already present).
    pub indexed_count: usize,
    /// Of those, messages that were new to the archive.
    pub inserted_count: usize,
    /// Bot-authored messages left out of the archive.
    pub skipped_count: usize,
    /// Messages the store refused.
    pub failed_ids: Vec<u64>,
    /// Set when history paging ended early.
    pub interrupted: Option<String>,
}

impl BackfillResult {
    pub fn is_complete(&self) -> bool {
        self.failed_ids.is_empty() && self.interrupted.is_none()
    }
}

pub struct BackfillEngine {
    store: Arc<dyn ArchiveStore>,
    history: Arc<dyn HistorySource>,
    page_size: u8,
}

impl BackfillEngine {
    pub fn new(store: Arc<dyn ArchiveStore>, history: Arc<dyn HistorySource>, page_size: u8) -> Self {
        Self {
            store,
            history,
            page_size,
        }
    }

    /// Archives the channel's history from `after` up to the moment this call starts.
    /// Anything newer is left to live ingestion.
    pub async fn backfill(
        &self,
        guild_id: u64,
        channel_id: u64,
        after: Option<DateTime<Utc>>,
    ) -> BackfillResult {
        let before = Utc::now();
        self.backfill_window(guild_id, channel_id, after, before).await
    }

    pub async fn backfill_window(
        &self,
        guild_id: u64,
        channel_id: u64,
        after: Option<DateTime<Utc>>,
        before: DateTime<Utc>,
    ) -> BackfillResult {
        info!(
            "Backfill: starting channel {} in guild {} (after: {:?}, before: {})",
            channel_id, guild_id, after, before
        );

        let mut result = BackfillResult::default();
        let mut walk = HistoryEnumerator::new(
            self.history.clone(),
            channel_id,
            after,
            before,
            self.page_size,
        );

        while let Some(item) = walk.next().await {
            let raw = match item {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("Backfill: history for channel {} ended early: {}", channel_id, e);
                    result.interrupted = Some(e.to_string());
                    break;
                }
            };

            if raw.author_is_bot {
                result.skipped_count += 1;
                continue;
            }

            let message_id = raw.id;
            match self.store.upsert_message(raw.into_indexed(guild_id)).await {
                Ok(inserted) => {
                    result.indexed_count += 1;
                    if inserted {
                        result.inserted_count += 1;
                    }
                }
                Err(e) => {
                    warn!("Backfill: failed to index message {}: {}", message_id, e);
                    result.failed_ids.push(message_id);
                }
            }
        }

        if result.is_complete() {
            info!(
                "Backfill: channel {} done, {} indexed ({} new)",
                channel_id, result.indexed_count, result.inserted_count
            );
        } else {
            warn!(
                "Backfill: channel {} finished partially, {} indexed, {} failed, interrupted: {}",
                channel_id,
                result.indexed_count,
                result.failed_ids.len(),
                result.interrupted.is_some()
            );
        }
        debug!("Backfill: channel {} result {:?}", channel_id, result);
        result
    }
}
