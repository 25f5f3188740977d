//! Paged channel history, walked oldest-first inside a fixed time window.

use crate::model::{snowflake_floor, RawMessage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history request failed for channel {channel_id}: {source}")]
    Request {
        channel_id: u64,
        #[source]
        source: anyhow::Error,
    },
}

/// One page of channel history from the platform.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Up to `limit` messages with ids strictly greater than `after`, in any order.
    async fn page_after(
        &self,
        channel_id: u64,
        after: u64,
        limit: u8,
    ) -> Result<Vec<RawMessage>, HistoryError>;
}

/// Lazy cursor over a channel's history between `after` (inclusive) and `before` (inclusive).
///
/// Holds no state beyond the current walk: enumerating the same window again re-reads the
/// same messages.
pub struct HistoryEnumerator {
    source: Arc<dyn HistorySource>,
    channel_id: u64,
    cursor: u64,
    before: DateTime<Utc>,
    page_size: u8,
    buffer: VecDeque<RawMessage>,
    exhausted: bool,
}

impl HistoryEnumerator {
    pub fn new(
        source: Arc<dyn HistorySource>,
        channel_id: u64,
        after: Option<DateTime<Utc>>,
        before: DateTime<Utc>,
        page_size: u8,
    ) -> Self {
        Self {
            source,
            channel_id,
            cursor: lower_cursor(after),
            before,
            page_size: page_size.max(1),
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Next message in creation order. After an `Err` the walk is over.
    pub async fn next(&mut self) -> Option<Result<RawMessage, HistoryError>> {
        loop {
            if let Some(msg) = self.buffer.pop_front() {
                if msg.created_at > self.before {
                    self.finish();
                    return None;
                }
                return Some(Ok(msg));
            }

            if self.exhausted {
                return None;
            }

            let mut page = match self
                .source
                .page_after(self.channel_id, self.cursor, self.page_size)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    self.finish();
                    return Some(Err(e));
                }
            };

            let full_page = page.len() >= self.page_size as usize;
            page.retain(|m| m.id > self.cursor);
            page.sort_by_key(|m| m.id);

            match page.last() {
                Some(last) => self.cursor = last.id,
                None => {
                    self.finish();
                    return None;
                }
            }
            if !full_page {
                self.exhausted = true;
            }
            self.buffer.extend(page);
        }
    }

    fn finish(&mut self) {
        self.exhausted = true;
        self.buffer.clear();
    }
}

/// Cursor that makes a message created exactly at `after` part of the walk.
fn lower_cursor(after: Option<DateTime<Utc>>) -> u64 {
    after
        .map(|t| snowflake_floor(t).saturating_sub(1))
        .unwrap_or(0)
}
