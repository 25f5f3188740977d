use crate::archive::ArchiveStore;
use crate::model::IndexedMessage;
use std::sync::Arc;
use tracing::info;

const SNIPPET_CHARS: usize = 200;

/// Keyword search over the archive of one guild. Reads only from the store.
#[derive(Clone)]
pub struct SearchService {
    store: Arc<dyn ArchiveStore>,
    default_limit: usize,
    max_limit: usize,
}

impl SearchService {
    pub fn new(store: Arc<dyn ArchiveStore>, default_limit: usize, max_limit: usize) -> Self {
        Self {
            store,
            default_limit,
            max_limit: max_limit.max(default_limit),
        }
    }

    pub fn max_limit(&self) -> usize {
        self.max_limit
    }

    /// The number of results a request will actually get.
    pub fn effective_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit)
    }

    /// Newest matches first. No match is an empty list, not an error.
    pub async fn search(
        &self,
        guild_id: u64,
        query: &str,
        limit: Option<usize>,
    ) -> anyhow::Result<Vec<IndexedMessage>> {
        let limit = self.effective_limit(limit);
        let results = self
            .store
            .search_messages(guild_id, query.to_string(), limit)
            .await?;
        info!(
            "Search in guild {} for '{}' returned {} results",
            guild_id,
            query,
            results.len()
        );
        Ok(results)
    }
}

/// One line of a search reply: position, timestamp, author, snippet and jump link.
pub fn format_hit(position: usize, msg: &IndexedMessage) -> String {
    format!(
        "{}. <t:{}:f> **{}** in <#{}>: {}\n{}",
        position,
        msg.created_at.timestamp(),
        msg.author_name,
        msg.channel_id,
        truncate_snippet(&msg.content, SNIPPET_CHARS),
        msg.jump_link()
    )
}

fn truncate_snippet(text: &str, max_chars: usize) -> String {
    let flattened = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut snippet: String = flattened.chars().take(max_chars).collect();
    if flattened.chars().count() > max_chars {
        snippet.push_str("...");
    }
    snippet
}
