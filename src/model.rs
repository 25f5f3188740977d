//! Message records shared by the backfill and live ingestion paths.

use chrono::{DateTime, TimeZone, Utc};

/// Milliseconds between the Unix epoch and the first second of 2015 (Discord's snowflake epoch).
pub const DISCORD_EPOCH_MS: i64 = 1_420_070_400_000;

/// A message as delivered by the platform, either from history paging or a live event.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    pub id: u64,
    pub guild_id: Option<u64>,
    pub channel_id: u64,
    pub author_id: u64,
    pub author_name: String,
    pub author_is_bot: bool,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
}

impl RawMessage {
    /// Builds the archive record. History pages carry no guild id, so the caller supplies it.
    pub fn into_indexed(self, guild_id: u64) -> IndexedMessage {
        let updated_at = match self.edited_at {
            Some(edited) if edited > self.created_at => edited,
            _ => self.created_at,
        };
        IndexedMessage {
            message_id: self.id,
            guild_id: self.guild_id.unwrap_or(guild_id),
            channel_id: self.channel_id,
            author_id: self.author_id,
            author_name: self.author_name,
            content: self.content,
            created_at: self.created_at,
            updated_at,
        }
    }
}

/// New content for an already-posted message.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEdit {
    pub message_id: u64,
    pub guild_id: Option<u64>,
    pub channel_id: u64,
    pub author_is_bot: bool,
    pub content: String,
    pub edited_at: DateTime<Utc>,
}

/// The durable record of one chat message.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedMessage {
    pub message_id: u64,
    pub guild_id: u64,
    pub channel_id: u64,
    pub author_id: u64,
    pub author_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IndexedMessage {
    pub fn jump_link(&self) -> String {
        format!(
            "https://discord.com/channels/{}/{}/{}",
            self.guild_id, self.channel_id, self.message_id
        )
    }
}

/// Creation time encoded in a snowflake id.
pub fn snowflake_time(id: u64) -> DateTime<Utc> {
    let ms = (id >> 22) as i64 + DISCORD_EPOCH_MS;
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

/// The smallest snowflake that could have been created at `time`.
pub fn snowflake_floor(time: DateTime<Utc>) -> u64 {
    let ms = (time.timestamp_millis() - DISCORD_EPOCH_MS).max(0) as u64;
    ms << 22
}
