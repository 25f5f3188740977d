//! Discord side of the pipeline: history pages, channel lookups and gateway event conversion.

use crate::history::{HistoryError, HistorySource};
use crate::model::{snowflake_time, MessageEdit, RawMessage};
use crate::scheduler::{ChannelResolver, ResolvedChannel};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;
use poise::serenity_prelude::{ChannelId, GetMessages, GuildId, Http, MessageId};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct DiscordPlatform {
    http: Arc<Http>,
}

impl DiscordPlatform {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl HistorySource for DiscordPlatform {
    async fn page_after(
        &self,
        channel_id: u64,
        after: u64,
        limit: u8,
    ) -> Result<Vec<RawMessage>, HistoryError> {
        // Snowflake ids are non-zero; 1 precedes every real message.
        let builder = GetMessages::new()
            .after(MessageId::new(after.max(1)))
            .limit(limit);
        let messages = ChannelId::new(channel_id)
            .messages(self.http.as_ref(), builder)
            .await
            .map_err(|e| HistoryError::Request {
                channel_id,
                source: e.into(),
            })?;
        debug!(
            "Discord: fetched {} messages from channel {} after {}",
            messages.len(),
            channel_id,
            after
        );
        Ok(messages.iter().map(raw_from_message).collect())
    }
}

#[async_trait]
impl ChannelResolver for DiscordPlatform {
    async fn resolve(&self, guild_id: u64, channel_id: u64) -> anyhow::Result<Option<ResolvedChannel>> {
        let channel = match ChannelId::new(channel_id).to_channel(self.http.as_ref()).await {
            Ok(channel) => channel,
            Err(e) if is_gone(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let Some(guild_channel) = channel.guild() else {
            return Ok(None);
        };
        if guild_channel.guild_id.get() != guild_id {
            warn!(
                "Discord: channel {} now belongs to guild {}, expected {}",
                channel_id, guild_channel.guild_id, guild_id
            );
            return Ok(None);
        }

        let guild_name = match GuildId::new(guild_id).to_partial_guild(self.http.as_ref()).await {
            Ok(guild) => Some(guild.name),
            Err(e) => {
                debug!("Discord: could not fetch guild {}: {}", guild_id, e);
                None
            }
        };

        Ok(Some(ResolvedChannel { guild_name }))
    }
}

/// Missing or forbidden: the bot can no longer read this channel.
fn is_gone(error: &::serenity::Error) -> bool {
    match error {
        ::serenity::Error::Http(::serenity::http::HttpError::UnsuccessfulRequest(response)) => {
            matches!(response.status_code.as_u16(), 403 | 404)
        }
        _ => false,
    }
}

pub fn raw_from_message(message: &serenity::Message) -> RawMessage {
    RawMessage {
        id: message.id.get(),
        guild_id: message.guild_id.map(|id| id.get()),
        channel_id: message.channel_id.get(),
        author_id: message.author.id.get(),
        author_name: display_name(&message.author),
        author_is_bot: message.author.bot,
        content: message.content.clone(),
        created_at: snowflake_time(message.id.get()),
        edited_at: message.edited_timestamp.and_then(timestamp_to_utc),
    }
}

/// `None` for updates that carry no new text (embed unfurls, pins).
pub fn edit_from_update(event: &serenity::MessageUpdateEvent) -> Option<MessageEdit> {
    let content = event.content.clone()?;
    Some(MessageEdit {
        message_id: event.id.get(),
        guild_id: event.guild_id.map(|id| id.get()),
        channel_id: event.channel_id.get(),
        author_is_bot: event.author.as_ref().is_some_and(|author| author.bot),
        content,
        edited_at: event
            .edited_timestamp
            .and_then(timestamp_to_utc)
            .unwrap_or_else(Utc::now),
    })
}

fn display_name(user: &serenity::User) -> String {
    user.global_name.clone().unwrap_or_else(|| user.name.clone())
}

/// Keeps the millisecond part; edits often land in the same second as the post.
fn timestamp_to_utc(ts: serenity::Timestamp) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&ts.to_string())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
