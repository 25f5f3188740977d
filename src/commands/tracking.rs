use crate::admin::{self, AdminError};
use crate::{Context, Error};
use poise::serenity_prelude as serenity;

/// Whether the invoking member holds the Administrator permission.
async fn requester_is_admin(ctx: Context<'_>) -> bool {
    ctx.author_member()
        .await
        .and_then(|member| member.permissions)
        .is_some_and(|permissions| permissions.administrator())
}

fn into_reply(result: Result<String, AdminError>) -> Result<String, Error> {
    match result {
        Ok(reply) => Ok(reply),
        Err(denied @ AdminError::PermissionDenied) => Ok(denied.to_string()),
        Err(AdminError::Store(e)) => Err(e.into()),
    }
}

/// Add a channel for the bot to track
#[poise::command(slash_command, guild_only, ephemeral)]
pub async fn add_channel(
    ctx: Context<'_>,
    #[description = "Select the channel to add"]
    #[channel_types("Text")]
    channel: serenity::GuildChannel,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let guild_name = ctx
        .guild()
        .map(|guild| guild.name.clone())
        .unwrap_or_else(|| guild_id.to_string());
    let is_admin = requester_is_admin(ctx).await;

    let result = admin::add_channel(
        &ctx.data().registry,
        is_admin,
        guild_id.get(),
        &guild_name,
        channel.id.get(),
    )
    .await;

    ctx.say(into_reply(result)?).await?;
    Ok(())
}

/// Remove a channel from tracking
#[poise::command(slash_command, guild_only, ephemeral)]
pub async fn remove_channel(
    ctx: Context<'_>,
    #[description = "Select the channel to remove"]
    #[channel_types("Text")]
    channel: serenity::GuildChannel,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let is_admin = requester_is_admin(ctx).await;

    let result = admin::remove_channel(
        &ctx.data().registry,
        is_admin,
        guild_id.get(),
        channel.id.get(),
    )
    .await;

    ctx.say(into_reply(result)?).await?;
    Ok(())
}

/// Show the tracked channels in this server
#[poise::command(slash_command, guild_only, ephemeral)]
pub async fn config(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let is_admin = requester_is_admin(ctx).await;

    let channels = match admin::list_channels(&ctx.data().registry, is_admin, guild_id.get()).await {
        Ok(channels) => channels,
        Err(denied @ AdminError::PermissionDenied) => {
            ctx.say(denied.to_string()).await?;
            return Ok(());
        }
        Err(AdminError::Store(e)) => return Err(e.into()),
    };

    let mut counts = Vec::with_capacity(channels.len());
    for &channel_id in &channels {
        let count = ctx
            .data()
            .db
            .run_blocking(move |db| db.count_messages(channel_id))
            .await?;
        counts.push(count);
    }

    let labels: Vec<String> = {
        let guild = ctx.guild();
        channels
            .iter()
            .zip(counts)
            .map(|(&channel_id, count)| {
                let known = guild.as_ref().is_some_and(|g| {
                    g.channels.contains_key(&serenity::ChannelId::new(channel_id))
                });
                let label = if known {
                    format!("<#{}>", channel_id)
                } else {
                    format!("ID:{}", channel_id)
                };
                format!("{} ({} archived)", label, count)
            })
            .collect()
    };

    ctx.say(admin::format_tracked_channels(&labels)).await?;
    Ok(())
}
