use crate::search::format_hit;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;

/// Embed description limit is 4096 characters
const DISCORD_EMBED_LIMIT: usize = 4096;

/// Search archived messages of tracked channels
#[poise::command(slash_command, guild_only)]
pub async fn search(
    ctx: Context<'_>,
    #[description = "Keywords to look for"] query: String,
    #[description = "Number of results (default 5, capped by the server's maximum)"]
    #[min = 1]
    #[max = 25]
    limit: Option<u8>,
) -> Result<(), Error> {
    ctx.defer().await?;
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;

    let search = &ctx.data().search;
    let requested = limit.map(usize::from);
    let capped = requested.is_some_and(|n| n > search.max_limit());
    let results = search.search(guild_id.get(), &query, requested).await?;

    if results.is_empty() {
        ctx.say("No relevant messages found.").await?;
        return Ok(());
    }

    let description: String = results
        .iter()
        .enumerate()
        .map(|(i, msg)| format_hit(i + 1, msg))
        .collect::<Vec<_>>()
        .join("\n\n")
        .chars()
        .take(DISCORD_EMBED_LIMIT)
        .collect();

    let mut footer = format!("{} result(s), newest first", results.len());
    if capped {
        footer.push_str(&format!(" (limited to {} per search)", search.max_limit()));
    }

    let embed = serenity::CreateEmbed::new()
        .title(format!("🔎 Results for \"{}\"", query))
        .description(description)
        .footer(serenity::CreateEmbedFooter::new(footer))
        .color(0x5865F2);

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}
