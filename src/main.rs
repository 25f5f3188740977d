use archivist::commands::{search, tracking};
use archivist::discord::{edit_from_update, raw_from_message};
use archivist::tasks::spawn_supervised;
use archivist::{config::Config, db::Database, Data};
use poise::serenity_prelude as serenity;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Configuration loaded: {:?}", config);
    let discord_token = config.discord_token.clone();

    // Without the archive there is nothing to do.
    let db = Database::new(&config)?;
    db.execute_init()?;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                tracking::add_channel(),
                tracking::remove_channel(),
                tracking::config(),
                search::search(),
            ],
            event_handler: |_ctx, event, _framework, data| {
                Box::pin(async move {
                    dispatch_event(event, data);
                    Ok(())
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("Bot is ready as {}", ready.user.name);

                if config.register_commands {
                    let commands = &framework.options().commands;
                    match config.dev_guild_id {
                        Some(guild_id) => {
                            poise::builtins::register_in_guild(
                                ctx,
                                commands,
                                serenity::GuildId::new(guild_id),
                            )
                            .await?
                        }
                        None => poise::builtins::register_globally(ctx, commands).await?,
                    }
                }

                ctx.set_activity(Some(serenity::ActivityData::custom(&config.status_message)));

                let data = Data::new(config, db, ctx.http.clone());

                if data.config.startup_catchup_enabled {
                    let scheduler = data.scheduler.clone();
                    spawn_supervised("startup catch-up".to_string(), async move {
                        scheduler.run_startup_catchup().await?;
                        Ok(())
                    });
                }

                Ok(data)
            })
        })
        .build();

    let intents = serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT;

    let mut client = serenity::ClientBuilder::new(&discord_token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down...");
            shard_manager.shutdown_all().await;
        }
    });

    info!("Starting bot...");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}

/// Hands gateway events to live ingestion without waiting on the archive.
fn dispatch_event(event: &serenity::FullEvent, data: &Data) {
    match event {
        serenity::FullEvent::Message { new_message } => {
            if new_message.guild_id.is_some() {
                data.ingestor.spawn_created(raw_from_message(new_message));
            }
        }
        serenity::FullEvent::MessageUpdate { event, .. } => {
            if let Some(edit) = edit_from_update(event) {
                data.ingestor.spawn_edited(edit);
            }
        }
        _ => {}
    }
}
