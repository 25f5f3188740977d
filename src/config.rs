use dotenvy::dotenv;
use std::env;

#[derive(Clone)]
pub struct Config {
    pub discord_token: String,
    pub database_url: String,
    pub status_message: String,
    pub dev_guild_id: Option<u64>,
    pub register_commands: bool,

    // Backfill settings
    pub backfill_concurrency: usize,
    pub backfill_page_size: u8,
    pub startup_catchup_enabled: bool,

    // Search settings
    pub search_default_limit: usize,
    pub search_max_limit: usize,
}

/// Discord returns at most this many messages per history request.
pub const DISCORD_HISTORY_PAGE_LIMIT: u8 = 100;

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        let search_default_limit: usize = parse_or("SEARCH_DEFAULT_LIMIT", 5).max(1);
        Ok(Config {
            discord_token: env::var("DISCORD_TOKEN")
                .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN must be set"))?,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "data/archivist.db".to_string()),
            status_message: env::var("STATUS_MESSAGE")
                .unwrap_or_else(|_| "Indexing tracked channels".to_string()),
            dev_guild_id: env::var("DEV_GUILD_ID").ok().and_then(|id| id.parse().ok()),
            register_commands: parse_or("REGISTER_COMMANDS", true),
            backfill_concurrency: parse_or("BACKFILL_CONCURRENCY", 4usize).max(1),
            backfill_page_size: parse_or("BACKFILL_PAGE_SIZE", DISCORD_HISTORY_PAGE_LIMIT)
                .clamp(1, DISCORD_HISTORY_PAGE_LIMIT),
            startup_catchup_enabled: parse_or("STARTUP_CATCHUP_ENABLED", true),
            search_default_limit,
            search_max_limit: parse_or("SEARCH_MAX_LIMIT", 10usize).max(search_default_limit),
        })
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[REDACTED]")
            .field("database_url", &self.database_url)
            .field("status_message", &self.status_message)
            .field("dev_guild_id", &self.dev_guild_id)
            .field("register_commands", &self.register_commands)
            .field("backfill_concurrency", &self.backfill_concurrency)
            .field("backfill_page_size", &self.backfill_page_size)
            .field("startup_catchup_enabled", &self.startup_catchup_enabled)
            .field("search_default_limit", &self.search_default_limit)
            .field("search_max_limit", &self.search_max_limit)
            .finish()
    }
}
