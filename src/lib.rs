pub mod admin;
pub mod archive;
pub mod backfill;
pub mod commands;
pub mod config;
pub mod db;
pub mod discord;
pub mod history;
pub mod ingest;
pub mod model;
pub mod registry;
pub mod scheduler;
pub mod search;
pub mod tasks;

use archive::ArchiveStore;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

/// Process-wide service context, built once the gateway is ready and passed to all commands
/// and event handlers.
pub struct Data {
    pub config: config::Config,
    pub db: db::Database,
    pub registry: registry::TrackingRegistry,
    pub ingestor: ingest::LiveIngestor,
    pub scheduler: scheduler::ReconciliationScheduler,
    pub search: search::SearchService,
}

impl Data {
    pub fn new(config: config::Config, db: db::Database, http: Arc<serenity::Http>) -> Self {
        let store: Arc<dyn ArchiveStore> = Arc::new(db.clone());
        let platform = Arc::new(discord::DiscordPlatform::new(http));

        let engine = Arc::new(backfill::BackfillEngine::new(
            store.clone(),
            platform.clone(),
            config.backfill_page_size,
        ));
        let scheduler = scheduler::ReconciliationScheduler::new(
            engine,
            store.clone(),
            platform,
            config.backfill_concurrency,
        );

        Self {
            registry: registry::TrackingRegistry::new(store.clone(), scheduler.clone()),
            ingestor: ingest::LiveIngestor::new(store.clone()),
            search: search::SearchService::new(
                store,
                config.search_default_limit,
                config.search_max_limit,
            ),
            scheduler,
            config,
            db,
        }
    }
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
