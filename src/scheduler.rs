use crate::archive::ArchiveStore;
use crate::backfill::{BackfillEngine, BackfillResult};
use crate::tasks::spawn_supervised;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

/// Live details of a tracked channel, as the platform currently reports them.
#[derive(Debug, Clone, Default)]
pub struct ResolvedChannel {
    pub guild_name: Option<String>,
}

#[async_trait]
pub trait ChannelResolver: Send + Sync {
    /// `Ok(None)` when the channel or its guild no longer exists or is not visible to the bot.
    async fn resolve(&self, guild_id: u64, channel_id: u64) -> anyhow::Result<Option<ResolvedChannel>>;
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CatchupReport {
    pub channels: usize,
    pub completed: usize,
    pub partial: usize,
    pub skipped: usize,
    pub failed: usize,
    pub indexed: usize,
    pub inserted: usize,
}

enum ChannelOutcome {
    Backfilled(BackfillResult),
    Skipped,
}

/// Launches channel backfills with a shared concurrency bound.
#[derive(Clone)]
pub struct ReconciliationScheduler {
    engine: Arc<BackfillEngine>,
    store: Arc<dyn ArchiveStore>,
    resolver: Arc<dyn ChannelResolver>,
    permits: Arc<Semaphore>,
}

impl ReconciliationScheduler {
    pub fn new(
        engine: Arc<BackfillEngine>,
        store: Arc<dyn ArchiveStore>,
        resolver: Arc<dyn ChannelResolver>,
        concurrency: usize,
    ) -> Self {
        Self {
            engine,
            store,
            resolver,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Re-scans every tracked channel to cover downtime, waiting for all of them.
    /// A failing channel is counted and logged; it never stops the others.
    pub async fn run_startup_catchup(&self) -> anyhow::Result<CatchupReport> {
        let channels = self.store.list_all_tracked_channels().await?;
        info!("Catch-up: re-scanning {} tracked channels", channels.len());

        let mut report = CatchupReport {
            channels: channels.len(),
            ..Default::default()
        };

        let mut set = JoinSet::new();
        for (guild_id, channel_id) in channels {
            let scheduler = self.clone();
            set.spawn(async move {
                let outcome = scheduler.catch_up_channel(guild_id, channel_id).await;
                (channel_id, outcome)
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(ChannelOutcome::Backfilled(result)))) => {
                    report.indexed += result.indexed_count;
                    report.inserted += result.inserted_count;
                    if result.is_complete() {
                        report.completed += 1;
                    } else {
                        report.partial += 1;
                    }
                }
                Ok((_, Ok(ChannelOutcome::Skipped))) => report.skipped += 1,
                Ok((channel_id, Err(e))) => {
                    warn!("Catch-up: channel {} failed: {:#}", channel_id, e);
                    report.failed += 1;
                }
                Err(e) => {
                    error!("Catch-up: channel task aborted: {}", e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Catch-up complete: {} channels, {} complete, {} partial, {} skipped, {} failed, {} messages indexed ({} new)",
            report.channels,
            report.completed,
            report.partial,
            report.skipped,
            report.failed,
            report.indexed,
            report.inserted
        );
        Ok(report)
    }

    /// Starts a backfill in the background and returns at once.
    pub fn schedule_one(
        &self,
        guild_id: u64,
        channel_id: u64,
        after: Option<DateTime<Utc>>,
    ) -> JoinHandle<()> {
        let scheduler = self.clone();
        spawn_supervised(format!("backfill channel {}", channel_id), async move {
            let _permit = scheduler.permits.clone().acquire_owned().await?;
            if !scheduler.store.is_tracked(guild_id, channel_id).await? {
                debug!("Backfill: channel {} untracked before start, skipping", channel_id);
                return Ok(());
            }
            scheduler.engine.backfill(guild_id, channel_id, after).await;
            Ok(())
        })
    }

    async fn catch_up_channel(&self, guild_id: u64, channel_id: u64) -> anyhow::Result<ChannelOutcome> {
        let _permit = self.permits.clone().acquire_owned().await?;

        if !self.store.is_tracked(guild_id, channel_id).await? {
            debug!("Catch-up: channel {} untracked meanwhile, skipping", channel_id);
            return Ok(ChannelOutcome::Skipped);
        }

        let Some(resolved) = self.resolver.resolve(guild_id, channel_id).await? else {
            warn!(
                "Catch-up: channel {} in guild {} is no longer reachable, skipping",
                channel_id, guild_id
            );
            return Ok(ChannelOutcome::Skipped);
        };

        if let Some(name) = resolved.guild_name {
            if let Err(e) = self.store.set_guild_name(guild_id, name).await {
                warn!("Catch-up: failed to refresh name of guild {}: {}", guild_id, e);
            }
        }

        let result = self.engine.backfill(guild_id, channel_id, None).await;
        Ok(ChannelOutcome::Backfilled(result))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeResolver {
        pub missing: Mutex<HashSet<u64>>,
        pub broken: Mutex<HashSet<u64>>,
        pub names: Mutex<HashMap<u64, String>>,
    }

    #[async_trait]
    impl ChannelResolver for FakeResolver {
        async fn resolve(&self, guild_id: u64, channel_id: u64) -> anyhow::Result<Option<ResolvedChannel>> {
            if self.broken.lock().unwrap().contains(&channel_id) {
                anyhow::bail!("gateway timeout");
            }
            if self.missing.lock().unwrap().contains(&channel_id) {
                return Ok(None);
            }
            Ok(Some(ResolvedChannel {
                guild_name: self.names.lock().unwrap().get(&guild_id).cloned(),
            }))
        }
    }
}
