use crate::archive::ArchiveStore;
use crate::scheduler::ReconciliationScheduler;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Result of a track call. The backfill handle may be dropped; the task keeps running.
pub struct TrackReceipt {
    pub newly_tracked: bool,
    pub backfill: JoinHandle<()>,
}

/// The set of tracked channels. Track and untrack are the only ways a channel enters or
/// leaves indexing scope.
#[derive(Clone)]
pub struct TrackingRegistry {
    store: Arc<dyn ArchiveStore>,
    scheduler: ReconciliationScheduler,
}

impl TrackingRegistry {
    pub fn new(store: Arc<dyn ArchiveStore>, scheduler: ReconciliationScheduler) -> Self {
        Self { store, scheduler }
    }

    /// Persists the channel, then starts a full-history backfill without waiting for it.
    pub async fn track(
        &self,
        guild_id: u64,
        guild_name: &str,
        channel_id: u64,
    ) -> anyhow::Result<TrackReceipt> {
        let newly_tracked = self
            .store
            .track_channel(guild_id, channel_id, guild_name.to_string())
            .await?;
        info!(
            "Tracking channel {} in guild {} (new: {})",
            channel_id, guild_id, newly_tracked
        );
        let backfill = self.scheduler.schedule_one(guild_id, channel_id, None);
        Ok(TrackReceipt {
            newly_tracked,
            backfill,
        })
    }

    /// Stops future indexing. Archived history stays, and a running backfill is allowed to finish.
    pub async fn untrack(&self, guild_id: u64, channel_id: u64) -> anyhow::Result<bool> {
        let removed = self.store.untrack_channel(guild_id, channel_id).await?;
        info!(
            "Untracked channel {} in guild {} (was tracked: {})",
            channel_id, guild_id, removed
        );
        Ok(removed)
    }

    pub async fn list(&self, guild_id: u64) -> anyhow::Result<Vec<u64>> {
        self.store.list_tracked_channels(guild_id).await
    }
}
