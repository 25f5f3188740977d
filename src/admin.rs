//! Administrator-only tracking operations and their user-facing confirmations.

use crate::registry::TrackingRegistry;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("You do not have permission to use this command.")]
    PermissionDenied,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

fn require_admin(requester_is_admin: bool) -> Result<(), AdminError> {
    if requester_is_admin {
        Ok(())
    } else {
        Err(AdminError::PermissionDenied)
    }
}

pub async fn add_channel(
    registry: &TrackingRegistry,
    requester_is_admin: bool,
    guild_id: u64,
    guild_name: &str,
    channel_id: u64,
) -> Result<String, AdminError> {
    require_admin(requester_is_admin)?;
    let receipt = registry.track(guild_id, guild_name, channel_id).await?;
    Ok(if receipt.newly_tracked {
        format!("Channel <#{}> has been added for tracking.", channel_id)
    } else {
        format!(
            "Channel <#{}> is already tracked. Its history is being re-scanned.",
            channel_id
        )
    })
}

pub async fn remove_channel(
    registry: &TrackingRegistry,
    requester_is_admin: bool,
    guild_id: u64,
    channel_id: u64,
) -> Result<String, AdminError> {
    require_admin(requester_is_admin)?;
    let removed = registry.untrack(guild_id, channel_id).await?;
    Ok(if removed {
        format!("Channel <#{}> has been removed from tracking.", channel_id)
    } else {
        format!("Channel <#{}> was not being tracked.", channel_id)
    })
}

pub async fn list_channels(
    registry: &TrackingRegistry,
    requester_is_admin: bool,
    guild_id: u64,
) -> Result<Vec<u64>, AdminError> {
    require_admin(requester_is_admin)?;
    Ok(registry.list(guild_id).await?)
}

/// Reply for the channel listing; `labels` are already-rendered channel references.
pub fn format_tracked_channels(labels: &[String]) -> String {
    if labels.is_empty() {
        "No channels are currently being tracked in this server.".to_string()
    } else {
        format!("Tracked channels in this server: {}", labels.join(", "))
    }
}
