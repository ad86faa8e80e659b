//! Periodic workspace retention sweep.

use lspgate_sandbox::WorkspaceManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Spawn the background task that reclaims stale workspaces.
pub fn spawn_sweeper(workspaces: Arc<WorkspaceManager>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match workspaces.sweep().await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "workspace sweep complete"),
                Err(e) => warn!(error = %e, "workspace sweep failed"),
            }
        }
    })
}
