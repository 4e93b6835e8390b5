//! Retention service for time-based data purge.
//!
//! Runs as a background task that deletes expired share links and expired
//! authentication sessions.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::auth_repo::AuthRepo;
use super::db::Database;
use super::share_repo::ShareRepo;
use crate::Result;

const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

/// Spawn the retention purge background task.
///
/// The task runs hourly, first tick immediately.
#[must_use]
pub fn spawn_retention_task(db: Arc<Database>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("retention task shutting down");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(err) = purge(&db).await {
                        error!(?err, "retention purge failed");
                    }
                }
            }
        }
    })
}

/// Run one purge pass.
///
/// # Errors
///
/// Returns `AppError::Db` if either delete fails.
pub async fn purge(db: &Arc<Database>) -> Result<()> {
    let now = Utc::now();
    let shares = ShareRepo::new(Arc::clone(db)).purge_expired(now).await?;
    let sessions = AuthRepo::new(Arc::clone(db)).purge_expired(now).await?;
    info!(shares, sessions, "retention purge completed");
    Ok(())
}
